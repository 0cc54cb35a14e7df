use log::{debug, error, info, warn};
use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::coordinator::{Backends, SessionCoordinator};
use super::types::{ControlInput, Flow, StatusSnapshot, TimerEvent};
use crate::commands::{Command, CommandRegistry, Origin};
use crate::configuration::{Config, RecordMode};
use crate::error_handling::types::ControllerError;
use crate::peripherals::{Heartbeat, HeadlessPeripherals, LogNotifier, StaticGps};
use crate::voice::{SessionEvent, SimulatedServer};
use crate::web_interface::WebServer;

const CONTROL_QUEUE: usize = 64;

/// Wires the coordinator to its inputs and runs it until shutdown.
pub struct Controller {
    config: Config,
    backends: Backends,
}

impl Controller {
    /// Builds a controller on the simulated voice backend and headless peripherals.
    pub fn new(config: Config) -> Result<Self, ControllerError> {
        config.validate()?;
        info!("Using the simulated voice backend and headless peripherals");
        let backends = Backends {
            client: Arc::new(SimulatedServer::from_config(&config.simulation)),
            peripherals: Arc::new(HeadlessPeripherals::new()),
            gps: Arc::new(StaticGps::new(config.gps.fixed_position)),
            notifier: Arc::new(LogNotifier::default()),
        };
        Ok(Self::with_backends(config, backends))
    }

    pub fn with_backends(config: Config, backends: Backends) -> Self {
        Self { config, backends }
    }

    /// Runs the control loop until a quit command, a termination signal or a
    /// fatal error, then shuts everything down.
    ///
    /// # Errors
    /// Returns the fatal error that ended the loop, or the setup error that
    /// kept it from starting.
    pub async fn run(self) -> Result<(), ControllerError> {
        let config = self.config;

        if config.terminal.enabled && !std::io::stdin().is_terminal() {
            return Err(ControllerError::TerminalUnavailable(
                "stdin is not a terminal, set terminal.enabled = false to run without one"
                    .to_string(),
            ));
        }

        let (inputs_tx, mut inputs_rx) = mpsc::channel(CONTROL_QUEUE);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut coordinator = SessionCoordinator::new(
            config.clone(),
            self.backends.clone(),
            events_tx,
            inputs_tx.clone(),
        )?;
        let (status_tx, status_rx) = watch::channel(coordinator.status());
        let registry = CommandRegistry::new(config.api.clone());

        let mut tasks: Vec<JoinHandle<()>> = vec![tokio::spawn(forward_signals(inputs_tx.clone()))];
        if config.terminal.enabled {
            tasks.push(tokio::spawn(read_terminal(registry.clone(), inputs_tx.clone())));
        }
        if config.api.enabled {
            let server = WebServer::new(registry, inputs_tx.clone(), status_rx);
            match server.spawn(config.api.listen_port) {
                Ok(task) => tasks.push(task),
                Err(e) => {
                    for task in tasks {
                        task.abort();
                    }
                    return Err(e.into());
                }
            }
        }
        if config.beacon.enabled {
            tasks.push(tokio::spawn(beacon_ticker(
                inputs_tx.clone(),
                Duration::from_secs(config.beacon.interval_secs),
            )));
        }
        let _heartbeat = config.heartbeat.enabled.then(|| {
            Heartbeat::start(
                self.backends.peripherals.clone(),
                Duration::from_millis(config.heartbeat.period_ms),
                Duration::from_millis(config.heartbeat.on_ms),
            )
        });

        let mut result = coordinator.start().await;
        if result.is_ok() && config.audio_record.enabled && config.audio_record.on_start {
            let command = match config.audio_record.mode {
                RecordMode::Traffic => Command::RecordTraffic,
                RecordMode::Ambient => Command::RecordAmbient,
                RecordMode::Combo => Command::RecordCombo,
            };
            result = coordinator
                .execute(command, Origin::Internal)
                .await
                .map(|_| ());
        }
        if result.is_ok() {
            status_tx.send_replace(coordinator.status());
            result = control_loop(&mut coordinator, &mut inputs_rx, &mut events_rx, &status_tx).await;
        }
        if let Err(e) = &result {
            error!("{}", e);
        }

        coordinator
            .shutdown(Duration::from_secs(config.timings.shutdown_grace_secs))
            .await;
        for task in tasks {
            task.abort();
        }
        result
    }
}

/// Applies inputs one at a time. Voice callbacks go first so a command never
/// sees a session older than what the backend already reported.
pub async fn control_loop(
    coordinator: &mut SessionCoordinator,
    inputs: &mut mpsc::Receiver<ControlInput>,
    events: &mut mpsc::UnboundedReceiver<SessionEvent>,
    status: &watch::Sender<StatusSnapshot>,
) -> Result<(), ControllerError> {
    loop {
        let flow = tokio::select! {
            biased;
            Some(event) = events.recv() => coordinator.handle_event(event).await.map(|()| Flow::Continue),
            input = inputs.recv() => match input {
                Some(ControlInput::Command { command, origin }) => {
                    coordinator.execute(command, origin).await
                }
                Some(ControlInput::Timer(timer)) => {
                    coordinator.handle_timer(timer).await.map(|()| Flow::Continue)
                }
                Some(ControlInput::Shutdown) | None => Ok(Flow::Stop),
            },
        };

        status.send_replace(coordinator.status());
        if flow? == Flow::Stop {
            return Ok(());
        }
    }
}

async fn read_terminal(registry: CommandRegistry, inputs: mpsc::Sender<ControlInput>) {
    info!("Reading key commands from the terminal, enter DEL for the menu");
    read_keys(tokio::io::stdin(), registry, inputs).await;
}

/// Turns one key name per line into keyboard commands until the input ends.
async fn read_keys<R: AsyncRead + Unpin>(
    reader: R,
    registry: CommandRegistry,
    inputs: mpsc::Sender<ControlInput>,
) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let key = line.trim();
                if key.is_empty() {
                    continue;
                }
                match registry.resolve_key(key) {
                    Some(command) => {
                        let input = ControlInput::Command {
                            command,
                            origin: Origin::Keyboard,
                        };
                        if inputs.send(input).await.is_err() {
                            break;
                        }
                    }
                    None => warn!("Unknown key {}, enter DEL for the menu", key),
                }
            }
            Ok(None) => {
                debug!("Terminal input closed");
                break;
            }
            Err(e) => {
                error!("Unable to read terminal input: {}", e);
                break;
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = terminate.recv() => {}
            }
        }
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {}", e);
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

async fn forward_signals(inputs: mpsc::Sender<ControlInput>) {
    wait_for_signal().await;
    info!("Termination signal received");
    let _ = inputs.send(ControlInput::Shutdown).await;
}

async fn beacon_ticker(inputs: mpsc::Sender<ControlInput>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    // the first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if inputs
            .send(ControlInput::Timer(TimerEvent::BeaconDue))
            .await
            .is_err()
        {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_handling::types::ConnectionError;
    use crate::session_management::SessionState;

    const CONFIG: &str = r#"
[terminal]
enabled = false

[[accounts]]
name = "alpha"
server = "alpha:64738"
username = "gate"
"#;

    fn backends(server: Arc<SimulatedServer>) -> Backends {
        Backends {
            client: server,
            peripherals: Arc::new(HeadlessPeripherals::new()),
            gps: Arc::new(StaticGps::new(None)),
            notifier: Arc::new(LogNotifier::default()),
        }
    }

    fn server() -> Arc<SimulatedServer> {
        Arc::new(SimulatedServer::new(&[(0, "Root", None), (1, "Ops", Some(0))]))
    }

    #[tokio::test(start_paused = true)]
    async fn loop_applies_inputs_in_order_until_quit() {
        let _ = env_logger::builder().is_test(true).try_init();
        let config = Config::from_toml_str(CONFIG).unwrap();
        let (inputs_tx, mut inputs_rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut coordinator =
            SessionCoordinator::new(config, backends(server()), events_tx, inputs_tx.clone())
                .unwrap();
        let (status_tx, status_rx) = watch::channel(coordinator.status());

        coordinator.start().await.unwrap();
        for command in [Command::StartTransmitting, Command::Quit, Command::StopTransmitting] {
            inputs_tx
                .send(ControlInput::Command {
                    command,
                    origin: Origin::Keyboard,
                })
                .await
                .unwrap();
        }

        control_loop(&mut coordinator, &mut inputs_rx, &mut events_rx, &status_tx)
            .await
            .unwrap();

        assert_eq!(status_rx.borrow().session.state, SessionState::Transmitting);
        assert_eq!(status_rx.borrow().connect_attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn lost_server_ends_the_loop_with_an_error() {
        let config = Config::from_toml_str(CONFIG).unwrap();
        let server = server();
        let (inputs_tx, mut inputs_rx) = mpsc::channel(8);
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut coordinator =
            SessionCoordinator::new(config, backends(server.clone()), events_tx, inputs_tx)
                .unwrap();
        let (status_tx, _status_rx) = watch::channel(coordinator.status());

        coordinator.start().await.unwrap();
        server.set_unreachable("alpha:64738");
        server.drop_connection();

        let result =
            control_loop(&mut coordinator, &mut inputs_rx, &mut events_rx, &status_tx).await;

        assert!(matches!(
            result,
            Err(ControllerError::ConnectionError(
                ConnectionError::RetriesExhausted { attempts: 3 }
            ))
        ));
        assert_eq!(server.dial_count(), 3);
    }

    #[tokio::test]
    async fn key_lines_become_keyboard_commands() {
        let input = tokio_test::io::Builder::new()
            .read(b"f8\n\nbogus\n")
            .read(b"^S\nF9\n")
            .build();
        let (inputs, mut rx) = mpsc::channel(8);

        read_keys(input, CommandRegistry::new(Default::default()), inputs).await;

        let mut commands = Vec::new();
        while let Ok(ControlInput::Command { command, origin }) = rx.try_recv() {
            assert_eq!(origin, Origin::Keyboard);
            commands.push(command);
        }
        assert_eq!(
            commands,
            vec![Command::StartTransmitting, Command::Scan, Command::StopTransmitting]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn run_fails_when_the_server_never_answers() {
        let mut config = Config::from_toml_str(CONFIG).unwrap();
        config.simulation.unreachable_servers = vec!["alpha:64738".to_string()];
        let server = Arc::new(SimulatedServer::from_config(&config.simulation));

        let result = Controller::with_backends(config, backends(server.clone()))
            .run()
            .await;

        assert!(matches!(result, Err(ControllerError::ConnectionError(_))));
        assert_eq!(server.dial_count(), 3);
    }
}
