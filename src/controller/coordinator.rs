use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::participants::{Occupancy, ParticipantTracker};
use super::types::{ControlInput, Flow, StatusSnapshot, TimerEvent};
use crate::channel_navigation::{ChannelNavigator, Direction, NavOutcome};
use crate::commands::{Command, CommandRegistry, Origin, KEY_BINDINGS};
use crate::configuration::Config;
use crate::error_handling::types::{ConnectionError, ControllerError, VoiceError};
use crate::job_supervision::types::RecordKind;
use crate::job_supervision::{JobSupervisor, RecordingJob, RecordingsFileServer};
use crate::peripherals::{BacklightTimer, GpsFix, GpsReceiver, Led, Notifier, Peripherals};
use crate::session_management::{
    next_state, AccountSet, ConnectionManager, Session, SessionState, StateEvent, Transition,
};
use crate::voice::{
    DeniedKind, DisconnectReason, SessionEvent, SessionEventKind, UserChange, VoiceClient,
};

/// Longest text message shown on the display.
const MAX_MESSAGE_CHARS: usize = 105;
const GPS_TRIES: u32 = 10;
const REPEAT_TX_CYCLES: u32 = 100;
/// Longest wait for the transition chime before the mic opens.
const TRANSITION_CHIME: Duration = Duration::from_secs(1);
const REPEAT_TX_STEP: Duration = Duration::from_secs(1);

const ACKNOWLEDGEMENTS: &[&str] = &[
    "voxgate is built on tokio, warp, serde, clap, chrono, zip and the log crates.",
    "Recording relies on sox; thanks to its maintainers.",
    "Thanks to everyone running voice gateways on small boards and reporting back.",
];

/// The outside world the coordinator drives.
#[derive(Clone)]
pub struct Backends {
    pub client: Arc<dyn VoiceClient>,
    pub peripherals: Arc<dyn Peripherals>,
    pub gps: Arc<dyn GpsReceiver>,
    pub notifier: Arc<dyn Notifier>,
}

/// `1 day 2 hours 3 minutes 4 seconds`, zero units left out.
pub fn human_duration(secs: u64) -> String {
    let units = [(86_400, "day"), (3_600, "hour"), (60, "minute"), (1, "second")];
    let mut rest = secs;
    let mut parts = Vec::new();
    for (size, name) in units {
        let n = rest / size;
        rest %= size;
        if n > 0 {
            parts.push(format!("{} {}{}", n, name, if n == 1 { "" } else { "s" }));
        }
    }
    if parts.is_empty() {
        "0 seconds".to_string()
    } else {
        parts.join(" ")
    }
}

/// Owns the live session and everything that reacts to it.
///
/// Only the control loop holds a `SessionCoordinator`, so commands, voice
/// callbacks and timer ticks are applied one at a time. Session state only
/// changes through [`next_state`].
pub struct SessionCoordinator {
    config: Config,
    accounts: AccountSet,
    session: Session,
    connections: ConnectionManager,
    navigator: ChannelNavigator,
    participants: ParticipantTracker,
    jobs: JobSupervisor,
    client: Arc<dyn VoiceClient>,
    peripherals: Arc<dyn Peripherals>,
    gps: Arc<dyn GpsReceiver>,
    notifier: Arc<dyn Notifier>,
    inputs: mpsc::Sender<ControlInput>,
    backlight: Option<BacklightTimer>,
    tx_lock: Option<JoinHandle<()>>,
    repeat_tx: Option<JoinHandle<()>>,
    html_tags: Regex,
    started_at: Instant,
}

impl SessionCoordinator {
    pub fn new(
        config: Config,
        backends: Backends,
        events: mpsc::UnboundedSender<SessionEvent>,
        inputs: mpsc::Sender<ControlInput>,
    ) -> Result<Self, ControllerError> {
        let accounts = AccountSet::new(config.accounts.clone(), config.account_index)?;
        let session = Session::from_account(accounts.index(), accounts.current());
        let timings = &config.timings;
        let connections = ConnectionManager::new(
            backends.client.clone(),
            events,
            Duration::from_millis(timings.reconnect_delay_ms),
        );
        let navigator = ChannelNavigator::new(
            backends.client.clone(),
            Duration::from_millis(timings.move_settle_ms),
            Duration::from_millis(timings.scan_dwell_ms),
        );
        let html_tags = Regex::new(r"<[^>]*>")
            .map_err(|e| ControllerError::InitializationFailed(e.to_string()))?;

        Ok(Self {
            config,
            accounts,
            session,
            connections,
            navigator,
            participants: ParticipantTracker::default(),
            jobs: JobSupervisor::new(),
            client: backends.client,
            peripherals: backends.peripherals,
            gps: backends.gps,
            notifier: backends.notifier,
            inputs,
            backlight: None,
            tx_lock: None,
            repeat_tx: None,
            html_tags,
            started_at: Instant::now(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.session.state
    }

    pub fn jobs(&self) -> &JobSupervisor {
        &self.jobs
    }

    pub fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            session: self.session.summary(),
            account_index: self.accounts.index(),
            account_count: self.accounts.len(),
            connect_attempts: self.connections.attempts(),
            participants: self.participants.last_count(),
            active_job: self.jobs.active(),
            running_jobs: self.jobs.running_jobs(),
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }

    /// Lights the panel and dials the configured account.
    ///
    /// # Errors
    /// Returns the fatal [`ConnectionError::RetriesExhausted`] when every
    /// attempt failed.
    pub async fn start(&mut self) -> Result<(), ControllerError> {
        if self.config.display.backlight_timer_enabled {
            self.backlight = Some(BacklightTimer::start(
                self.peripherals.clone(),
                Duration::from_secs(self.config.display.backlight_timeout_secs),
            ));
        }
        self.peripherals.clear_display();
        self.log_account();
        self.dial().await
    }

    fn apply(&mut self, event: StateEvent) -> Transition {
        let from = self.session.state;
        let transition = next_state(from, event);
        match transition {
            Transition::Move(to) => {
                if to != from {
                    debug!("Session {} -> {} on {:?}", from, to, event);
                }
                self.session.state = to;
            }
            Transition::Stay => {}
            Transition::Reject => debug!("{:?} ignored while {}", event, from),
        }
        transition
    }

    fn touch(&self) {
        if let Some(backlight) = &self.backlight {
            backlight.reset();
        }
    }

    fn log_account(&self) {
        info!(
            "Connecting to Account Name [{}], Account Server Address [{}], Account Index [{}]",
            self.session.account_name,
            self.session.target.address,
            self.accounts.index()
        );
    }

    async fn dial(&mut self) -> Result<(), ControllerError> {
        if self.apply(StateEvent::Dial) == Transition::Reject {
            return Ok(());
        }
        let target = self.session.target.clone();
        match self.connections.connect(&target).await {
            Ok(()) => Ok(()),
            Err(e) => self.dial_failed(e),
        }
    }

    fn dial_failed(&mut self, e: ConnectionError) -> Result<(), ControllerError> {
        self.apply(StateEvent::DialFailed);
        match &e {
            ConnectionError::DialFailed { .. } => {
                warn!("{}, staying disconnected", e);
                self.peripherals.display_line(0, "Not Connected");
                Ok(())
            }
            ConnectionError::RetriesExhausted { .. } => {
                error!("{}", e);
                self.peripherals.display_line(0, "Failed to Connect!");
                Err(e.into())
            }
        }
    }

    /// Applies one voice callback. Callbacks from a torn-down session are dropped.
    ///
    /// # Errors
    /// Fails only when a dropped connection could not be re-established.
    pub async fn handle_event(&mut self, event: SessionEvent) -> Result<(), ControllerError> {
        if !self.connections.is_current(event.generation) {
            debug!(
                "Dropping {:?} from stale session {}",
                event.kind, event.generation
            );
            return Ok(());
        }

        match event.kind {
            SessionEventKind::Connected { welcome } => self.on_connected(welcome).await,
            SessionEventKind::Disconnected { reason } => return self.on_disconnected(reason).await,
            SessionEventKind::TextMessage { sender, message } => {
                self.on_text_message(sender, &message)
            }
            SessionEventKind::UserChanged {
                user,
                channel,
                change,
            } => self.on_user_changed(&user, &channel, change).await,
            SessionEventKind::PermissionDenied { kind } => self.on_permission_denied(kind).await,
            other => debug!("Ignoring {:?} callback", other),
        }
        Ok(())
    }

    async fn on_connected(&mut self, welcome: Option<String>) {
        match self.apply(StateEvent::ConnectedCallback) {
            Transition::Move(_) => {}
            Transition::Stay => {
                debug!("Duplicate connect callback ignored");
                return;
            }
            Transition::Reject => {
                warn!("Connect callback while {}", self.session.state);
                return;
            }
        }

        self.connections.on_connected();
        self.participants.reset();
        self.session.connected_at = Some(Utc::now());
        info!(
            "Connected to {} as {} (account {})",
            self.session.target.address, self.session.target.username, self.session.account_name
        );
        if let Some(welcome) = welcome {
            for line in welcome.lines().map(str::trim).filter(|l| !l.is_empty()) {
                info!("Welcome: {}", line);
            }
        }

        self.peripherals.led(Led::Online, true);
        self.peripherals.clear_display();
        self.peripherals.display_line(0, &self.session.target.address);
        self.peripherals.display_line(2, &self.session.target.username);

        if let Some(comment) = self.session.comment.clone() {
            if let Err(e) = self.client.set_comment(&comment).await {
                warn!("Unable to set comment: {}", e);
            }
        }

        self.join_configured_channel().await;
        self.update_participants().await;
    }

    async fn join_configured_channel(&mut self) {
        let name = self.session.channel_name.clone();
        if name.is_empty() {
            return;
        }

        let found = self.navigator.refresh().await.find_by_name(&name).map(|c| c.id);
        match found {
            None => {
                warn!("Unable to find channel name {}", name);
                self.navigator.reset();
            }
            Some(id) => match self.client.move_to_channel(id).await {
                Ok(()) => {
                    self.navigator.select(id);
                    info!("Joined channel {}", name);
                    self.peripherals.display_line(1, &format!("Joined {}", name));
                }
                Err(e) => warn!("Unable to join channel {}: {}", name, e),
            },
        }
    }

    async fn on_disconnected(&mut self, reason: DisconnectReason) -> Result<(), ControllerError> {
        if !matches!(
            self.apply(StateEvent::DisconnectedCallback),
            Transition::Move(_)
        ) {
            debug!("Disconnect callback during server hop");
            return Ok(());
        }

        self.session.connected_at = None;
        self.session.current_channel_id = None;
        self.participants.reset();
        // a new connection starts at the root, not where this one left off
        self.navigator.reset();
        for led in [Led::Online, Led::Participants, Led::Transmit] {
            self.peripherals.led(led, false);
        }

        if self.connections.is_hopping() {
            return Ok(());
        }

        warn!(
            "Connection to {} disconnected ({:?}), attempting reconnection",
            self.session.target.address, reason
        );
        self.peripherals.display_line(0, "Reconnecting");
        self.apply(StateEvent::Dial);
        let target = self.session.target.clone();
        match self.connections.reconnect(&target).await {
            Ok(()) => Ok(()),
            Err(e) => self.dial_failed(e),
        }
    }

    fn on_text_message(&mut self, sender: Option<String>, message: &str) {
        let stripped = self.html_tags.replace_all(message, "");
        let mut text = stripped.trim().to_string();
        if text.chars().count() > MAX_MESSAGE_CHARS {
            warn!(
                "Message too long, showing the first {} characters",
                MAX_MESSAGE_CHARS
            );
            text = text.chars().take(MAX_MESSAGE_CHARS).collect();
        }

        let sender = sender.unwrap_or_else(|| "Server".to_string());
        info!("Message from {}: {}", sender, text);
        self.touch();
        self.peripherals.display_line(2, &format!("Msg From {}", sender));
        self.peripherals.display_line(3, &text);
        self.event_sound();
    }

    async fn on_user_changed(&mut self, user: &str, channel: &str, change: UserChange) {
        debug!("User {} {} ({})", user, change.label(), channel);
        if change == UserChange::Channel {
            info!("{} Changed Channel to {}", user, channel);
            self.peripherals
                .display_line(2, &format!("{}->{}", user, channel));
        }
        self.update_participants().await;
    }

    async fn on_permission_denied(&mut self, kind: DeniedKind) {
        let label = kind.label();
        warn!("Permission denied {}", label);
        self.peripherals.display_line(2, &label);

        if kind == DeniedKind::Permission {
            if let Some(outcome) = self.navigator.recover_denied().await {
                self.report_navigation(outcome).await;
            }
        }
    }

    fn event_sound(&self) {
        let sounds = &self.config.sounds;
        if !sounds.event_sound_enabled {
            return;
        }
        if let Err(e) = self
            .peripherals
            .play_local(&sounds.event_sound_file, sounds.chimes_volume)
        {
            warn!("Unable to play event sound: {}", e);
        }
    }

    fn announce(&self, text: &str) {
        let announcements = &self.config.announcements;
        if !(announcements.enabled && announcements.participants) {
            return;
        }
        if let Err(e) = self.peripherals.announce(text) {
            warn!("Announcement failed: {}", e);
        }
    }

    async fn update_participants(&mut self) {
        let Some(here) = self.client.self_channel().await else {
            return;
        };
        self.session.current_channel_id = Some(here.id);

        let Some(occupancy) = self.participants.observe(here.participant_count) else {
            return;
        };
        self.event_sound();
        match occupancy {
            Occupancy::Shared(count) => {
                info!("Channel {} has {} participants", here.name, count);
                self.announce(&format!(
                    "There Are Currently {} Users in The Channel {}",
                    count, here.name
                ));
                self.peripherals
                    .display_line(1, &format!("{} ({} Users)", here.name, count));
                self.peripherals.led(Led::Participants, true);
                self.peripherals.led(Led::Online, true);
            }
            Occupancy::Alone => {
                info!("Channel {} has no other participants", here.name);
                self.announce(&format!(
                    "You are Currently Alone in The Channel {}",
                    here.name
                ));
                self.peripherals
                    .display_line(1, &format!("Alone in {}", here.name));
                self.peripherals.led(Led::Participants, false);
            }
        }
    }

    async fn report_navigation(&mut self, outcome: NavOutcome) {
        match outcome {
            NavOutcome::Moved(channel) => {
                info!("Now in channel {} ({})", channel.name, channel.id);
                self.peripherals.display_line(1, &channel.name);
            }
            NavOutcome::BoundaryReached(Direction::Down) => {
                self.peripherals.display_line(2, "Min Chan Reached");
            }
            NavOutcome::BoundaryReached(_) => {
                self.peripherals.display_line(2, "Max Chan Reached");
            }
            NavOutcome::RootReselected(root) => {
                info!(
                    "Root channel {} has {} participant(s)",
                    root.name, root.participant_count
                );
                self.peripherals.display_line(1, &root.name);
            }
            NavOutcome::ScanFound(channel) => {
                self.peripherals
                    .display_line(2, &format!("Scan: {}", channel.name));
            }
            NavOutcome::ScanExhausted => {
                self.peripherals.display_line(2, "Scan: nobody online");
            }
            NavOutcome::NotConnected => {
                warn!("Not connected, channel request ignored");
                return;
            }
        }
        self.update_participants().await;
    }

    pub async fn transmit_start(&mut self) {
        let was_streaming = self.session.is_streaming();
        match self.apply(StateEvent::TransmitStart) {
            Transition::Move(_) => {}
            Transition::Stay => {
                info!("Already in Transmitting Mode");
                return;
            }
            Transition::Reject => {
                warn!("Cannot transmit while {}", self.session.state);
                return;
            }
        }

        self.touch();
        if self.config.transmit.simplex_with_mute {
            if let Err(e) = self.peripherals.set_muted(true) {
                warn!("Unable to mute speaker: {}", e);
            }
        }
        if was_streaming {
            self.client.stop_stream_playback().await;
            let sounds = &self.config.sounds;
            match self
                .client
                .play_into_stream(&sounds.chimes_file, sounds.chimes_volume)
                .await
            {
                Ok(()) => self.let_stream_finish(TRANSITION_CHIME).await,
                Err(e) => error!("Unable to play the transition chime: {}", e),
            }
        }

        self.peripherals.led(Led::Transmit, true);
        self.peripherals.display_line(0, "Online/TX");
        self.peripherals
            .display_line(3, &format!("TX at {}", Local::now().format("%H:%M:%S")));

        let transmit = &self.config.transmit;
        if transmit.repeater_tone_enabled {
            if let Err(e) = self
                .peripherals
                .play_local(&transmit.repeater_tone_file, transmit.repeater_tone_volume)
            {
                warn!("Unable to play repeater tone: {}", e);
            }
        }

        // nothing else may play into the channel under our voice
        if self.client.is_stream_playing().await {
            self.client.stop_stream_playback().await;
            debug!("Stream playback stopped for transmission");
        }

        if let Err(e) = self.client.start_transmit().await {
            error!("Unable to start transmitting: {}", e);
        }
    }

    async fn let_stream_finish(&self, limit: Duration) {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline && self.client.is_stream_playing().await {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    }

    /// Stops a transmission; does nothing when not transmitting.
    pub async fn transmit_stop(&mut self, unmute: bool) {
        if !matches!(self.apply(StateEvent::TransmitStop), Transition::Move(_)) {
            return;
        }

        self.peripherals.led(Led::Transmit, false);
        self.peripherals
            .display_line(0, &self.session.target.address);
        self.peripherals.display_line(3, "");
        if let Err(e) = self.client.stop_transmit().await {
            warn!("Unable to stop transmitting: {}", e);
        }
        if unmute && self.config.transmit.simplex_with_mute {
            if let Err(e) = self.peripherals.set_muted(false) {
                warn!("Unable to unmute speaker: {}", e);
            }
        }
    }

    /// Plays a file into the channel. Returns whether it started.
    ///
    /// # Errors
    /// Only a stream that cannot be opened at all is fatal; a file that fails
    /// to play is logged and skipped.
    async fn stream_file(&self, file: &Path, volume: u8) -> Result<bool, ControllerError> {
        match self.client.play_into_stream(file, volume).await {
            Ok(()) => Ok(true),
            Err(e @ VoiceError::StreamUnavailable(_)) => {
                error!("Unable to open the audio stream: {}", e);
                Err(ControllerError::StreamFailed(e))
            }
            Err(e) => {
                error!("Unable to stream {}: {}", file.display(), e);
                Ok(false)
            }
        }
    }

    /// Starts or stops streaming the chimes file into the channel.
    pub async fn toggle_stream(&mut self) -> Result<(), ControllerError> {
        if self.session.is_transmitting() {
            self.transmit_stop(false).await;
        }

        match self.apply(StateEvent::StreamToggle) {
            Transition::Move(SessionState::Streaming) => {
                let note = format!("{} Streaming", self.session.target.username);
                if let Err(e) = self.client.send_message(&note, false).await {
                    warn!("Unable to announce stream: {}", e);
                }
                let sounds = self.config.sounds.clone();
                if !self
                    .stream_file(&sounds.chimes_file, sounds.chimes_volume)
                    .await?
                {
                    self.apply(StateEvent::StreamToggle);
                    return Ok(());
                }
                info!("Streaming {}", sounds.chimes_file.display());
                self.peripherals.display_line(2, "Streaming");
            }
            Transition::Move(_) => {
                self.client.stop_stream_playback().await;
                info!("Stream stopped");
                self.peripherals.display_line(2, "");
            }
            _ => warn!("Cannot stream while {}", self.session.state),
        }
        Ok(())
    }

    /// Leaves the current server and dials the next (or previous) account.
    pub async fn server_hop(&mut self, forward: bool) -> Result<(), ControllerError> {
        if self.accounts.len() <= 1 {
            info!(
                "voxgate will remain connected to Account Name [{}], Account Server Address [{}], Account Index [{}]",
                self.session.account_name,
                self.session.target.address,
                self.accounts.index()
            );
            return Ok(());
        }

        self.transmit_stop(true).await;
        if self.session.is_streaming() {
            self.client.stop_stream_playback().await;
        }
        if self.apply(StateEvent::HopRequested) == Transition::Reject {
            warn!("Server hop already in progress");
            return Ok(());
        }

        self.connections.begin_hop();
        self.connections.disconnect().await;
        for led in [Led::Online, Led::Participants, Led::Transmit] {
            self.peripherals.led(led, false);
        }
        self.participants.reset();
        self.navigator.reset();

        let account = if forward {
            self.accounts.advance().clone()
        } else {
            self.accounts.retreat().clone()
        };
        self.session = Session {
            state: SessionState::ServerHopping,
            ..Session::from_account(self.accounts.index(), &account)
        };
        self.log_account();
        self.peripherals
            .display_line(0, &format!("Hop to {}", account.name));
        self.dial().await
    }

    async fn read_gps(&self) -> Option<GpsFix> {
        if !self.config.gps.enabled {
            warn!("GPS Function Not Enabled");
            return None;
        }
        for attempt in 1..=GPS_TRIES {
            match self.gps.read_position().await {
                Ok(Some(fix)) => return Some(fix),
                Ok(None) => debug!("No GPS fix on try {}", attempt),
                Err(e) => {
                    error!("GPS Function Returned Error Message {}", e);
                    return None;
                }
            }
        }
        warn!("Could Not Get a Good GPS Read");
        None
    }

    async fn send_message(&self, text: &str, recursive: bool) {
        if let Err(e) = self.client.send_message(text, recursive).await {
            warn!("Unable to send message: {}", e);
        }
    }

    async fn panic_simulation(&mut self) -> Result<(), ControllerError> {
        if !self.session.is_connected() {
            warn!("Not connected, panic simulation ignored");
            return Ok(());
        }
        let panic = self.config.panic.clone();
        if !panic.enabled {
            warn!("Panic Function Disabled in Config");
            return Ok(());
        }

        self.transmit_stop(false).await;
        self.send_message(&panic.message, panic.recursive).await;
        if panic.send_ident {
            let ident = format!(
                "My Username is {} and Ident is {}",
                self.session.target.username, self.session.ident
            );
            self.send_message(&ident, panic.recursive).await;
        }
        if panic.send_gps_location {
            if let Some(fix) = self.read_gps().await {
                info!("Sending GPS Info My Message");
                let position = format!(
                    "My GPS Coordinates are Latitude {:.6} Longitude {:.6}",
                    fix.latitude, fix.longitude
                );
                self.send_message(&position, panic.recursive).await;
            }
        }

        self.stream_file(&panic.sound_file, panic.volume).await?;
        if panic.tx_lock_enabled && panic.tx_lock_timeout_secs > 0 {
            self.lock_transmit(Duration::from_secs(panic.tx_lock_timeout_secs))
                .await;
        }
        self.peripherals.display_line(3, "Panic Message Sent!");
        Ok(())
    }

    async fn lock_transmit(&mut self, duration: Duration) {
        info!("TX Locked for {} seconds", duration.as_secs());
        self.transmit_stop(false).await;
        self.transmit_start().await;

        if let Some(previous) = self.tx_lock.take() {
            previous.abort();
        }
        let inputs = self.inputs.clone();
        self.tx_lock = Some(tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = inputs
                .send(ControlInput::Timer(TimerEvent::TxLockExpired))
                .await;
        }));
    }

    async fn toggle_repeat_tx(&mut self) {
        if let Some(running) = self.repeat_tx.take() {
            if !running.is_finished() {
                running.abort();
                info!("Repeat Tx Loop Test Forcefully Stopped");
                self.transmit_stop(true).await;
                return;
            }
        }

        info!("Repeat Tx Loop Test started ({} cycles)", REPEAT_TX_CYCLES);
        let inputs = self.inputs.clone();
        self.repeat_tx = Some(tokio::spawn(async move {
            for cycle in 0..REPEAT_TX_CYCLES {
                for transmit in [true, false] {
                    let tick = ControlInput::Timer(TimerEvent::RepeatTx { cycle, transmit });
                    if inputs.send(tick).await.is_err() {
                        return;
                    }
                    tokio::time::sleep(REPEAT_TX_STEP).await;
                }
            }
        }));
    }

    /// Applies a tick from one of the background timers.
    pub async fn handle_timer(&mut self, timer: TimerEvent) -> Result<(), ControllerError> {
        match timer {
            TimerEvent::TxLockExpired => {
                self.tx_lock = None;
                self.transmit_stop(true).await;
                info!(
                    "TX UnLocked After {} seconds",
                    self.config.panic.tx_lock_timeout_secs
                );
            }
            TimerEvent::RepeatTx {
                transmit: true, ..
            } => self.transmit_start().await,
            TimerEvent::RepeatTx {
                cycle,
                transmit: false,
            } => {
                self.transmit_stop(true).await;
                if cycle > 0 {
                    info!("TX Cycle {}", cycle);
                }
            }
            TimerEvent::BeaconDue => {
                if self.session.state != SessionState::Connected {
                    debug!("Beacon skipped while {}", self.session.state);
                } else {
                    let beacon = self.config.beacon.clone();
                    info!("Sending beacon {}", beacon.file.display());
                    self.stream_file(&beacon.file, beacon.volume).await?;
                }
            }
        }
        Ok(())
    }

    fn set_mute(&self, muted: Option<bool>) {
        let target = match muted {
            Some(muted) => muted,
            None => match self.peripherals.is_muted() {
                Ok(current) => !current,
                Err(e) => {
                    warn!("Unable to read mute state: {}", e);
                    return;
                }
            },
        };
        match self.peripherals.set_muted(target) {
            Ok(()) => {
                let label = if target { "Muted" } else { "Unmuted" };
                info!("Speaker {}", label);
                self.peripherals.display_line(2, label);
            }
            Err(e) => warn!("Unable to change mute state: {}", e),
        }
    }

    fn change_volume(&self, up: bool) {
        let current = match self.peripherals.volume() {
            Ok(volume) => volume,
            Err(e) => {
                warn!("Unable to read volume: {}", e);
                return;
            }
        };
        let next = match (up, current) {
            (true, v) if v >= 100 => {
                info!("Already at maximum volume");
                self.peripherals.display_line(2, "Max Vol");
                return;
            }
            (false, 0) => {
                info!("Already at minimum volume");
                self.peripherals.display_line(2, "Min Vol");
                return;
            }
            (true, v) => v + 1,
            (false, v) => v - 1,
        };
        match self.peripherals.set_volume(next) {
            Ok(()) => {
                info!("Volume {}", next);
                self.peripherals.display_line(2, &format!("Volume {}", next));
            }
            Err(e) => warn!("Unable to set volume: {}", e),
        }
    }

    async fn list_channels(&mut self) {
        let table = self.navigator.refresh().await;
        if table.is_empty() {
            warn!("No channel list, not connected?");
            return;
        }
        for line in table.describe() {
            info!("{}", line);
        }
    }

    async fn list_users(&self) {
        let Some(here) = self.client.self_channel().await else {
            warn!("Not connected, no users to list");
            return;
        };
        let users: Vec<_> = self
            .client
            .users()
            .await
            .into_iter()
            .filter(|u| u.channel_id == here.id)
            .collect();
        info!("Channel {} Has {} Online User(s)", here.name, users.len());
        for (i, user) in users.iter().enumerate() {
            if user.comment.is_empty() {
                info!("{}. {}", i + 1, user.name);
            } else {
                info!("{}. {} ({})", i + 1, user.name, user.comment);
            }
        }
    }

    async fn request_gps(&self) {
        if let Some(fix) = self.read_gps().await {
            info!(
                "GPS Latitude {:.6} Longitude {:.6} at {}",
                fix.latitude,
                fix.longitude,
                fix.taken_at.format("%Y-%m-%d %H:%M:%S")
            );
            info!("Map: {}", fix.maps_url());
            self.peripherals
                .display_line(3, &format!("{:.4},{:.4}", fix.latitude, fix.longitude));
        }
    }

    async fn send_email(&self) {
        let email = &self.config.email;
        if !email.enabled {
            warn!("Sending Email Disabled in Config");
            return;
        }

        let fix = if self.config.gps.enabled {
            match self.read_gps().await {
                Some(fix) => Some(fix),
                None => return,
            }
        } else {
            None
        };

        let mut body = format!("{}\n", email.message);
        body.push_str(&format!("Ident: {}\n", self.session.ident));
        body.push_str(&format!("Username: {}\n", self.session.target.username));
        if let Some(fix) = fix {
            if email.gps_date_time {
                body.push_str(&format!(
                    "Date {} UTC Time {}\n",
                    fix.taken_at.format("%Y-%m-%d"),
                    fix.taken_at.format("%H:%M:%S")
                ));
            }
            if email.gps_lat_long {
                body.push_str(&format!(
                    "Latitude {:.6} Longitude {:.6}\n",
                    fix.latitude, fix.longitude
                ));
            }
            if email.maps_url {
                body.push_str(&fix.maps_url());
            }
        }

        match self
            .notifier
            .send(&email.receiver, &email.subject, &body)
            .await
        {
            Ok(()) => info!("Email sent to {}", email.receiver),
            Err(e) => error!("Error from Email Module: {}", e),
        }
    }

    async fn ping_servers(&self) {
        for (i, account) in self.accounts.all().iter().enumerate() {
            let marker = if account.server == self.session.target.address {
                " ** Connected ** "
            } else {
                ""
            };
            info!("Server # {} [{}]{}", i + 1, account.name, marker);

            match self.client.ping(&account.server).await {
                Ok(report) => {
                    let (major, minor, patch) = report.version;
                    info!("Server Address:         {}", report.address);
                    info!("Server Ping:            {:?}", report.round_trip);
                    info!("Server Version:         {}.{}.{}", major, minor, patch);
                    info!(
                        "Server Users:           {}/{}",
                        report.connected_users, report.maximum_users
                    );
                    info!("Server Maximum Bitrate: {}", report.maximum_bitrate);
                }
                Err(e) => error!("Ping Error {}", e),
            }
        }
    }

    fn record(&self, kind: RecordKind) {
        let audio = &self.config.audio_record;
        if !audio.enabled {
            warn!("Audio Recording Function Not Enabled");
            return;
        }
        if RecordKind::from(audio.mode) != kind {
            warn!("{:?} Recording Not Enabled", kind);
            return;
        }

        let label = match kind {
            RecordKind::Traffic => "Traffic Audio Rec ->",
            RecordKind::Ambient => "Mic Audio Rec ->",
            RecordKind::Combo => "Combo Audio Rec ->",
        };
        match RecordingJob::new(kind, audio, &self.config.timings).start(&self.jobs) {
            Some(id) => {
                debug!("{} running as job {}", kind.job_kind(), id);
                self.peripherals.display_line(2, label);
            }
            None => warn!("{} request dropped", kind.job_kind()),
        }
    }

    fn serve_recordings(&self) {
        let audio = &self.config.audio_record;
        let server = RecordingsFileServer::new(audio.save_path.clone(), audio.file_server_port);
        match server.start(&self.jobs) {
            Some(_) => info!(
                "Recordings available on port {}",
                audio.file_server_port
            ),
            None => warn!("Recordings file server request dropped"),
        }
    }

    fn dump_state(&self) {
        info!("State Dump Requested");
        match serde_json::to_string_pretty(&self.status()) {
            Ok(json) => {
                for line in json.lines() {
                    info!("{}", line);
                }
            }
            Err(e) => warn!("Unable to serialize state: {}", e),
        }
        info!("Navigation: {:?}", self.navigator.cursor());
    }

    fn print_config(&self) {
        match toml::to_string_pretty(&self.config.redacted()) {
            Ok(text) => {
                for line in text.lines() {
                    info!("{}", line);
                }
            }
            Err(e) => warn!("Unable to print configuration: {}", e),
        }
    }

    fn uptime(&self) -> String {
        human_duration(self.started_at.elapsed().as_secs())
    }

    /// Runs one command to completion.
    ///
    /// # Errors
    /// Fatal failures only: a lost connection that could not be re-established
    /// or an audio stream that could not be opened.
    pub async fn execute(&mut self, command: Command, origin: Origin) -> Result<Flow, ControllerError> {
        debug!("{:?} requested from {}", command, origin);
        self.touch();

        match command {
            Command::DisplayMenu => {
                for (key, command) in KEY_BINDINGS {
                    info!("{:<8} {}", key.to_uppercase(), command.description());
                }
                if self.config.api.enabled {
                    let registry = CommandRegistry::new(self.config.api.clone());
                    info!(
                        "HTTP commands on port {}: {}",
                        self.config.api.listen_port,
                        registry.enabled_http_tokens().join(" ")
                    );
                }
            }
            Command::ChannelUp => {
                let outcome = self.navigator.up().await;
                self.report_navigation(outcome).await;
            }
            Command::ChannelDown => {
                let outcome = self.navigator.down().await;
                self.report_navigation(outcome).await;
            }
            Command::Scan => {
                info!("Scanning Channels");
                let outcome = self.navigator.scan().await;
                self.report_navigation(outcome).await;
            }
            Command::MuteToggle => self.set_mute(None),
            Command::Mute => self.set_mute(Some(true)),
            Command::Unmute => self.set_mute(Some(false)),
            Command::CurrentVolume => match self.peripherals.volume() {
                Ok(volume) => {
                    info!("Volume Level is {}", volume);
                    self.peripherals
                        .display_line(2, &format!("Volume {}", volume));
                }
                Err(e) => warn!("Unable to read volume: {}", e),
            },
            Command::VolumeUp => self.change_volume(true),
            Command::VolumeDown => self.change_volume(false),
            Command::ListChannels => self.list_channels().await,
            Command::StartTransmitting => self.transmit_start().await,
            Command::StopTransmitting => {
                if self.session.is_transmitting() {
                    self.transmit_stop(true).await;
                } else {
                    info!("Not Already Transmitting");
                }
            }
            Command::ListUsers => self.list_users().await,
            Command::ToggleChimes => self.toggle_stream().await?,
            Command::RequestGps => self.request_gps().await,
            Command::SendEmail => self.send_email().await,
            Command::PreviousServer => self.server_hop(false).await?,
            Command::NextServer => self.server_hop(true).await?,
            Command::ClearScreen => self.peripherals.clear_display(),
            Command::PingServers => self.ping_servers().await,
            Command::PanicSimulation => self.panic_simulation().await?,
            Command::RepeatTxLoop => self.toggle_repeat_tx().await,
            Command::Acknowledgements => {
                for line in ACKNOWLEDGEMENTS {
                    info!("{}", line);
                }
            }
            Command::Version => info!("voxgate Version {}", crate::VERSION),
            Command::Uptime => info!("voxgate Now Running For {}", self.uptime()),
            Command::PrintConfig => self.print_config(),
            Command::DumpState => self.dump_state(),
            Command::RecordTraffic => self.record(RecordKind::Traffic),
            Command::RecordAmbient => self.record(RecordKind::Ambient),
            Command::RecordCombo => self.record(RecordKind::Combo),
            Command::ServeRecordings => self.serve_recordings(),
            Command::Quit => {
                info!("voxgate Now Running For {}", self.uptime());
                return Ok(Flow::Stop);
            }
        }
        Ok(Flow::Continue)
    }

    /// Stops every job, leaves the server and blanks the panel.
    pub async fn shutdown(&mut self, grace: Duration) {
        info!("Shutting down");
        for task in [self.tx_lock.take(), self.repeat_tx.take()]
            .into_iter()
            .flatten()
        {
            task.abort();
        }

        self.transmit_stop(true).await;
        if self.session.is_streaming() {
            self.client.stop_stream_playback().await;
        }
        self.connections.disconnect().await;
        self.apply(StateEvent::DisconnectedCallback);

        self.jobs.shutdown(grace).await;
        self.backlight = None;

        self.peripherals.clear_display();
        self.peripherals.display_line(0, "voxgate stopped");
        self.peripherals
            .display_line(1, &Local::now().format("%Y-%m-%d %H:%M:%S").to_string());
        self.peripherals.all_leds_off();
        info!("voxgate stopped after {}", self.uptime());
    }
}
