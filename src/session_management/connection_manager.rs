use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::error_handling::types::{ConnectionError, VoiceError};
use crate::voice::{DialTarget, EventSink, SessionEvent, VoiceClient};

/// Dials allowed before the gateway gives up.
pub const MAX_CONNECT_ATTEMPTS: u32 = 3;

/// Dials the voice server and runs the bounded reconnect policy.
///
/// Every dial bumps the session generation handed to the backend, so callbacks
/// still in flight from an older session can be recognised and dropped. The
/// attempt counter is shared by the first dial and the retries; a connected
/// callback puts it back to 1.
pub struct ConnectionManager {
    client: Arc<dyn VoiceClient>,
    events: mpsc::UnboundedSender<SessionEvent>,
    generation: u64,
    attempts: u32,
    server_hop: bool,
    retry_delay: Duration,
}

impl ConnectionManager {
    pub fn new(
        client: Arc<dyn VoiceClient>,
        events: mpsc::UnboundedSender<SessionEvent>,
        retry_delay: Duration,
    ) -> Self {
        Self {
            client,
            events,
            generation: 0,
            attempts: 0,
            server_hop: false,
            retry_delay,
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self, generation: u64) -> bool {
        generation == self.generation
    }

    pub fn is_hopping(&self) -> bool {
        self.server_hop
    }

    /// Marks a server hop: attempts start over and a dropped session is not
    /// redialled until the new one connects.
    pub fn begin_hop(&mut self) {
        self.server_hop = true;
        self.attempts = 0;
    }

    async fn dial(&mut self, target: &DialTarget) -> Result<(), VoiceError> {
        self.attempts += 1;
        self.generation += 1;
        info!(
            "Connecting to {} as {} (attempt {}/{})",
            target.address, target.username, self.attempts, MAX_CONNECT_ATTEMPTS
        );
        let sink = EventSink::new(self.generation, self.events.clone());
        self.client.connect(target, sink).await
    }

    /// One dial. On failure, and unless a hop is in progress, falls through to
    /// [`ConnectionManager::reconnect`].
    pub async fn connect(&mut self, target: &DialTarget) -> Result<(), ConnectionError> {
        match self.dial(target).await {
            Ok(()) => Ok(()),
            Err(e) if self.server_hop => {
                error!("Connecting to {} failed: {}", target.address, e);
                Err(ConnectionError::DialFailed {
                    address: target.address.clone(),
                    source: e,
                })
            }
            Err(e) => {
                warn!(
                    "Connection to {} failed: {}, attempting again...",
                    target.address, e
                );
                self.reconnect(target).await
            }
        }
    }

    /// Tears down any live session and redials until the attempt budget is spent.
    pub async fn reconnect(&mut self, target: &DialTarget) -> Result<(), ConnectionError> {
        info!("Attempting reconnection with {}", target.address);
        self.client.disconnect().await;

        while self.attempts < MAX_CONNECT_ATTEMPTS {
            tokio::time::sleep(self.retry_delay).await;
            match self.dial(target).await {
                Ok(()) => return Ok(()),
                Err(e) => warn!("Connection to {} failed: {}", target.address, e),
            }
        }

        error!("Unable to connect, giving up");
        Err(ConnectionError::RetriesExhausted {
            attempts: self.attempts,
        })
    }

    pub fn on_connected(&mut self) {
        if self.attempts != 1 {
            debug!("Connected on attempt {}", self.attempts);
        }
        self.attempts = 1;
        self.server_hop = false;
    }

    pub async fn disconnect(&self) {
        self.client.disconnect().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::SimulatedServer;

    fn target(address: &str) -> DialTarget {
        DialTarget {
            address: address.to_string(),
            username: "gate".to_string(),
            password: String::new(),
            insecure: true,
            certificate: None,
        }
    }

    fn manager(server: Arc<SimulatedServer>) -> (ConnectionManager, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ConnectionManager::new(server, tx, Duration::from_millis(10)), rx)
    }

    #[tokio::test(start_paused = true)]
    async fn exactly_three_dials_then_fatal() {
        let server = Arc::new(SimulatedServer::new(&[(0, "Root", None)]));
        server.set_unreachable("down:64738");
        let (mut connections, _rx) = manager(server.clone());

        let result = connections.connect(&target("down:64738")).await;

        assert!(matches!(
            result,
            Err(ConnectionError::RetriesExhausted { attempts: 3 })
        ));
        assert_eq!(server.dial_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn connected_callback_resets_attempts_to_one() {
        let server = Arc::new(SimulatedServer::new(&[(0, "Root", None)]));
        server.set_unreachable("flaky:64738");
        let (mut connections, _rx) = manager(server.clone());

        let first = connections.dial(&target("flaky:64738")).await;
        assert!(first.is_err());
        server.set_reachable("flaky:64738");
        connections.reconnect(&target("flaky:64738")).await.unwrap();
        assert_eq!(connections.attempts(), 2);

        connections.on_connected();
        assert_eq!(connections.attempts(), 1);
        connections.on_connected();
        assert_eq!(connections.attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_dial_during_hop_does_not_retry() {
        let server = Arc::new(SimulatedServer::new(&[(0, "Root", None)]));
        server.set_unreachable("next:64738");
        let (mut connections, _rx) = manager(server.clone());

        connections.begin_hop();
        let result = connections.connect(&target("next:64738")).await;

        assert!(matches!(result, Err(ConnectionError::DialFailed { .. })));
        assert_eq!(server.dial_count(), 1);
    }

    #[tokio::test]
    async fn each_dial_gets_a_new_generation() {
        let server = Arc::new(SimulatedServer::new(&[(0, "Root", None)]));
        let (mut connections, mut rx) = manager(server);

        connections.connect(&target("a:1")).await.unwrap();
        let first = rx.recv().await.unwrap();
        connections.begin_hop();
        connections.connect(&target("b:1")).await.unwrap();

        assert!(!connections.is_current(first.generation));
        assert!(connections.is_current(connections.generation()));
    }
}
