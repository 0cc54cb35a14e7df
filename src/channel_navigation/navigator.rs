use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::channel_table::ChannelTable;
use crate::voice::{ChannelInfo, VoiceClient};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Direction {
    #[default]
    None,
    Up,
    Down,
    Scan,
}

/// Where channel up/down continues from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct NavigationCursor {
    /// Last channel navigation moved to; `None` when nothing is selected.
    pub previous_channel_id: Option<u32>,
    pub previous_button_press: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub enum NavOutcome {
    /// Moved (or tried to) and settled; carries the channel we ended up in.
    Moved(ChannelInfo),
    BoundaryReached(Direction),
    RootReselected(ChannelInfo),
    ScanFound(ChannelInfo),
    ScanExhausted,
    NotConnected,
}

/// Channel up/down/scan over the sparse channel id space.
///
/// The table is rebuilt from the server before every request. Moves into
/// channels we may not enter come back later as a permission-denied callback;
/// [`ChannelNavigator::recover_denied`] then keeps going in the same direction.
pub struct ChannelNavigator {
    client: Arc<dyn VoiceClient>,
    table: ChannelTable,
    cursor: NavigationCursor,
    settle: Duration,
    dwell: Duration,
}

impl ChannelNavigator {
    pub fn new(client: Arc<dyn VoiceClient>, settle: Duration, dwell: Duration) -> Self {
        Self {
            client,
            table: ChannelTable::default(),
            cursor: NavigationCursor::default(),
            settle,
            dwell,
        }
    }

    pub fn cursor(&self) -> NavigationCursor {
        self.cursor
    }

    /// Forgets the selected channel, e.g. after the auto-join channel was missing.
    pub fn reset(&mut self) {
        self.cursor = NavigationCursor::default();
    }

    /// Records a channel reached by other means (auto-join, manual move).
    pub fn select(&mut self, channel_id: u32) {
        self.cursor.previous_channel_id = Some(channel_id);
    }

    pub async fn refresh(&mut self) -> &ChannelTable {
        self.table = ChannelTable::rebuild(self.client.channels().await);
        debug!(
            "Channel table rebuilt: {} channel(s), max id {}",
            self.table.len(),
            self.table.max_channel_id()
        );
        &self.table
    }

    async fn current(&mut self, direction: Direction) -> Option<u32> {
        self.refresh().await;
        let current = self.client.self_channel().await?.id;
        if self.cursor.previous_channel_id.is_none() {
            self.cursor.previous_channel_id = Some(current);
        }
        self.cursor.previous_button_press = direction;
        Some(current)
    }

    async fn move_and_settle(&mut self, channel_id: u32) -> NavOutcome {
        self.cursor.previous_channel_id = Some(channel_id);
        if let Err(e) = self.client.move_to_channel(channel_id).await {
            warn!("Unable to move to channel {}: {}", channel_id, e);
        }
        tokio::time::sleep(self.settle).await;
        match self.client.self_channel().await {
            Some(info) => NavOutcome::Moved(info),
            None => NavOutcome::NotConnected,
        }
    }

    pub async fn up(&mut self) -> NavOutcome {
        let current = match self.current(Direction::Up).await {
            Some(id) => id,
            None => return NavOutcome::NotConnected,
        };

        if current == self.table.max_channel_id() {
            warn!("Can't increment channel, maximum channel reached");
            return NavOutcome::BoundaryReached(Direction::Up);
        }

        let from = self.cursor.previous_channel_id.unwrap_or(current);
        match self.table.next_above(from) {
            Some(next) => self.move_and_settle(next).await,
            None => {
                warn!("Can't increment channel, maximum channel reached");
                self.cursor.previous_channel_id = Some(current);
                NavOutcome::BoundaryReached(Direction::Up)
            }
        }
    }

    pub async fn down(&mut self) -> NavOutcome {
        let current = match self.current(Direction::Down).await {
            Some(id) => id,
            None => return NavOutcome::NotConnected,
        };

        if current == 0 {
            warn!("Can't decrement channel, root channel reached");
            self.cursor.previous_channel_id = Some(0);
            if let Err(e) = self.client.move_to_channel(0).await {
                warn!("Unable to re-select the root channel: {}", e);
            }
            tokio::time::sleep(self.settle).await;
            return match self.client.self_channel().await {
                Some(info) => NavOutcome::RootReselected(info),
                None => NavOutcome::NotConnected,
            };
        }

        let from = self.cursor.previous_channel_id.unwrap_or(current);
        match self.table.next_below(from) {
            Some(next) => self.move_and_settle(next).await,
            None => {
                warn!("Can't decrement channel, root channel reached");
                self.cursor.previous_channel_id = Some(current);
                NavOutcome::BoundaryReached(Direction::Down)
            }
        }
    }

    /// Continues an up/down request after the server refused the last move.
    /// Returns `None` when the refusal was not caused by up/down navigation.
    pub async fn recover_denied(&mut self) -> Option<NavOutcome> {
        let direction = self.cursor.previous_button_press;
        let denied = self.cursor.previous_channel_id?;
        let next = match direction {
            Direction::Up => self.table.next_above(denied),
            Direction::Down => self.table.next_below(denied),
            Direction::None | Direction::Scan => return None,
        };

        match next {
            Some(next) => {
                info!(
                    "Channel {} refused, trying channel {} ({:?})",
                    denied, next, direction
                );
                Some(self.move_and_settle(next).await)
            }
            None => {
                warn!("No accessible channel left going {:?}", direction);
                self.cursor.previous_channel_id =
                    self.client.self_channel().await.map(|c| c.id);
                Some(NavOutcome::BoundaryReached(direction))
            }
        }
    }

    /// Sweeps forward (wrapping to the first channel) and stops in the first
    /// channel where someone else is present. Returns to the start channel
    /// when nobody was found.
    pub async fn scan(&mut self) -> NavOutcome {
        let start = match self.current(Direction::Scan).await {
            Some(id) => id,
            None => return NavOutcome::NotConnected,
        };

        let mut candidate = start;
        for _ in 0..self.table.len() {
            candidate = match self.table.next_above(candidate).or_else(|| self.table.first_id()) {
                Some(id) => id,
                None => break,
            };
            if candidate == start {
                break;
            }

            if let Err(e) = self.client.move_to_channel(candidate).await {
                debug!("Scan skipping channel {}: {}", candidate, e);
                continue;
            }
            tokio::time::sleep(self.dwell).await;

            let here = match self.client.self_channel().await {
                Some(here) => here,
                None => return NavOutcome::NotConnected,
            };
            if here.id != candidate {
                debug!("Scan could not enter channel {}", candidate);
                continue;
            }
            if here.participant_count > 1 {
                info!("Found someone online, stopped scan on channel {}", here.name);
                self.cursor.previous_channel_id = Some(here.id);
                return NavOutcome::ScanFound(here);
            }
        }

        info!("Scan complete, nobody online");
        if let Err(e) = self.client.move_to_channel(start).await {
            warn!("Unable to return to channel {}: {}", start, e);
        }
        self.cursor.previous_channel_id = Some(start);
        NavOutcome::ScanExhausted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::{DialTarget, EventSink, SessionEvent, SessionEventKind, SimulatedServer, DeniedKind};
    use tokio::sync::mpsc;

    async fn connected(server: &Arc<SimulatedServer>) -> mpsc::UnboundedReceiver<SessionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let target = DialTarget {
            address: "sim:64738".to_string(),
            username: "gate".to_string(),
            password: String::new(),
            insecure: true,
            certificate: None,
        };
        server.connect(&target, EventSink::new(1, tx)).await.unwrap();
        rx
    }

    fn server() -> Arc<SimulatedServer> {
        Arc::new(SimulatedServer::new(&[
            (0, "Root", None),
            (2, "Two", Some(0)),
            (5, "Five", Some(0)),
        ]))
    }

    fn navigator(server: &Arc<SimulatedServer>) -> ChannelNavigator {
        ChannelNavigator::new(
            server.clone(),
            Duration::from_millis(500),
            Duration::from_millis(1000),
        )
    }

    fn moved_to(outcome: &NavOutcome) -> Option<u32> {
        match outcome {
            NavOutcome::Moved(info) => Some(info.id),
            _ => None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn up_and_down_skip_gaps() {
        let server = server();
        let _rx = connected(&server).await;
        let mut nav = navigator(&server);

        assert_eq!(moved_to(&nav.up().await), Some(2));
        assert_eq!(moved_to(&nav.up().await), Some(5));
        assert_eq!(nav.up().await, NavOutcome::BoundaryReached(Direction::Up));
        assert_eq!(server.current_channel(), Some(5));

        assert_eq!(moved_to(&nav.down().await), Some(2));
        assert_eq!(moved_to(&nav.down().await), Some(0));
        match nav.down().await {
            NavOutcome::RootReselected(root) => assert_eq!(root.participant_count, 1),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn denied_channel_is_skipped_in_the_same_direction() {
        let server = server();
        server.deny_channel(2);
        let mut rx = connected(&server).await;
        let mut nav = navigator(&server);
        while rx.try_recv().is_ok() {}

        assert_eq!(moved_to(&nav.up().await), Some(0));
        let denied = rx.try_recv().unwrap();
        assert_eq!(
            denied.kind,
            SessionEventKind::PermissionDenied {
                kind: DeniedKind::Permission
            }
        );

        let recovered = nav.recover_denied().await.unwrap();
        assert_eq!(moved_to(&recovered), Some(5));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_recovery_snaps_back_to_the_actual_channel() {
        let server = server();
        server.deny_channel(5);
        let _rx = connected(&server).await;
        let mut nav = navigator(&server);

        assert_eq!(moved_to(&nav.up().await), Some(2));
        assert_eq!(moved_to(&nav.up().await), Some(2));
        assert_eq!(nav.cursor().previous_channel_id, Some(5));

        assert_eq!(
            nav.recover_denied().await,
            Some(NavOutcome::BoundaryReached(Direction::Up))
        );
        assert_eq!(nav.cursor().previous_channel_id, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn scan_stops_at_the_first_populated_channel() {
        let server = server();
        let _rx = connected(&server).await;
        server.add_user(5, "alice");
        let mut nav = navigator(&server);

        match nav.scan().await {
            NavOutcome::ScanFound(found) => {
                assert_eq!(found.id, 5);
                assert_eq!(found.participant_count, 2);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
        assert_eq!(nav.recover_denied().await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_scan_returns_to_the_start() {
        let server = server();
        let _rx = connected(&server).await;
        let mut nav = navigator(&server);
        assert_eq!(moved_to(&nav.up().await), Some(2));

        assert_eq!(nav.scan().await, NavOutcome::ScanExhausted);
        assert_eq!(server.current_channel(), Some(2));
    }
}
