//! In-process voice server.
//!
//! `SimulatedServer` keeps a channel tree, a set of other users and a single
//! client session in memory and answers the [`VoiceClient`] calls the way a real
//! server would: dials can fail, moves into protected channels come back as
//! permission-denied callbacks, and membership changes are pushed as
//! user-changed callbacks. The binary runs on it out of the box and the tests
//! drive the control logic through it.

use async_trait::async_trait;
use log::{debug, info};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::client::{ChannelInfo, DialTarget, PingReport, UserInfo, VoiceClient};
use super::events::{DeniedKind, DisconnectReason, EventSink, SessionEventKind, UserChange};
use crate::configuration::types::SimulationConfig;
use crate::error_handling::types::VoiceError;

#[derive(Debug, Clone)]
struct SimChannel {
    name: String,
    parent: Option<u32>,
    users: Vec<String>,
}

#[derive(Debug)]
struct LiveSession {
    sink: EventSink,
    address: String,
    username: String,
    channel_id: u32,
}

#[derive(Debug, Default)]
struct SimState {
    channels: BTreeMap<u32, SimChannel>,
    denied: HashSet<u32>,
    unreachable: HashSet<String>,
    welcome: Option<String>,
    session: Option<LiveSession>,
    dials: Vec<String>,
    transmitting: bool,
    stream: Option<PathBuf>,
    streamed: Vec<PathBuf>,
    unplayable: HashSet<PathBuf>,
    stream_unavailable: bool,
    messages: Vec<String>,
    comment: Option<String>,
}

#[derive(Debug, Default)]
pub struct SimulatedServer {
    state: Mutex<SimState>,
}

impl SimulatedServer {
    /// Creates a server with the given `(id, name, parent)` channels.
    pub fn new(channels: &[(u32, &str, Option<u32>)]) -> Self {
        let server = Self::default();
        {
            let mut state = server.lock();
            for (id, name, parent) in channels {
                state.channels.insert(
                    *id,
                    SimChannel {
                        name: name.to_string(),
                        parent: *parent,
                        users: Vec::new(),
                    },
                );
            }
        }
        server
    }

    pub fn from_config(config: &SimulationConfig) -> Self {
        let server = Self::default();
        {
            let mut state = server.lock();
            for channel in &config.channels {
                state.channels.insert(
                    channel.id,
                    SimChannel {
                        name: channel.name.clone(),
                        parent: channel.parent,
                        users: channel.users.clone(),
                    },
                );
            }
            state.denied = config.denied_channels.iter().copied().collect();
            state.unreachable = config.unreachable_servers.iter().cloned().collect();
            state.welcome = config.welcome_message.clone();
        }
        info!(
            "Simulated voice backend ready with {} channel(s)",
            config.channels.len()
        );
        server
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn deny_channel(&self, channel_id: u32) {
        self.lock().denied.insert(channel_id);
    }

    pub fn set_unreachable(&self, address: &str) {
        self.lock().unreachable.insert(address.to_string());
    }

    pub fn set_reachable(&self, address: &str) {
        self.lock().unreachable.remove(address);
    }

    pub fn set_welcome(&self, welcome: &str) {
        self.lock().welcome = Some(welcome.to_string());
    }

    /// Makes playback of `file` fail as if it could not be decoded.
    pub fn set_unplayable(&self, file: &Path) {
        self.lock().unplayable.insert(file.to_path_buf());
    }

    /// Makes the outgoing audio stream itself fail to open.
    pub fn set_stream_unavailable(&self, unavailable: bool) {
        self.lock().stream_unavailable = unavailable;
    }

    /// Every file played into the stream, in order.
    pub fn streamed(&self) -> Vec<PathBuf> {
        self.lock().streamed.clone()
    }

    /// Addresses dialed so far, in order.
    pub fn dials(&self) -> Vec<String> {
        self.lock().dials.clone()
    }

    pub fn dial_count(&self) -> usize {
        self.lock().dials.len()
    }

    pub fn is_transmitting(&self) -> bool {
        self.lock().transmitting
    }

    pub fn sent_messages(&self) -> Vec<String> {
        self.lock().messages.clone()
    }

    pub fn comment(&self) -> Option<String> {
        self.lock().comment.clone()
    }

    pub fn current_channel(&self) -> Option<u32> {
        self.lock().session.as_ref().map(|s| s.channel_id)
    }

    /// Puts another user in `channel_id` and notifies the connected client.
    pub fn add_user(&self, channel_id: u32, name: &str) {
        let mut state = self.lock();
        let channel_name = match state.channels.get_mut(&channel_id) {
            Some(channel) => {
                channel.users.push(name.to_string());
                channel.name.clone()
            }
            None => return,
        };
        if let Some(session) = state.session.as_ref() {
            session.sink.emit(SessionEventKind::UserChanged {
                user: name.to_string(),
                channel: channel_name,
                change: UserChange::Connected,
            });
        }
    }

    pub fn remove_user(&self, name: &str) {
        let mut state = self.lock();
        let mut removed_from = None;
        for channel in state.channels.values_mut() {
            if let Some(pos) = channel.users.iter().position(|u| u == name) {
                channel.users.remove(pos);
                removed_from = Some(channel.name.clone());
            }
        }
        if let (Some(channel), Some(session)) = (removed_from, state.session.as_ref()) {
            session.sink.emit(SessionEventKind::UserChanged {
                user: name.to_string(),
                channel,
                change: UserChange::Disconnected,
            });
        }
    }

    /// Drops the client session as a network failure would.
    pub fn drop_connection(&self) {
        let mut state = self.lock();
        state.transmitting = false;
        state.stream = None;
        if let Some(session) = state.session.take() {
            session.sink.emit(SessionEventKind::Disconnected {
                reason: DisconnectReason::Error,
            });
        }
    }

    /// Delivers a text message from `sender` to the connected client.
    pub fn deliver_message(&self, sender: &str, message: &str) {
        let state = self.lock();
        if let Some(session) = state.session.as_ref() {
            session.sink.emit(SessionEventKind::TextMessage {
                sender: Some(sender.to_string()),
                message: message.to_string(),
            });
        }
    }

    fn channel_info(state: &SimState, id: u32) -> Option<ChannelInfo> {
        let channel = state.channels.get(&id)?;
        let self_here = state
            .session
            .as_ref()
            .map(|s| s.channel_id == id)
            .unwrap_or(false);
        Some(ChannelInfo {
            id,
            name: channel.name.clone(),
            parent_id: channel.parent,
            participant_count: channel.users.len() + usize::from(self_here),
        })
    }
}

#[async_trait]
impl VoiceClient for SimulatedServer {
    async fn connect(&self, target: &DialTarget, events: EventSink) -> Result<(), VoiceError> {
        let mut state = self.lock();
        state.dials.push(target.address.clone());

        if state.unreachable.contains(&target.address) {
            debug!("Simulated dial to {} refused", target.address);
            return Err(VoiceError::DialFailed(format!(
                "{} is unreachable",
                target.address
            )));
        }

        let welcome = state.welcome.clone();
        events.emit(SessionEventKind::Connected { welcome });
        state.session = Some(LiveSession {
            sink: events,
            address: target.address.clone(),
            username: target.username.clone(),
            channel_id: 0,
        });
        Ok(())
    }

    async fn disconnect(&self) {
        let mut state = self.lock();
        state.transmitting = false;
        state.stream = None;
        if let Some(session) = state.session.take() {
            debug!("Simulated session to {} closed", session.address);
            session.sink.emit(SessionEventKind::Disconnected {
                reason: DisconnectReason::Requested,
            });
        }
    }

    async fn move_to_channel(&self, channel_id: u32) -> Result<(), VoiceError> {
        let mut state = self.lock();
        if !state.channels.contains_key(&channel_id) {
            return Err(VoiceError::ChannelNotFound(channel_id));
        }
        let denied = state.denied.contains(&channel_id);
        let channel_name = state
            .channels
            .get(&channel_id)
            .map(|c| c.name.clone())
            .unwrap_or_default();

        let session = state.session.as_mut().ok_or(VoiceError::NotConnected)?;
        if denied {
            session.sink.emit(SessionEventKind::PermissionDenied {
                kind: DeniedKind::Permission,
            });
            return Ok(());
        }

        session.channel_id = channel_id;
        session.sink.emit(SessionEventKind::UserChanged {
            user: session.username.clone(),
            channel: channel_name,
            change: UserChange::Channel,
        });
        Ok(())
    }

    async fn send_message(&self, text: &str, _recursive: bool) -> Result<(), VoiceError> {
        let mut state = self.lock();
        if state.session.is_none() {
            return Err(VoiceError::NotConnected);
        }
        state.messages.push(text.to_string());
        Ok(())
    }

    async fn set_comment(&self, comment: &str) -> Result<(), VoiceError> {
        let mut state = self.lock();
        if state.session.is_none() {
            return Err(VoiceError::NotConnected);
        }
        state.comment = Some(comment.to_string());
        Ok(())
    }

    async fn channels(&self) -> Vec<ChannelInfo> {
        let state = self.lock();
        state
            .channels
            .keys()
            .filter_map(|id| Self::channel_info(&state, *id))
            .collect()
    }

    async fn self_channel(&self) -> Option<ChannelInfo> {
        let state = self.lock();
        let id = state.session.as_ref()?.channel_id;
        Self::channel_info(&state, id)
    }

    async fn users(&self) -> Vec<UserInfo> {
        let state = self.lock();
        let mut users: Vec<UserInfo> = state
            .channels
            .iter()
            .flat_map(|(id, channel)| {
                channel.users.iter().map(move |name| UserInfo {
                    name: name.clone(),
                    channel_id: *id,
                    comment: String::new(),
                })
            })
            .collect();
        if let Some(session) = state.session.as_ref() {
            users.push(UserInfo {
                name: session.username.clone(),
                channel_id: session.channel_id,
                comment: state.comment.clone().unwrap_or_default(),
            });
        }
        users
    }

    async fn start_transmit(&self) -> Result<(), VoiceError> {
        let mut state = self.lock();
        if state.session.is_none() {
            return Err(VoiceError::NotConnected);
        }
        state.transmitting = true;
        Ok(())
    }

    async fn stop_transmit(&self) -> Result<(), VoiceError> {
        self.lock().transmitting = false;
        Ok(())
    }

    async fn play_into_stream(&self, file: &Path, volume: u8) -> Result<(), VoiceError> {
        let mut state = self.lock();
        if state.session.is_none() {
            return Err(VoiceError::NotConnected);
        }
        if state.stream_unavailable {
            return Err(VoiceError::StreamUnavailable(
                "no audio output stream".to_string(),
            ));
        }
        if state.unplayable.contains(file) {
            return Err(VoiceError::Playback(format!(
                "{} cannot be decoded",
                file.display()
            )));
        }
        debug!("Simulated stream of {} at volume {}", file.display(), volume);
        state.stream = Some(file.to_path_buf());
        state.streamed.push(file.to_path_buf());
        Ok(())
    }

    async fn stop_stream_playback(&self) {
        self.lock().stream = None;
    }

    async fn is_stream_playing(&self) -> bool {
        self.lock().stream.is_some()
    }

    async fn ping(&self, address: &str) -> Result<PingReport, VoiceError> {
        let state = self.lock();
        if state.unreachable.contains(address) {
            return Err(VoiceError::Transport(format!("{} did not answer", address)));
        }
        let connected_users = state
            .channels
            .values()
            .map(|c| c.users.len() as u32)
            .sum::<u32>()
            + u32::from(state.session.is_some());
        Ok(PingReport {
            address: address.to_string(),
            round_trip: Duration::from_millis(1),
            version: (1, 5, 0),
            connected_users,
            maximum_users: 100,
            maximum_bitrate: 72000,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::events::SessionEvent;
    use tokio::sync::mpsc;

    fn target(address: &str) -> DialTarget {
        DialTarget {
            address: address.to_string(),
            username: "gate".to_string(),
            password: String::new(),
            insecure: true,
            certificate: None,
        }
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEventKind> {
        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(event.kind);
        }
        kinds
    }

    #[tokio::test]
    async fn connect_emits_connected_and_counts_self() {
        let server = SimulatedServer::new(&[(0, "Root", None), (2, "Ops", Some(0))]);
        server.set_welcome("hello");
        let (tx, mut rx) = mpsc::unbounded_channel();

        server
            .connect(&target("a:1"), EventSink::new(7, tx))
            .await
            .unwrap();

        let event = rx.try_recv().unwrap();
        assert_eq!(event.generation, 7);
        assert_eq!(
            event.kind,
            SessionEventKind::Connected {
                welcome: Some("hello".to_string())
            }
        );
        let root = server.self_channel().await.unwrap();
        assert_eq!(root.id, 0);
        assert_eq!(root.participant_count, 1);
    }

    #[tokio::test]
    async fn denied_move_reports_permission_and_stays() {
        let server = SimulatedServer::new(&[(0, "Root", None), (2, "Vault", Some(0))]);
        server.deny_channel(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        server.connect(&target("a:1"), EventSink::new(1, tx)).await.unwrap();
        drain(&mut rx);

        server.move_to_channel(2).await.unwrap();

        assert_eq!(
            drain(&mut rx),
            vec![SessionEventKind::PermissionDenied {
                kind: DeniedKind::Permission
            }]
        );
        assert_eq!(server.current_channel(), Some(0));
    }

    #[tokio::test]
    async fn unreachable_dial_fails_and_is_counted() {
        let server = SimulatedServer::new(&[(0, "Root", None)]);
        server.set_unreachable("down:1");
        let (tx, _rx) = mpsc::unbounded_channel();

        let result = server.connect(&target("down:1"), EventSink::new(1, tx)).await;

        assert!(matches!(result, Err(VoiceError::DialFailed(_))));
        assert_eq!(server.dial_count(), 1);
        assert!(server.self_channel().await.is_none());
    }

    #[tokio::test]
    async fn missing_channel_is_an_error() {
        let server = SimulatedServer::new(&[(0, "Root", None)]);
        let (tx, _rx) = mpsc::unbounded_channel();
        server.connect(&target("a:1"), EventSink::new(1, tx)).await.unwrap();

        assert_eq!(
            server.move_to_channel(4).await,
            Err(VoiceError::ChannelNotFound(4))
        );
    }
}
