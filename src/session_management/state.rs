use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Transmitting,
    Streaming,
    ServerHopping,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateEvent {
    Dial,
    DialFailed,
    ConnectedCallback,
    DisconnectedCallback,
    TransmitStart,
    TransmitStop,
    StreamToggle,
    HopRequested,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Move(SessionState),
    /// Accepted, nothing changes.
    Stay,
    /// Not valid from this state; callers log and ignore.
    Reject,
}

impl SessionState {
    pub fn is_online(self) -> bool {
        matches!(
            self,
            SessionState::Connected | SessionState::Transmitting | SessionState::Streaming
        )
    }
}

/// The only place session state changes are decided.
pub fn next_state(from: SessionState, event: StateEvent) -> Transition {
    use SessionState::*;
    use StateEvent::*;

    match (from, event) {
        (Disconnected | ServerHopping, Dial) => Transition::Move(Connecting),
        (Connecting, DialFailed) => Transition::Move(Disconnected),

        (Connecting, ConnectedCallback) => Transition::Move(Connected),
        (Connected | Transmitting | Streaming, ConnectedCallback) => Transition::Stay,

        (Connecting | Connected | Transmitting | Streaming, DisconnectedCallback) => {
            Transition::Move(Disconnected)
        }
        (ServerHopping, DisconnectedCallback) => Transition::Stay,

        (Connected | Streaming, TransmitStart) => Transition::Move(Transmitting),
        (Transmitting, TransmitStart) => Transition::Stay,
        (Transmitting, TransmitStop) => Transition::Move(Connected),
        (_, TransmitStop) => Transition::Stay,

        (Connected | Transmitting, StreamToggle) => Transition::Move(Streaming),
        (Streaming, StreamToggle) => Transition::Move(Connected),

        (ServerHopping, HopRequested) => Transition::Reject,
        (_, HopRequested) => Transition::Move(ServerHopping),

        _ => Transition::Reject,
    }
}
