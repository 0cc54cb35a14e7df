use serde::Serialize;
use tokio::sync::mpsc;

/// Callback delivered by a voice backend, tagged with the dial generation
/// that produced it so events from a torn-down session can be discarded.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub generation: u64,
    pub kind: SessionEventKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DisconnectReason {
    Requested,
    Error,
    Kicked,
    Banned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum UserChange {
    Connected,
    Disconnected,
    Kicked,
    Banned,
    Registered,
    Unregistered,
    Name,
    Channel,
    Comment,
    Audio,
    PrioritySpeaker,
    Recording,
    Stats,
}

impl UserChange {
    pub fn label(&self) -> &'static str {
        match self {
            UserChange::Connected => "conn",
            UserChange::Disconnected => "disconnected!",
            UserChange::Kicked => "kicked",
            UserChange::Banned => "banned",
            UserChange::Registered => "registered",
            UserChange::Unregistered => "unregistered",
            UserChange::Name => "chg name",
            UserChange::Channel => "chg channel",
            UserChange::Comment => "chg comment",
            UserChange::Audio => "chg audio",
            UserChange::PrioritySpeaker => "is priority",
            UserChange::Recording => "chg rec status",
            UserChange::Stats => "chg stats",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum DeniedKind {
    Permission,
    SuperUser,
    InvalidChannelName,
    TextTooLong,
    TemporaryChannel,
    MissingCertificate,
    InvalidUserName,
    ChannelFull,
    NestingLimit,
    Other(String),
}

impl DeniedKind {
    pub fn label(&self) -> String {
        match self {
            DeniedKind::Permission => "insufficient permissions".to_string(),
            DeniedKind::SuperUser => "cannot modify SuperUser".to_string(),
            DeniedKind::InvalidChannelName => "invalid channel name".to_string(),
            DeniedKind::TextTooLong => "text too long".to_string(),
            DeniedKind::TemporaryChannel => "temporary channel".to_string(),
            DeniedKind::MissingCertificate => "missing certificate".to_string(),
            DeniedKind::InvalidUserName => "invalid user name".to_string(),
            DeniedKind::ChannelFull => "channel full".to_string(),
            DeniedKind::NestingLimit => "nesting limit".to_string(),
            DeniedKind::Other(reason) => reason.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionEventKind {
    Connected {
        welcome: Option<String>,
    },
    Disconnected {
        reason: DisconnectReason,
    },
    TextMessage {
        sender: Option<String>,
        message: String,
    },
    UserChanged {
        user: String,
        channel: String,
        change: UserChange,
    },
    PermissionDenied {
        kind: DeniedKind,
    },
    ChannelChanged,
    UserList,
    Acl,
    BanList,
    ContextActionChange,
    ServerConfig,
    AudioStream,
}

/// Sending half handed to a backend on each dial.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: u64,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queues an event for the control loop. Returns false once the loop is gone.
    pub fn emit(&self, kind: SessionEventKind) -> bool {
        self.tx
            .send(SessionEvent {
                generation: self.generation,
                kind,
            })
            .is_ok()
    }
}
