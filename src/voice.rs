//! Voice-session library boundary.
//!
//! The wire protocol is provided by an external client library; the gateway only
//! depends on the [`VoiceClient`] trait and consumes [`SessionEvent`] callbacks.
//! [`SimulatedServer`] is the in-process implementation.

pub mod client;
pub mod events;
pub mod simulated;

pub use client::{ChannelInfo, DialTarget, PingReport, UserInfo, VoiceClient};
pub use events::{DeniedKind, DisconnectReason, EventSink, SessionEvent, SessionEventKind, UserChange};
pub use simulated::SimulatedServer;
