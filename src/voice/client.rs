use async_trait::async_trait;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::events::EventSink;
use crate::error_handling::types::VoiceError;

/// Where and as whom to dial.
#[derive(Debug, Clone, PartialEq)]
pub struct DialTarget {
    pub address: String,
    pub username: String,
    pub password: String,
    pub insecure: bool,
    pub certificate: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelInfo {
    pub id: u32,
    pub name: String,
    pub parent_id: Option<u32>,
    pub participant_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub name: String,
    pub channel_id: u32,
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PingReport {
    pub address: String,
    pub round_trip: Duration,
    pub version: (u16, u8, u8),
    pub connected_users: u32,
    pub maximum_users: u32,
    pub maximum_bitrate: u32,
}

/// Operations the gateway needs from a voice-chat client library.
///
/// `connect` performs a single dial. Session callbacks (connected, disconnected,
/// permission denied, ...) are not returned from these calls; they are pushed
/// through the [`EventSink`] given to `connect` and consumed by the control loop.
#[async_trait]
pub trait VoiceClient: Send + Sync {
    async fn connect(&self, target: &DialTarget, events: EventSink) -> Result<(), VoiceError>;
    async fn disconnect(&self);
    async fn move_to_channel(&self, channel_id: u32) -> Result<(), VoiceError>;
    async fn send_message(&self, text: &str, recursive: bool) -> Result<(), VoiceError>;
    async fn set_comment(&self, comment: &str) -> Result<(), VoiceError>;
    async fn channels(&self) -> Vec<ChannelInfo>;
    async fn self_channel(&self) -> Option<ChannelInfo>;
    async fn users(&self) -> Vec<UserInfo>;
    async fn start_transmit(&self) -> Result<(), VoiceError>;
    async fn stop_transmit(&self) -> Result<(), VoiceError>;
    async fn play_into_stream(&self, file: &Path, volume: u8) -> Result<(), VoiceError>;
    async fn stop_stream_playback(&self);
    async fn is_stream_playing(&self) -> bool;
    async fn ping(&self, address: &str) -> Result<PingReport, VoiceError>;
}
