use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

use crate::error_handling::types::PeripheralError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Led {
    Online,
    Participants,
    Transmit,
    Heartbeat,
    Backlight,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub taken_at: DateTime<Utc>,
}

impl GpsFix {
    pub fn maps_url(&self) -> String {
        format!(
            "https://www.openstreetmap.org/?mlat={:.6}&mlon={:.6}",
            self.latitude, self.longitude
        )
    }
}

/// Local indicators, display and audio of the gateway box.
pub trait Peripherals: Send + Sync {
    fn led(&self, led: Led, on: bool);
    fn all_leds_off(&self);
    fn display_line(&self, row: usize, text: &str);
    fn clear_display(&self);
    fn backlight(&self, on: bool);
    fn set_muted(&self, muted: bool) -> Result<(), PeripheralError>;
    fn is_muted(&self) -> Result<bool, PeripheralError>;
    fn volume(&self) -> Result<u8, PeripheralError>;
    fn set_volume(&self, volume: u8) -> Result<(), PeripheralError>;
    /// Plays a sound file on the local speaker only.
    fn play_local(&self, file: &Path, volume: u8) -> Result<(), PeripheralError>;
    /// Speaks `text` on the local speaker.
    fn announce(&self, text: &str) -> Result<(), PeripheralError>;
}

#[async_trait]
pub trait GpsReceiver: Send + Sync {
    /// `Ok(None)` means the receiver answered but has no fix yet.
    async fn read_position(&self) -> Result<Option<GpsFix>, PeripheralError>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, receiver: &str, subject: &str, body: &str) -> Result<(), PeripheralError>;
}
