use async_trait::async_trait;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::traits::{GpsFix, GpsReceiver, Led, Notifier, Peripherals};
use crate::error_handling::types::PeripheralError;

pub const DISPLAY_ROWS: usize = 4;

#[derive(Debug)]
struct PanelState {
    leds: BTreeMap<Led, bool>,
    rows: [String; DISPLAY_ROWS],
    backlight: bool,
    muted: bool,
    volume: u8,
    played: Vec<String>,
    announced: Vec<String>,
}

/// Peripherals for a box without GPIO, LCD or mixer access.
///
/// Every operation is logged and remembered so the current panel state can be
/// inspected (the status endpoint and the tests read it back).
#[derive(Debug)]
pub struct HeadlessPeripherals {
    state: Mutex<PanelState>,
}

impl Default for HeadlessPeripherals {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessPeripherals {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(PanelState {
                leds: BTreeMap::new(),
                rows: Default::default(),
                backlight: true,
                muted: false,
                volume: 80,
                played: Vec::new(),
                announced: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PanelState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn led_state(&self, led: Led) -> bool {
        self.lock().leds.get(&led).copied().unwrap_or(false)
    }

    pub fn row(&self, row: usize) -> String {
        self.lock().rows.get(row).cloned().unwrap_or_default()
    }

    pub fn backlight_on(&self) -> bool {
        self.lock().backlight
    }

    /// Files played locally, oldest first.
    pub fn played(&self) -> Vec<String> {
        self.lock().played.clone()
    }

    pub fn announced(&self) -> Vec<String> {
        self.lock().announced.clone()
    }
}

impl Peripherals for HeadlessPeripherals {
    fn led(&self, led: Led, on: bool) {
        let mut state = self.lock();
        if state.leds.insert(led, on) != Some(on) {
            debug!("LED {:?} {}", led, if on { "on" } else { "off" });
        }
    }

    fn all_leds_off(&self) {
        let mut state = self.lock();
        for value in state.leds.values_mut() {
            *value = false;
        }
        debug!("All LEDs off");
    }

    fn display_line(&self, row: usize, text: &str) {
        let mut state = self.lock();
        if let Some(slot) = state.rows.get_mut(row) {
            *slot = text.to_string();
            debug!("Display row {}: {}", row, text);
        } else {
            warn!("Display has no row {}", row);
        }
    }

    fn clear_display(&self) {
        self.lock().rows = Default::default();
    }

    fn backlight(&self, on: bool) {
        let mut state = self.lock();
        if state.backlight != on {
            debug!("Backlight {}", if on { "on" } else { "off" });
        }
        state.backlight = on;
    }

    fn set_muted(&self, muted: bool) -> Result<(), PeripheralError> {
        self.lock().muted = muted;
        Ok(())
    }

    fn is_muted(&self) -> Result<bool, PeripheralError> {
        Ok(self.lock().muted)
    }

    fn volume(&self) -> Result<u8, PeripheralError> {
        Ok(self.lock().volume)
    }

    fn set_volume(&self, volume: u8) -> Result<(), PeripheralError> {
        if volume > 100 {
            return Err(PeripheralError::AudioFailed(format!(
                "volume {} out of range",
                volume
            )));
        }
        self.lock().volume = volume;
        Ok(())
    }

    fn play_local(&self, file: &Path, volume: u8) -> Result<(), PeripheralError> {
        info!("Playing {} locally at volume {}", file.display(), volume);
        self.lock().played.push(file.display().to_string());
        Ok(())
    }

    fn announce(&self, text: &str) -> Result<(), PeripheralError> {
        info!("Announcement: {}", text);
        self.lock().announced.push(text.to_string());
        Ok(())
    }
}

/// GPS receiver answering with a configured position.
#[derive(Debug, Clone, Default)]
pub struct StaticGps {
    position: Option<(f64, f64)>,
}

impl StaticGps {
    pub fn new(position: Option<(f64, f64)>) -> Self {
        Self { position }
    }
}

#[async_trait]
impl GpsReceiver for StaticGps {
    async fn read_position(&self) -> Result<Option<GpsFix>, PeripheralError> {
        match self.position {
            Some((latitude, longitude)) => Ok(Some(GpsFix {
                latitude,
                longitude,
                taken_at: Utc::now(),
            })),
            None => Err(PeripheralError::Unavailable(
                "no GPS receiver configured".to_string(),
            )),
        }
    }
}

/// Notifier that writes messages to the log instead of mailing them.
#[derive(Debug, Default)]
pub struct LogNotifier {
    sent: Mutex<Vec<(String, String, String)>>,
}

impl LogNotifier {
    pub fn sent(&self) -> Vec<(String, String, String)> {
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, receiver: &str, subject: &str, body: &str) -> Result<(), PeripheralError> {
        if receiver.trim().is_empty() {
            return Err(PeripheralError::NotifyFailed(
                "no receiver configured".to_string(),
            ));
        }
        info!("Email to {} [{}]: {}", receiver, subject, body);
        self.sent
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((receiver.to_string(), subject.to_string(), body.to_string()));
        Ok(())
    }
}
