use log::debug;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use super::traits::{Led, Peripherals};

/// Switches the display backlight off after a period without activity.
///
/// Any user-visible event calls [`BacklightTimer::reset`], which lights the
/// display again and restarts the countdown.
pub struct BacklightTimer {
    peripherals: Arc<dyn Peripherals>,
    activity: Arc<Notify>,
    handle: JoinHandle<()>,
}

impl BacklightTimer {
    pub fn start(peripherals: Arc<dyn Peripherals>, timeout: Duration) -> Self {
        let activity = Arc::new(Notify::new());
        let task_activity = activity.clone();
        let task_peripherals = peripherals.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        debug!("Backlight timer expired");
                        task_peripherals.backlight(false);
                        task_peripherals.led(Led::Backlight, false);
                        task_activity.notified().await;
                    }
                    _ = task_activity.notified() => {}
                }
            }
        });

        peripherals.backlight(true);
        peripherals.led(Led::Backlight, true);

        Self {
            peripherals,
            activity,
            handle,
        }
    }

    pub fn reset(&self) {
        self.peripherals.backlight(true);
        self.peripherals.led(Led::Backlight, true);
        self.activity.notify_one();
    }
}

impl Drop for BacklightTimer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Blinks the heartbeat LED while the gateway is running.
pub struct Heartbeat {
    handle: JoinHandle<()>,
}

impl Heartbeat {
    pub fn start(peripherals: Arc<dyn Peripherals>, period: Duration, on: Duration) -> Self {
        let off = period.saturating_sub(on);
        let handle = tokio::spawn(async move {
            loop {
                peripherals.led(Led::Heartbeat, true);
                tokio::time::sleep(on).await;
                peripherals.led(Led::Heartbeat, false);
                tokio::time::sleep(off).await;
            }
        });
        Self { handle }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peripherals::headless::HeadlessPeripherals;

    #[tokio::test(start_paused = true)]
    async fn backlight_turns_off_and_reset_relights_it() {
        let panel = Arc::new(HeadlessPeripherals::new());
        let timer = BacklightTimer::start(panel.clone(), Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(panel.backlight_on());

        tokio::time::sleep(Duration::from_secs(25)).await;
        assert!(!panel.backlight_on());

        timer.reset();
        assert!(panel.backlight_on());

        tokio::time::sleep(Duration::from_secs(31)).await;
        assert!(!panel.backlight_on());
    }
}
