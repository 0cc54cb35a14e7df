//! Hardware around the voice session: LEDs, a small text display, the local
//! speaker and mixer, a GPS receiver and an email notifier.
//!
//! The gateway talks to them through the traits in [`traits`]; [`headless`]
//! provides implementations that log instead of touching hardware.

pub mod backlight;
pub mod headless;
pub mod traits;

pub use backlight::{BacklightTimer, Heartbeat};
pub use headless::{HeadlessPeripherals, LogNotifier, StaticGps};
pub use traits::{GpsFix, GpsReceiver, Led, Notifier, Peripherals};
