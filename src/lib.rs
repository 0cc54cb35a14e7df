pub mod channel_navigation;
pub mod commands;
pub mod configuration;
pub mod controller;
pub mod error_handling;
pub mod job_supervision;
pub mod logging;
pub mod peripherals;
pub mod session_management;
pub mod voice;
pub mod web_interface;

pub use configuration::Config;
pub use controller::Controller;

/// Version reported by the banner and the version command.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
