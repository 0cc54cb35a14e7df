//! Command surface shared by the terminal and the HTTP endpoint.

pub mod command;
pub mod registry;

pub use command::{Command, Origin, KEY_BINDINGS};
pub use registry::{CommandRegistry, Resolution};
