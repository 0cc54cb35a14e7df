//! Session coordination and the runtime around it.
//!
//! [`controller_handler::Controller`] owns the event loop: keypresses, HTTP
//! commands, voice callbacks and timer ticks all end up as messages handled one
//! at a time by the [`coordinator::SessionCoordinator`].

pub mod controller_handler;
pub mod coordinator;
pub mod participants;
pub mod types;

pub use controller_handler::{control_loop, Controller};
pub use coordinator::{human_duration, Backends, SessionCoordinator};
pub use participants::{Occupancy, ParticipantTracker};
pub use types::{ControlInput, Flow, StatusSnapshot, TimerEvent};
