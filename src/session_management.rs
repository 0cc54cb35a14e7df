//! Session management core module.
//!
//! This module owns everything about the single voice session: the accounts it
//! can be built from, the explicit connection state machine, and the
//! [`ConnectionManager`] that dials and retries.

/// Submodule for the ordered account list and server hopping.
pub mod accounts;
/// Submodule for the dial / reconnect policy.
pub mod connection_manager;
/// Submodule for the live session data.
pub mod session;
/// Submodule for the session state transition table.
pub mod state;

pub use accounts::AccountSet;
pub use connection_manager::{ConnectionManager, MAX_CONNECT_ATTEMPTS};
pub use session::{Session, SessionSummary};
pub use state::{next_state, SessionState, StateEvent, Transition};
