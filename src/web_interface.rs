//! HTTP command endpoint.
//!
//! `GET /?command=<token>` queues the matching command on the control loop and
//! answers with a plain-text message. `GET /status` returns the last status
//! snapshot published by the loop as JSON.

pub mod routes;
pub mod web_server;

pub use routes::*;
pub use web_server::*;
