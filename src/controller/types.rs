use serde::Serialize;

use crate::commands::{Command, Origin};
use crate::job_supervision::types::ActiveJob;
use crate::session_management::SessionSummary;

/// Everything the control loop reacts to, apart from voice callbacks which
/// arrive on their own channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlInput {
    Command { command: Command, origin: Origin },
    Timer(TimerEvent),
    Shutdown,
}

/// Ticks from background timers that need to touch the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    TxLockExpired,
    RepeatTx { cycle: u32, transmit: bool },
    BeaconDue,
}

/// What one loop iteration tells the runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Stop,
}

/// Coordinator state published after every input, served on `GET /status`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub session: SessionSummary,
    pub account_index: usize,
    pub account_count: usize,
    pub connect_attempts: u32,
    pub participants: Option<usize>,
    pub active_job: Option<ActiveJob>,
    pub running_jobs: usize,
    pub uptime_secs: u64,
}
