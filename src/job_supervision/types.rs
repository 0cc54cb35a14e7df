use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::process::ExitStatus;
use uuid::Uuid;

/// Background jobs that share the single exclusion slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobKind {
    TrafficRecord,
    AmbientRecord,
    ComboRecord,
    FileServer,
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobKind::TrafficRecord => "traffic recording",
            JobKind::AmbientRecord => "ambient recording",
            JobKind::ComboRecord => "combo recording",
            JobKind::FileServer => "recordings file server",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordKind {
    Traffic,
    Ambient,
    Combo,
}

impl RecordKind {
    pub fn job_kind(self) -> JobKind {
        match self {
            RecordKind::Traffic => JobKind::TrafficRecord,
            RecordKind::Ambient => JobKind::AmbientRecord,
            RecordKind::Combo => JobKind::ComboRecord,
        }
    }
}

impl From<crate::configuration::RecordMode> for RecordKind {
    fn from(mode: crate::configuration::RecordMode) -> Self {
        match mode {
            crate::configuration::RecordMode::Traffic => RecordKind::Traffic,
            crate::configuration::RecordMode::Ambient => RecordKind::Ambient,
            crate::configuration::RecordMode::Combo => RecordKind::Combo,
        }
    }
}

/// How a recorder process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Termination {
    Signaled(i32),
    /// Exit code, or -1 when the platform reported none.
    Exited(i32),
}

impl Termination {
    pub fn from_status(status: ExitStatus) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return Termination::Signaled(signal);
            }
        }
        Termination::Exited(status.code().unwrap_or(-1))
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Signaled(sig) => write!(f, "signal: {}", sig),
            Termination::Exited(code) => write!(f, "exit status {}", code),
        }
    }
}

/// What a finished recording job reports back.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingReport {
    pub kind: RecordKind,
    pub output: PathBuf,
    pub termination: Option<Termination>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveJob {
    pub id: Uuid,
    pub kind: JobKind,
    pub started_at: DateTime<Utc>,
}
