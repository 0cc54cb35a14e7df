//! Background jobs that must not overlap: the three recording modes and the
//! recordings file server. [`JobSupervisor`] hands out the single exclusion
//! slot and keeps the handles needed to stop everything at shutdown.

pub mod archive;
pub mod file_server;
pub mod recording_job;
pub mod supervisor;
pub mod types;

pub use file_server::RecordingsFileServer;
pub use recording_job::RecordingJob;
pub use supervisor::{ExclusionToken, JobSupervisor};
pub use types::{JobKind, RecordKind, Termination};
