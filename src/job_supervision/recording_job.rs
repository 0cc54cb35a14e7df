use chrono::{Local, Utc};
use log::{debug, error, info, warn};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::time::Instant;
use uuid::Uuid;

use super::archive::{archive_and_clear, ArchiveTask};
use super::supervisor::JobSupervisor;
use super::types::{RecordKind, RecordingReport, Termination};
use crate::configuration::types::{AudioRecordConfig, TimingsConfig};
use crate::error_handling::types::JobError;

/// Voice activation: drop leading silence and split on half a second below 2%.
const SILENCE_ARGS: [&str; 7] = ["silence", "-l", "1", "1", "2%", "-1", "0.5"];
const SILENCE_THRESHOLD: &str = "2%";

enum Stop {
    Deadline,
    Terminated,
    Exited(io::Result<ExitStatus>),
}

/// One run of the external recorder.
///
/// The recorder writes `<YYYYMMDDhhmmss>.<format>` into the save directory and
/// starts a new chunk every `chunk_size` seconds. A timed job kills and reaps
/// it after the timeout; an untimed job lets it run until it exits or the
/// gateway shuts down.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingJob {
    pub kind: RecordKind,
    pub recorder: PathBuf,
    pub save_path: PathBuf,
    pub archive_path: PathBuf,
    pub system: String,
    pub output_device: String,
    pub input_device: String,
    pub file_format: String,
    pub chunk_size: u64,
    pub timeout: Option<Duration>,
    pub grace: Duration,
    pub liveness_interval: Duration,
}

impl RecordingJob {
    pub fn new(kind: RecordKind, audio: &AudioRecordConfig, timings: &TimingsConfig) -> Self {
        let timeout_secs = match kind {
            RecordKind::Traffic | RecordKind::Combo => audio.timeout_secs,
            RecordKind::Ambient => audio.mic_timeout_secs,
        };

        RecordingJob {
            kind,
            recorder: audio.recorder.clone(),
            save_path: audio.save_path.clone(),
            archive_path: audio.archive_path.clone(),
            system: audio.system.clone(),
            output_device: audio.from_output.clone(),
            input_device: audio.from_input.clone(),
            file_format: audio.file_format.clone(),
            chunk_size: audio.chunk_size,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            grace: Duration::from_millis(timings.record_grace_ms),
            liveness_interval: Duration::from_secs(timings.liveness_interval_secs.max(1)),
        }
    }

    fn trims_silence(&self) -> bool {
        match self.kind {
            RecordKind::Ambient | RecordKind::Combo => true,
            RecordKind::Traffic => self.timeout.is_none(),
        }
    }

    /// Recorder arguments writing to `file` (relative to the save directory).
    pub fn build_args(&self, file: &str) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match self.kind {
            RecordKind::Traffic => {
                args.extend(["-t".into(), self.system.clone(), self.output_device.clone()]);
            }
            RecordKind::Ambient => {
                args.extend(["-t".into(), self.system.clone(), self.input_device.clone()]);
            }
            RecordKind::Combo => {
                args.push("-m".into());
                args.extend(["-t".into(), self.system.clone(), self.output_device.clone()]);
                args.extend(["-t".into(), self.system.clone(), self.input_device.clone()]);
            }
        }

        args.extend(["-t".into(), self.file_format.clone(), file.to_string()]);

        if self.trims_silence() {
            args.extend(SILENCE_ARGS.iter().map(|s| s.to_string()));
            args.push(SILENCE_THRESHOLD.to_string());
        }

        let chunk = self.chunk_size.to_string();
        args.extend(
            ["trim", "0", chunk.as_str(), ":", "newfile", ":", "restart"]
                .iter()
                .map(|s| s.to_string()),
        );
        args
    }

    pub fn output_file_name(&self) -> String {
        format!("{}.{}", Local::now().format("%Y%m%d%H%M%S"), self.file_format)
    }

    /// Creates the directories and archives whatever a previous run left behind.
    pub fn prepare(&self) -> Result<Option<ArchiveTask>, JobError> {
        archive_and_clear(&self.save_path, &self.archive_path)
    }

    /// Takes the job slot and runs prepare + record on a supervised task.
    ///
    /// Returns `None` when another job holds the slot.
    pub fn start(self, supervisor: &JobSupervisor) -> Option<Uuid> {
        let token = supervisor.try_acquire(self.kind.job_kind())?;
        let archives = supervisor.clone();

        Some(supervisor.spawn(token, move |terminate| async move {
            match self.prepare() {
                Ok(Some(task)) => archives.track_archive(task),
                Ok(None) => {}
                Err(e) => {
                    error!("Unable to prepare {}: {}", self.save_path.display(), e);
                    return;
                }
            }

            match self.run(terminate).await {
                Ok(report) => info!(
                    "Recording {} ended ({})",
                    report.output.display(),
                    report
                        .termination
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "unknown".to_string())
                ),
                Err(e) => error!("Recording failed: {}", e),
            }
        }))
    }

    /// Spawns the recorder and supervises it until the timeout, its own exit or
    /// `terminate`.
    pub async fn run(&self, mut terminate: oneshot::Receiver<()>) -> Result<RecordingReport, JobError> {
        if !self.recorder.exists() {
            error!(
                "{} is missing. Is the package installed?",
                self.recorder.display()
            );
        }

        let file = self.output_file_name();
        let args = self.build_args(&file);
        let output = self.save_path.join(&file);
        info!("Recording {:?} audio to {}", self.kind, output.display());
        debug!("Recorder arguments: {}", args.join(" "));

        let started_at = Utc::now();
        let mut child = Command::new(&self.recorder)
            .args(&args)
            .current_dir(&self.save_path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                error!("Unable to start {}: {}", self.recorder.display(), e);
                JobError::SpawnFailed(format!("{}: {}", self.recorder.display(), e))
            })?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[recorder] {}", line);
                }
            });
        }

        let stop = match self.timeout {
            Some(limit) => {
                debug!("Recording will time out after {} seconds", limit.as_secs());
                tokio::select! {
                    _ = tokio::time::sleep(limit) => Stop::Deadline,
                    _ = &mut terminate => Stop::Terminated,
                    status = child.wait() => Stop::Exited(status),
                }
            }
            None => self.watch_untimed(&mut child, &mut terminate).await,
        };

        let status = match stop {
            Stop::Exited(status) => status?,
            Stop::Deadline | Stop::Terminated => {
                if let Err(e) = child.kill().await {
                    warn!("Unable to kill the recorder: {}", e);
                }
                child.wait().await?
            }
        };

        let termination = Termination::from_status(status);
        match termination {
            Termination::Signaled(sig) => debug!("Recorder signal: {}", sig),
            Termination::Exited(code) => debug!("Recorder status: {}", code),
        }
        info!("Stopped recording to {}", self.save_path.display());

        Ok(RecordingReport {
            kind: self.kind,
            output,
            termination: Some(termination),
            started_at,
            finished_at: Utc::now(),
        })
    }

    async fn watch_untimed(&self, child: &mut Child, terminate: &mut oneshot::Receiver<()>) -> Stop {
        let started = Instant::now();

        tokio::select! {
            _ = tokio::time::sleep(self.grace) => {}
            _ = &mut *terminate => return Stop::Terminated,
            status = child.wait() => return Stop::Exited(status),
        }

        if dir_has_entries(&self.save_path) {
            info!("Recording to {}", self.save_path.display());
            info!("Recorder will go on until it runs out of space or is interrupted");
        } else {
            error!("Recorder was launched but no output appeared in {}", self.save_path.display());
            warn!("Check sound settings and recorder arguments");
        }

        let mut ticker = tokio::time::interval_at(
            started + self.liveness_interval,
            self.liveness_interval,
        );
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let elapsed = started.elapsed();
                    debug!(
                        "Recorder is still running after {} | {}",
                        short_duration(elapsed),
                        hours_minutes(elapsed)
                    );
                }
                _ = &mut *terminate => return Stop::Terminated,
                status = child.wait() => return Stop::Exited(status),
            }
        }
    }
}

fn dir_has_entries(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

/// `1h2m3s` style, whole seconds.
fn short_duration(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{}h{}m{}s", h, m, s)
    } else if m > 0 {
        format!("{}m{}s", m, s)
    } else {
        format!("{}s", s)
    }
}

/// `hh:mm`, minutes rounded to the nearest.
fn hours_minutes(elapsed: Duration) -> String {
    let minutes = (elapsed.as_secs() + 30) / 60;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn job(kind: RecordKind, timeout_secs: u64) -> RecordingJob {
        let audio = AudioRecordConfig {
            timeout_secs,
            mic_timeout_secs: timeout_secs,
            system: "alsa".to_string(),
            from_output: "loopout".to_string(),
            from_input: "mic".to_string(),
            ..AudioRecordConfig::default()
        };
        RecordingJob::new(kind, &audio, &TimingsConfig::default())
    }

    fn fake_recorder(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-sox.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[test]
    fn timed_traffic_keeps_silence() {
        let args = job(RecordKind::Traffic, 60).build_args("a.mp3");
        assert_eq!(
            args.join(" "),
            "-t alsa loopout -t mp3 a.mp3 trim 0 300 : newfile : restart"
        );
    }

    #[test]
    fn untimed_traffic_trims_silence() {
        let args = job(RecordKind::Traffic, 0).build_args("a.mp3");
        assert_eq!(
            args.join(" "),
            "-t alsa loopout -t mp3 a.mp3 silence -l 1 1 2% -1 0.5 2% trim 0 300 : newfile : restart"
        );
    }

    #[test]
    fn combo_mixes_output_then_input() {
        let args = job(RecordKind::Combo, 30).build_args("c.mp3");
        assert_eq!(
            args.join(" "),
            "-m -t alsa loopout -t alsa mic -t mp3 c.mp3 silence -l 1 1 2% -1 0.5 2% trim 0 300 : newfile : restart"
        );
    }

    #[test]
    fn ambient_uses_mic_timeout() {
        let audio = AudioRecordConfig {
            timeout_secs: 10,
            mic_timeout_secs: 0,
            ..AudioRecordConfig::default()
        };
        let ambient = RecordingJob::new(RecordKind::Ambient, &audio, &TimingsConfig::default());
        let traffic = RecordingJob::new(RecordKind::Traffic, &audio, &TimingsConfig::default());
        assert_eq!(ambient.timeout, None);
        assert_eq!(traffic.timeout, Some(Duration::from_secs(10)));
    }

    #[test]
    fn liveness_formats() {
        assert_eq!(short_duration(Duration::from_secs(300)), "5m0s");
        assert_eq!(short_duration(Duration::from_secs(3725)), "1h2m5s");
        assert_eq!(hours_minutes(Duration::from_secs(3725)), "01:02");
    }

    #[tokio::test]
    #[serial]
    async fn timed_job_is_killed_after_the_timeout() {
        let _ = env_logger::builder().is_test(true).try_init();
        let dir = TempDir::new().unwrap();
        let mut recording = job(RecordKind::Traffic, 1);
        recording.recorder = fake_recorder(dir.path(), "exec sleep 30");
        recording.save_path = dir.path().join("save");
        std::fs::create_dir_all(&recording.save_path).unwrap();

        let (_terminate_tx, terminate_rx) = oneshot::channel();
        let started = std::time::Instant::now();
        let report = recording.run(terminate_rx).await.unwrap();

        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(started.elapsed() < Duration::from_secs(20));
        assert_eq!(report.termination, Some(Termination::Signaled(9)));
    }

    #[tokio::test]
    #[serial]
    async fn untimed_job_reports_the_exit_code() {
        let dir = TempDir::new().unwrap();
        let mut recording = job(RecordKind::Ambient, 0);
        recording.recorder = fake_recorder(dir.path(), "exit 3");
        recording.save_path = dir.path().join("save");
        std::fs::create_dir_all(&recording.save_path).unwrap();

        let (_terminate_tx, terminate_rx) = oneshot::channel();
        let report = recording.run(terminate_rx).await.unwrap();

        assert_eq!(report.termination, Some(Termination::Exited(3)));
    }

    #[tokio::test]
    #[serial]
    async fn terminate_stops_an_untimed_job() {
        let dir = TempDir::new().unwrap();
        let mut recording = job(RecordKind::Traffic, 0);
        recording.recorder = fake_recorder(dir.path(), "exec sleep 30");
        recording.save_path = dir.path().join("save");
        std::fs::create_dir_all(&recording.save_path).unwrap();

        let (terminate_tx, terminate_rx) = oneshot::channel();
        let run = tokio::spawn(async move { recording.run(terminate_rx).await });
        tokio::time::sleep(Duration::from_millis(200)).await;
        terminate_tx.send(()).unwrap();

        let report = run.await.unwrap().unwrap();
        assert_eq!(report.termination, Some(Termination::Signaled(9)));
    }

    #[tokio::test]
    #[serial]
    async fn missing_recorder_fails_to_spawn_and_frees_the_slot() {
        let dir = TempDir::new().unwrap();
        let mut recording = job(RecordKind::Traffic, 1);
        recording.recorder = dir.path().join("no-such-recorder");
        recording.save_path = dir.path().join("save");
        recording.archive_path = dir.path().join("archive");

        let supervisor = JobSupervisor::new();
        assert!(recording.clone().start(&supervisor).is_some());

        for _ in 0..200 {
            if !supervisor.is_busy() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert!(!supervisor.is_busy());
        assert!(matches!(
            recording.run(oneshot::channel().1).await,
            Err(JobError::SpawnFailed(_))
        ));
    }
}
