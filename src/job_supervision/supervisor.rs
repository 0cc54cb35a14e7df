use chrono::Utc;
use log::{debug, info, warn};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::archive::ArchiveTask;
use super::types::{ActiveJob, JobKind};

type Slot = Arc<Mutex<Option<ActiveJob>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Proof of holding the process-wide job slot.
///
/// The slot is released when the token is dropped, so a job task that returns,
/// fails or panics always frees it.
#[derive(Debug)]
pub struct ExclusionToken {
    slot: Slot,
    job: ActiveJob,
}

impl ExclusionToken {
    pub fn id(&self) -> Uuid {
        self.job.id
    }

    pub fn kind(&self) -> JobKind {
        self.job.kind
    }
}

impl Drop for ExclusionToken {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.as_ref().map(|j| j.id) == Some(self.job.id) {
            *slot = None;
            debug!("Released job slot held by {} ({})", self.job.kind, self.job.id);
        }
    }
}

#[derive(Debug)]
struct JobHandle {
    id: Uuid,
    kind: JobKind,
    terminate: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

/// Owns the single exclusion slot shared by recordings and the file server,
/// and the handles of every job and archive task it started.
#[derive(Debug, Clone, Default)]
pub struct JobSupervisor {
    slot: Slot,
    jobs: Arc<Mutex<Vec<JobHandle>>>,
    archives: Arc<Mutex<Vec<ArchiveTask>>>,
}

impl JobSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the job slot for `kind`, or returns `None` when another job holds it.
    /// Requests are never queued.
    pub fn try_acquire(&self, kind: JobKind) -> Option<ExclusionToken> {
        let mut slot = lock(&self.slot);
        if let Some(active) = slot.as_ref() {
            info!(
                "Cannot start {}: {} already running since {}",
                kind,
                active.kind,
                active.started_at.format("%H:%M:%S")
            );
            return None;
        }

        let job = ActiveJob {
            id: Uuid::new_v4(),
            kind,
            started_at: Utc::now(),
        };
        *slot = Some(job.clone());
        debug!("Job slot taken by {} ({})", kind, job.id);
        Some(ExclusionToken {
            slot: self.slot.clone(),
            job,
        })
    }

    pub fn is_busy(&self) -> bool {
        lock(&self.slot).is_some()
    }

    pub fn active(&self) -> Option<ActiveJob> {
        lock(&self.slot).clone()
    }

    /// Runs `job` on its own task while `token` is held.
    ///
    /// The closure receives the terminate signal fired by [`JobSupervisor::shutdown`].
    pub fn spawn<F, Fut>(&self, token: ExclusionToken, job: F) -> Uuid
    where
        F: FnOnce(oneshot::Receiver<()>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = token.id();
        let kind = token.kind();
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let work = job(terminate_rx);

        let handle = tokio::spawn(async move {
            let _token = token;
            work.await;
            debug!("Job {} ({}) finished", kind, id);
        });

        let mut jobs = lock(&self.jobs);
        jobs.retain(|j| !j.handle.is_finished());
        jobs.push(JobHandle {
            id,
            kind,
            terminate: Some(terminate_tx),
            handle,
        });
        info!("Started {} ({})", kind, id);
        id
    }

    /// Keeps an archive task so shutdown can wait for the zip to be written.
    pub fn track_archive(&self, task: ArchiveTask) {
        let mut archives = lock(&self.archives);
        archives.retain(|a| !a.is_finished());
        archives.push(task);
    }

    pub fn running_jobs(&self) -> usize {
        lock(&self.jobs)
            .iter()
            .filter(|j| !j.handle.is_finished())
            .count()
    }

    /// Signals every job to stop and waits up to `grace` for each one, then for
    /// pending archives. Jobs still running after the grace period are aborted.
    pub async fn shutdown(&self, grace: Duration) {
        let jobs: Vec<JobHandle> = lock(&self.jobs).drain(..).collect();
        let archives: Vec<ArchiveTask> = lock(&self.archives).drain(..).collect();

        for mut job in jobs {
            if job.handle.is_finished() {
                continue;
            }
            if let Some(terminate) = job.terminate.take() {
                let _ = terminate.send(());
            }
            match tokio::time::timeout(grace, &mut job.handle).await {
                Ok(_) => debug!("Job {} ({}) stopped", job.kind, job.id),
                Err(_) => {
                    warn!(
                        "Job {} ({}) did not stop within {:?}, aborting",
                        job.kind, job.id, grace
                    );
                    job.handle.abort();
                }
            }
        }

        for archive in archives {
            let target = archive.target.clone();
            match tokio::time::timeout(grace, archive.wait()).await {
                Ok(Ok(path)) => debug!("Archive {} flushed", path.display()),
                Ok(Err(e)) => warn!("Archive {} failed: {}", target.display(), e),
                Err(_) => warn!("Archive {} still being written at exit", target.display()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn second_request_is_rejected_not_queued() {
        let supervisor = JobSupervisor::new();

        let token = supervisor.try_acquire(JobKind::TrafficRecord).unwrap();
        assert!(supervisor.try_acquire(JobKind::FileServer).is_none());
        assert!(supervisor.try_acquire(JobKind::AmbientRecord).is_none());
        assert_eq!(supervisor.active().unwrap().kind, JobKind::TrafficRecord);

        drop(token);
        assert!(!supervisor.is_busy());
        assert!(supervisor.try_acquire(JobKind::FileServer).is_some());
    }

    #[tokio::test]
    async fn slot_is_released_when_the_job_ends() {
        let supervisor = JobSupervisor::new();
        let token = supervisor.try_acquire(JobKind::ComboRecord).unwrap();
        let (done_tx, done_rx) = oneshot::channel::<()>();

        supervisor.spawn(token, |_terminate| async move {
            let _ = done_rx.await;
        });
        assert!(supervisor.try_acquire(JobKind::TrafficRecord).is_none());

        done_tx.send(()).unwrap();
        for _ in 0..100 {
            if !supervisor.is_busy() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!supervisor.is_busy());
    }

    #[tokio::test]
    async fn panicking_job_releases_the_slot() {
        let supervisor = JobSupervisor::new();
        let token = supervisor.try_acquire(JobKind::AmbientRecord).unwrap();

        supervisor.spawn(token, |_terminate| async move {
            panic!("recorder exploded");
        });

        for _ in 0..100 {
            if !supervisor.is_busy() {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert!(!supervisor.is_busy());
    }

    #[tokio::test]
    async fn shutdown_terminates_running_jobs() {
        let supervisor = JobSupervisor::new();
        let token = supervisor.try_acquire(JobKind::FileServer).unwrap();
        let stopped = Arc::new(AtomicBool::new(false));
        let flag = stopped.clone();

        supervisor.spawn(token, move |terminate| async move {
            let _ = terminate.await;
            flag.store(true, Ordering::SeqCst);
        });

        supervisor.shutdown(Duration::from_secs(1)).await;

        assert!(stopped.load(Ordering::SeqCst));
        assert!(!supervisor.is_busy());
        assert_eq!(supervisor.running_jobs(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_requests_get_one_slot() {
        let supervisor = JobSupervisor::new();
        let barrier = Arc::new(tokio::sync::Barrier::new(8));
        let kinds = [
            JobKind::TrafficRecord,
            JobKind::AmbientRecord,
            JobKind::ComboRecord,
            JobKind::FileServer,
        ];

        let contenders: Vec<_> = (0..8)
            .map(|i| {
                let supervisor = supervisor.clone();
                let barrier = barrier.clone();
                let kind = kinds[i % kinds.len()];
                tokio::spawn(async move {
                    barrier.wait().await;
                    supervisor.try_acquire(kind)
                })
            })
            .collect();

        // tokens stay alive until every contender has tried
        let mut tokens = Vec::new();
        for contender in contenders {
            tokens.push(contender.await.unwrap());
        }

        assert_eq!(tokens.iter().filter(|token| token.is_some()).count(), 1);
        assert!(supervisor.is_busy());
        drop(tokens);
        assert!(!supervisor.is_busy());
    }
}
