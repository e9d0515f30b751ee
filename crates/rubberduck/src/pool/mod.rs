//! Worker pool dispatcher
//!
//! A fixed number of long-lived worker processes, one per slot. Submissions
//! wait for a free slot, run on that slot's worker and deliver their result
//! through a one-shot channel behind a [`WorkerHandle`]. A supervisor task
//! reclaims workers that overrun their deadline.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

use crate::config::{Config, SandboxPolicy};
use crate::types::{ExecutionResult, Submission};
use crate::worker::{WorkerError, WorkerProcess, WorkerRequest};

pub use handle::WorkerHandle;
use slot::SlotSet;
use supervisor::JobTable;

mod handle;
mod slot;
mod supervisor;

/// Errors from the dispatcher itself
#[derive(Debug, Error)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    Closed,

    #[error("worker pool needs at least one worker")]
    Empty,

    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Snapshot of pool activity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PoolStats {
    /// Number of slots
    pub capacity: usize,

    /// Slots running a submission right now
    pub busy: usize,

    /// Highest number of simultaneously busy slots seen
    pub peak_busy: usize,

    /// Submissions that ran to a result on a worker
    pub completed: u64,

    /// Workers killed by the supervisor for overrunning
    pub reclaimed: u64,

    /// Workers started to replace a failed or retired one
    pub respawned: u64,
}

/// Fixed-size pool of worker processes
#[derive(Debug)]
pub struct WorkerPool {
    shared: Arc<Shared>,
    supervisor: JoinHandle<()>,
}

/// State shared by the pool, its dispatch tasks and the supervisor
#[derive(Debug)]
pub(crate) struct Shared {
    worker_path: PathBuf,
    policy: SandboxPolicy,
    timeout: Duration,
    reclaim_grace: Duration,
    max_jobs: u32,
    slots: SlotSet,
    workers: Vec<Mutex<Option<WorkerProcess>>>,
    jobs: JobTable,
    closed: AtomicBool,
    completed: AtomicU64,
    reclaimed: AtomicU64,
    respawned: AtomicU64,
}

impl WorkerPool {
    /// Start `pool_size` workers and the supervisor
    ///
    /// Must be called from within a Tokio runtime.
    #[instrument(skip(config), fields(size = config.pool_size))]
    pub fn start(config: &Config) -> Result<Self, PoolError> {
        if config.pool_size == 0 {
            return Err(PoolError::Empty);
        }

        let worker_path = config.worker_binary();
        let workers = (0..config.pool_size)
            .map(|_| WorkerProcess::spawn(&worker_path).map(|process| Mutex::new(Some(process))))
            .collect::<Result<Vec<_>, _>>()?;

        let shared = Arc::new(Shared {
            worker_path,
            policy: config.policy.clone(),
            timeout: config.timeout(),
            reclaim_grace: config.reclaim_grace(),
            max_jobs: config.max_jobs_per_worker.max(1),
            slots: SlotSet::new(config.pool_size),
            workers,
            jobs: JobTable::new(config.pool_size),
            closed: AtomicBool::new(false),
            completed: AtomicU64::new(0),
            reclaimed: AtomicU64::new(0),
            respawned: AtomicU64::new(0),
        });
        let supervisor = supervisor::spawn(Arc::downgrade(&shared), config.sweep_interval());

        info!(worker = %shared.worker_path.display(), "worker pool started");
        Ok(Self { shared, supervisor })
    }

    /// Queue a script for execution with the configured timeout
    pub fn submit(&self, source: impl Into<String>) -> Result<WorkerHandle, PoolError> {
        self.submit_with_timeout(source, self.shared.timeout)
    }

    /// Queue a script whose caller will wait at most `timeout`
    ///
    /// The worker running it is reclaimed once it overruns `timeout` plus
    /// the configured grace period.
    pub fn submit_with_timeout(
        &self,
        source: impl Into<String>,
        timeout: Duration,
    ) -> Result<WorkerHandle, PoolError> {
        if self.shared.closed.load(Ordering::SeqCst) {
            return Err(PoolError::Closed);
        }

        let submission = Submission::new(source);
        let (tx, rx) = oneshot::channel();
        let handle = WorkerHandle::new(submission.id, rx);

        debug!(id = %submission.id, len = submission.source.len(), "submission queued");
        tokio::spawn(self.shared.clone().dispatch(submission, timeout, tx));
        Ok(handle)
    }

    pub fn stats(&self) -> PoolStats {
        let shared = &self.shared;
        PoolStats {
            capacity: shared.slots.capacity(),
            busy: shared.slots.busy(),
            peak_busy: shared.slots.peak(),
            completed: shared.completed.load(Ordering::Relaxed),
            reclaimed: shared.reclaimed.load(Ordering::Relaxed),
            respawned: shared.respawned.load(Ordering::Relaxed),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.shared.slots.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.shared.closed.load(Ordering::SeqCst)
    }

    /// Stop accepting work, abandon queued submissions and kill every worker
    #[instrument(skip(self))]
    pub async fn shutdown(&self) {
        if self.shared.closed.swap(true, Ordering::SeqCst) {
            return;
        }

        self.shared.slots.close();
        self.shared.jobs.reclaim_all();

        for worker in &self.shared.workers {
            if let Some(mut process) = worker.lock().await.take() {
                process.kill().await;
            }
        }
        self.supervisor.abort();

        info!("worker pool shut down");
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::SeqCst);
        self.shared.slots.close();
        self.supervisor.abort();
    }
}

impl Shared {
    /// Wait for a slot, run the submission on it and deliver the result
    async fn dispatch(
        self: Arc<Self>,
        submission: Submission,
        timeout: Duration,
        mut tx: oneshot::Sender<ExecutionResult>,
    ) {
        let acquired = tokio::select! {
            acquired = self.slots.acquire() => acquired,
            () = tx.closed() => {
                debug!(id = %submission.id, "caller gave up while queued");
                return;
            }
        };
        let Ok(lease) = acquired else {
            let _ = tx.send(PoolError::Closed.into());
            return;
        };
        if tx.is_closed() {
            debug!(id = %submission.id, "caller gave up while queued");
            return;
        }

        let slot = lease.index();
        let result = self.run_on(slot, &submission, timeout).await;
        self.completed.fetch_add(1, Ordering::Relaxed);

        debug!(
            id = %submission.id,
            slot,
            status = %result.status(),
            elapsed = ?submission.received_at.elapsed(),
            "submission finished"
        );
        if tx.send(result).is_err() {
            debug!(id = %submission.id, "result arrived after the caller gave up");
        }
    }

    async fn run_on(&self, slot: usize, submission: &Submission, timeout: Duration) -> ExecutionResult {
        let Some(cell) = self.workers.get(slot) else {
            return ExecutionResult::WorkerFailure(format!("no worker for slot {slot}"));
        };
        let mut worker = cell.lock().await;

        if worker.is_none() {
            match self.replace(slot) {
                Ok(process) => *worker = Some(process),
                Err(e) => return e.into(),
            }
        }
        let Some(process) = worker.as_mut() else {
            return ExecutionResult::WorkerFailure(format!("no worker for slot {slot}"));
        };

        let request = WorkerRequest {
            id: submission.id,
            source: submission.source.clone(),
            policy: self.policy.clone(),
        };
        let reclaim = self
            .jobs
            .begin(slot, submission.id, timeout.saturating_add(self.reclaim_grace));
        // Checked after `begin` so a concurrent shutdown either sees this job or is seen here
        if self.closed.load(Ordering::SeqCst) {
            self.jobs.finish(slot);
            return PoolError::Closed.into();
        }

        let outcome = tokio::select! {
            outcome = process.exchange(&request) => outcome,
            () = reclaim.notified() => Err(WorkerError::Reclaimed),
        };
        self.jobs.finish(slot);

        match outcome {
            Ok(response) => {
                if process.jobs() >= self.max_jobs {
                    debug!(slot, jobs = process.jobs(), "retiring worker");
                    process.kill().await;
                    *worker = self.replace_logged(slot);
                }
                response.result
            }
            Err(WorkerError::Reclaimed) => {
                process.kill().await;
                *worker = self.replace_logged(slot);
                ExecutionResult::Timeout
            }
            Err(e) => {
                warn!(slot, id = %submission.id, error = %e, "worker failed");
                process.kill().await;
                *worker = self.replace_logged(slot);
                e.into()
            }
        }
    }

    /// Start a fresh worker for `slot`
    fn replace(&self, slot: usize) -> Result<WorkerProcess, WorkerError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(WorkerError::Exited("pool is shutting down".to_owned()));
        }
        let process = WorkerProcess::spawn(&self.worker_path)?;
        self.respawned.fetch_add(1, Ordering::Relaxed);
        debug!(slot, pid = process.pid(), "worker replaced");
        Ok(process)
    }

    fn replace_logged(&self, slot: usize) -> Option<WorkerProcess> {
        self.replace(slot)
            .inspect_err(|e| warn!(slot, error = %e, "failed to replace worker"))
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with(worker: &str) -> Config {
        Config {
            worker_path: Some(PathBuf::from(worker)),
            pool_size: 2,
            ..Config::default()
        }
    }

    #[tokio::test]
    async fn missing_worker_binary_fails_start() {
        let err = WorkerPool::start(&config_with("/nonexistent/rubberduck-worker")).unwrap_err();
        assert!(matches!(err, PoolError::Worker(WorkerError::Spawn { .. })));
    }

    #[tokio::test]
    async fn zero_sized_pool_is_rejected() {
        let config = Config {
            pool_size: 0,
            ..config_with("true")
        };
        assert!(matches!(WorkerPool::start(&config), Err(PoolError::Empty)));
    }

    #[tokio::test]
    async fn shut_down_pool_refuses_work() {
        let Ok(pool) = WorkerPool::start(&config_with("cat")) else {
            return;
        };
        pool.shutdown().await;
        assert!(pool.is_closed());
        assert!(matches!(pool.submit("print(1)"), Err(PoolError::Closed)));
    }

    #[tokio::test]
    async fn stats_start_empty() {
        let Ok(pool) = WorkerPool::start(&config_with("cat")) else {
            return;
        };
        let stats = pool.stats();
        assert_eq!(stats.capacity, 2);
        assert_eq!(stats.busy, 0);
        assert_eq!(stats.completed, 0);
        pool.shutdown().await;
    }
}
