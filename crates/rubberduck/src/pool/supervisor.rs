//! Hung worker detection
//!
//! Every busy slot records which submission it runs and when that job must
//! be finished by. A periodic sweep signals jobs past their deadline; the
//! task running the job then kills the worker and starts a replacement.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::{Duration, Instant};

use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use crate::pool::Shared;
use crate::types::SubmissionId;

/// Shortest sweep period accepted
const MIN_SWEEP: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct RunningJob {
    id: SubmissionId,
    started: Instant,
    // `None` when the budget is too large to ever expire
    deadline: Option<Instant>,
    reclaim: Arc<Notify>,
    signalled: bool,
}

/// What each slot is currently running
#[derive(Debug)]
pub(crate) struct JobTable {
    slots: Mutex<Vec<Option<RunningJob>>>,
}

impl JobTable {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            slots: Mutex::new((0..capacity).map(|_| None).collect()),
        }
    }

    /// Record a job starting on `slot`; the returned signal fires if it overruns
    pub(crate) fn begin(&self, slot: usize, id: SubmissionId, budget: Duration) -> Arc<Notify> {
        let started = Instant::now();
        let reclaim = Arc::new(Notify::new());
        let mut slots = self.lock();
        if let Some(entry) = slots.get_mut(slot) {
            *entry = Some(RunningJob {
                id,
                started,
                deadline: started.checked_add(budget),
                reclaim: reclaim.clone(),
                signalled: false,
            });
        }
        reclaim
    }

    pub(crate) fn finish(&self, slot: usize) {
        if let Some(entry) = self.lock().get_mut(slot) {
            *entry = None;
        }
    }

    /// Signal every job past its deadline, returning how many were newly signalled
    pub(crate) fn sweep(&self, now: Instant) -> usize {
        let mut signalled = 0;
        for (slot, entry) in self.lock().iter_mut().enumerate() {
            let Some(job) = entry else { continue };
            let overdue = job.deadline.is_some_and(|deadline| now >= deadline);
            if job.signalled || !overdue {
                continue;
            }
            warn!(
                slot,
                id = %job.id,
                running = ?now.saturating_duration_since(job.started),
                "reclaiming hung worker"
            );
            job.reclaim.notify_one();
            job.signalled = true;
            signalled += 1;
        }
        signalled
    }

    /// Signal every running job regardless of deadline
    pub(crate) fn reclaim_all(&self) {
        for job in self.lock().iter_mut().flatten() {
            job.reclaim.notify_one();
            job.signalled = true;
        }
    }

    #[cfg(test)]
    pub(crate) fn running(&self) -> usize {
        self.lock().iter().filter(|entry| entry.is_some()).count()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Option<RunningJob>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Start the sweep loop; it ends once the pool is dropped
pub(crate) fn spawn(shared: Weak<Shared>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval.max(MIN_SWEEP));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let Some(shared) = shared.upgrade() else {
                break;
            };
            let reclaimed = shared.jobs.sweep(Instant::now());
            if reclaimed > 0 {
                shared
                    .reclaimed
                    .fetch_add(reclaimed as u64, Ordering::Relaxed);
            }
        }

        debug!("supervisor stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jobs_within_budget_are_left_alone() {
        let table = JobTable::new(2);
        table.begin(0, SubmissionId(1), Duration::from_secs(60));
        assert_eq!(table.sweep(Instant::now()), 0);
        assert_eq!(table.running(), 1);
    }

    #[test]
    fn overdue_jobs_are_signalled_once() {
        let table = JobTable::new(2);
        table.begin(1, SubmissionId(1), Duration::ZERO);
        let later = Instant::now() + Duration::from_millis(1);
        assert_eq!(table.sweep(later), 1);
        assert_eq!(table.sweep(later), 0);
    }

    #[tokio::test]
    async fn signal_wakes_the_job() {
        let table = JobTable::new(1);
        let reclaim = table.begin(0, SubmissionId(9), Duration::ZERO);
        table.sweep(Instant::now() + Duration::from_millis(1));
        tokio::time::timeout(Duration::from_secs(1), reclaim.notified())
            .await
            .unwrap();
    }

    #[test]
    fn finished_jobs_are_forgotten() {
        let table = JobTable::new(1);
        table.begin(0, SubmissionId(3), Duration::ZERO);
        table.finish(0);
        assert_eq!(table.running(), 0);
        assert_eq!(table.sweep(Instant::now() + Duration::from_secs(1)), 0);
    }

    #[tokio::test]
    async fn reclaim_all_signals_everything() {
        let table = JobTable::new(2);
        let a = table.begin(0, SubmissionId(1), Duration::from_secs(60));
        let b = table.begin(1, SubmissionId(2), Duration::from_secs(60));
        table.reclaim_all();
        for signal in [a, b] {
            tokio::time::timeout(Duration::from_secs(1), signal.notified())
                .await
                .unwrap();
        }
    }

    #[test]
    fn unbounded_budget_never_expires() {
        let table = JobTable::new(1);
        table.begin(0, SubmissionId(4), Duration::MAX);
        assert_eq!(table.sweep(Instant::now() + Duration::from_secs(3600)), 0);
        assert_eq!(table.running(), 1);
    }
}
