//! Bounded-wait retrieval

use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tracing::{debug, instrument};

use crate::types::{ExecutionResult, SubmissionId, TimedResult};

/// A dispatched submission whose result has not been retrieved yet.
///
/// Retrieval consumes the handle, so each submission yields exactly one
/// result. Dropping the handle abandons the submission; if it is still
/// queued it will never reach a worker.
#[derive(Debug)]
#[must_use = "a submission's result is lost if its handle is dropped"]
pub struct WorkerHandle {
    id: SubmissionId,
    submitted_at: Instant,
    rx: oneshot::Receiver<ExecutionResult>,
}

impl WorkerHandle {
    pub(crate) fn new(id: SubmissionId, rx: oneshot::Receiver<ExecutionResult>) -> Self {
        Self {
            id,
            submitted_at: Instant::now(),
            rx,
        }
    }

    pub fn id(&self) -> SubmissionId {
        self.id
    }

    /// Wait at most `timeout` for the result
    ///
    /// Returns [`ExecutionResult::Timeout`] as soon as the bound elapses,
    /// whatever the worker is doing.
    #[instrument(skip(self), fields(id = %self.id))]
    pub async fn await_result(self, timeout: Duration) -> ExecutionResult {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => {
                ExecutionResult::WorkerFailure("submission was dropped by the pool".to_owned())
            }
            Err(_) => {
                debug!("gave up waiting");
                ExecutionResult::Timeout
            }
        }
    }

    /// Like [`await_result`](Self::await_result), also reporting the time
    /// since submission
    pub async fn await_timed(self, timeout: Duration) -> TimedResult {
        let submitted_at = self.submitted_at;
        let result = self.await_result(timeout).await;
        TimedResult {
            result,
            elapsed: submitted_at.elapsed(),
        }
    }
}
