//! Sandboxed runner
//!
//! The single entry point callers use: validate a script in the calling
//! context, hand it to the worker pool and wait for a bounded time.

use std::time::{Duration, Instant};

use tracing::{info, instrument};

use crate::config::Config;
use crate::lang::{self, CompileError};
use crate::pool::{PoolError, PoolStats, WorkerPool};
use crate::types::{ExecutionResult, TimedResult};

/// High-level runner for untrusted scripts
#[derive(Debug)]
pub struct Runner {
    config: Config,
    pool: WorkerPool,
}

impl Runner {
    /// Start a runner and its worker pool
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(config: Config) -> Result<Self, PoolError> {
        let pool = WorkerPool::start(&config)?;
        Ok(Self { config, pool })
    }

    /// Start a runner with the default configuration
    pub fn with_defaults() -> Result<Self, PoolError> {
        Self::start(Config::default())
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Check a script without running it
    pub fn validate(&self, source: &str) -> Result<(), CompileError> {
        lang::compile(source, &self.config.policy).map(|_| ())
    }

    /// Run a script in the pool and classify the outcome
    ///
    /// Waits at most `timeout`, or the configured timeout when `None`.
    /// Never fails: every problem is reported as an [`ExecutionResult`].
    #[instrument(skip(self, source), fields(len = source.len()))]
    pub async fn run_sandboxed(&self, source: &str, timeout: Option<Duration>) -> ExecutionResult {
        self.run_timed(source, timeout).await.result
    }

    /// [`run_sandboxed`](Self::run_sandboxed), also reporting how long it took
    pub async fn run_timed(&self, source: &str, timeout: Option<Duration>) -> TimedResult {
        let started = Instant::now();
        let timeout = timeout.unwrap_or_else(|| self.config.timeout());

        let result = match self.validate(source) {
            Err(e) => e.into(),
            Ok(()) => match self.pool.submit_with_timeout(source, timeout) {
                Ok(handle) => handle.await_result(timeout).await,
                Err(e) => e.into(),
            },
        };

        let elapsed = started.elapsed();
        info!(status = %result.status(), ?elapsed, "submission classified");
        TimedResult { result, elapsed }
    }

    pub fn stats(&self) -> PoolStats {
        self.pool.stats()
    }

    /// Stop the pool; later submissions report a worker failure
    pub async fn shutdown(&self) {
        self.pool.shutdown().await;
    }
}
