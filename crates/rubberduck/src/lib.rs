//! A library for sandboxed evaluation of untrusted script snippets.
//!
//! Rubberduck takes short scripts written in a restricted Python-flavoured
//! dialect, validates them, runs them in a pool of isolated worker
//! processes and hands back whatever they printed, or a classified failure,
//! within a hard time bound.
//!
//! # Features
//!
//! - **Restricted compiler**: Scripts are parsed and checked against an allow-list before they run.
//! - **Closed environment**: Only a fixed set of builtins, methods and modules is reachable.
//! - **Guarded access**: Every attribute lookup passes through a pluggable [`AccessGate`].
//! - **Process isolation**: Scripts execute in long-lived `rubberduck-worker` processes.
//! - **Bounded waits**: Callers get a [`ExecutionResult::Timeout`] instead of blocking.
//! - **Reclamation**: A supervisor kills and replaces workers that overrun their deadline.
//! - **TOML configuration**: Pool size, timeouts and the sandbox policy in one file.

pub use config::{Config, ConfigError, EXAMPLE_CONFIG, SandboxPolicy, WORKER_BINARY};
pub use engine::{execute, execute_with_gate};
pub use lang::{CompileError, ExecutableUnit, compile};
pub use pool::{PoolError, PoolStats, WorkerHandle, WorkerPool};
pub use runner::Runner;
pub use sandbox::{Access, AccessGate, DefaultGate, Environment, ExcKind, Exception};
pub use types::{
    ExecutionResult, ResultStatus, Submission, SubmissionId, TIMEOUT_MESSAGE, TimedResult,
};
pub use worker::{WorkerError, WorkerRequest, WorkerResponse, serve};

pub mod classify;
pub mod config;
pub mod engine;
pub mod lang;
pub mod pool;
pub mod runner;
pub mod sandbox;
pub mod types;
pub mod worker;
