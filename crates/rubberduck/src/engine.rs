//! In-process execution
//!
//! Compiles a script, builds a fresh [`Environment`] and runs it on a
//! dedicated thread with a large stack. This is what a worker process does
//! for each request; it is also usable directly where process isolation is
//! not needed.

use std::thread;

use tracing::{debug, instrument};

use crate::classify;
use crate::config::SandboxPolicy;
use crate::lang;
use crate::sandbox::{AccessGate, DefaultGate, Environment};
use crate::types::ExecutionResult;

/// Stack size of the thread a script runs on
pub(crate) const STACK_SIZE: usize = 256 * 1024 * 1024;

/// Compile and run a script under the default gate
pub fn execute(source: &str, policy: &SandboxPolicy) -> ExecutionResult {
    execute_with_gate(source, policy, DefaultGate)
}

/// Compile and run a script with a custom attribute gate
#[instrument(skip_all, fields(len = source.len()))]
pub fn execute_with_gate<G>(source: &str, policy: &SandboxPolicy, gate: G) -> ExecutionResult
where
    G: AccessGate + Send + 'static,
{
    let source = source.to_owned();
    let policy = policy.clone();

    let spawned = thread::Builder::new()
        .name("rubberduck-exec".to_owned())
        .stack_size(STACK_SIZE)
        .spawn(move || run(&source, &policy, gate));

    let result = match spawned {
        Ok(handle) => handle.join().unwrap_or_else(classify::from_panic),
        Err(e) => ExecutionResult::WorkerFailure(format!("failed to start execution thread: {e}")),
    };

    debug!(status = %result.status(), "execution finished");
    result
}

fn run<G: AccessGate + 'static>(source: &str, policy: &SandboxPolicy, gate: G) -> ExecutionResult {
    let unit = match lang::compile(source, policy) {
        Ok(unit) => unit,
        Err(e) => return e.into(),
    };

    match Environment::with_gate(policy, gate).run(&unit) {
        Ok(output) => ExecutionResult::Success(output),
        Err(exception) => exception.into(),
    }
}
