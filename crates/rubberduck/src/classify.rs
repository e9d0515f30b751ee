//! Error classification
//!
//! Every failure the crate can observe ends up as one [`ExecutionResult`]
//! variant. The conversions live here so that each layer can return its own
//! error type and still be reported uniformly.

use std::any::Any;

use crate::lang::CompileError;
use crate::pool::PoolError;
use crate::sandbox::Exception;
use crate::types::ExecutionResult;
use crate::worker::WorkerError;

impl From<CompileError> for ExecutionResult {
    fn from(err: CompileError) -> Self {
        ExecutionResult::CompileError(err.to_string())
    }
}

impl From<Exception> for ExecutionResult {
    fn from(exception: Exception) -> Self {
        ExecutionResult::RuntimeError(exception.to_string())
    }
}

impl From<WorkerError> for ExecutionResult {
    fn from(err: WorkerError) -> Self {
        ExecutionResult::WorkerFailure(err.to_string())
    }
}

impl From<PoolError> for ExecutionResult {
    fn from(err: PoolError) -> Self {
        match err {
            PoolError::Worker(err) => err.into(),
            other => ExecutionResult::WorkerFailure(other.to_string()),
        }
    }
}

/// Classify the payload of a panicked execution thread
pub fn from_panic(payload: Box<dyn Any + Send>) -> ExecutionResult {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    ExecutionResult::WorkerFailure(format!("execution panicked: {detail}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::ExcKind;

    #[test]
    fn compile_errors_keep_location() {
        let result: ExecutionResult = CompileError::at("invalid syntax", 3, 7).into();
        assert_eq!(
            result,
            ExecutionResult::CompileError("invalid syntax (line 3, column 7)".to_owned())
        );
    }

    #[test]
    fn exceptions_become_runtime_errors() {
        let exception = Exception::new(ExcKind::KeyError, "'missing'");
        let result: ExecutionResult = exception.into();
        assert_eq!(
            result,
            ExecutionResult::RuntimeError("KeyError: 'missing'".to_owned())
        );
    }

    #[test]
    fn worker_errors_become_failures() {
        let result: ExecutionResult = WorkerError::Exited("signal: 9 (SIGKILL)".to_owned()).into();
        let ExecutionResult::WorkerFailure(message) = result else {
            panic!("expected worker failure");
        };
        assert!(message.contains("SIGKILL"));
    }

    #[test]
    fn pool_errors_become_failures() {
        let result: ExecutionResult = PoolError::Closed.into();
        assert_eq!(result.status(), crate::ResultStatus::WorkerFailure);

        let result: ExecutionResult = PoolError::Worker(WorkerError::Reclaimed).into();
        assert_eq!(
            result,
            ExecutionResult::from(WorkerError::Reclaimed)
        );
    }

    #[test]
    fn panic_payloads_are_described() {
        let result = from_panic(Box::new("boom"));
        assert_eq!(
            result,
            ExecutionResult::WorkerFailure("execution panicked: boom".to_owned())
        );

        let result = from_panic(Box::new(String::from("owned boom")));
        assert_eq!(
            result,
            ExecutionResult::WorkerFailure("execution panicked: owned boom".to_owned())
        );

        let result = from_panic(Box::new(42_u8));
        assert_eq!(
            result,
            ExecutionResult::WorkerFailure("execution panicked: unknown panic".to_owned())
        );
    }
}
