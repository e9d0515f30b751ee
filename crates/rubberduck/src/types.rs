use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Message shown for a submission that ran past its bound
pub const TIMEOUT_MESSAGE: &str = "Timeout error - do you have an infinite loop?";

/// Identifier of a submission, unique within the dispatching process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub u64);

impl SubmissionId {
    /// Allocate the next identifier
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Raw script text received for execution
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: SubmissionId,
    pub source: String,
    pub received_at: Instant,
}

impl Submission {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            id: SubmissionId::next(),
            source: source.into(),
            received_at: Instant::now(),
        }
    }
}

/// Outcome of a submission
///
/// Exactly one variant describes every submission. This is the only value
/// handed back to callers of [`Runner::run_sandboxed`](crate::Runner::run_sandboxed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum ExecutionResult {
    /// Everything the script printed
    Success(String),

    /// The validator rejected the script
    CompileError(String),

    /// The script raised an exception
    RuntimeError(String),

    /// No result within the bound
    Timeout,

    /// The worker died or misbehaved for reasons unrelated to the script's logic
    WorkerFailure(String),
}

impl ExecutionResult {
    /// Classification of this result
    pub fn status(&self) -> ResultStatus {
        match self {
            ExecutionResult::Success(_) => ResultStatus::Success,
            ExecutionResult::CompileError(_) => ResultStatus::CompileError,
            ExecutionResult::RuntimeError(_) => ResultStatus::RuntimeError,
            ExecutionResult::Timeout => ResultStatus::Timeout,
            ExecutionResult::WorkerFailure(_) => ResultStatus::WorkerFailure,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionResult::Success(_))
    }

    /// Captured output of a successful run
    pub fn output(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success(output) => Some(output),
            _ => None,
        }
    }

    /// The raw message carried by the result, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            ExecutionResult::Success(text)
            | ExecutionResult::CompileError(text)
            | ExecutionResult::RuntimeError(text)
            | ExecutionResult::WorkerFailure(text) => Some(text),
            ExecutionResult::Timeout => None,
        }
    }

    /// Human-readable description.
    ///
    /// A success describes itself as its output, unchanged.
    pub fn describe(&self) -> String {
        match self {
            ExecutionResult::Success(output) => output.clone(),
            ExecutionResult::CompileError(message) => format!("Compile error: {message}"),
            ExecutionResult::RuntimeError(message) => format!("Runtime error: {message}"),
            ExecutionResult::Timeout => TIMEOUT_MESSAGE.to_owned(),
            ExecutionResult::WorkerFailure(message) => format!("Worker failure: {message}"),
        }
    }
}

impl fmt::Display for ExecutionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Status of an execution, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResultStatus {
    #[serde(rename = "OK")]
    Success,

    #[serde(rename = "CE")]
    CompileError,

    #[serde(rename = "RE")]
    RuntimeError,

    #[serde(rename = "TO")]
    Timeout,

    #[serde(rename = "WF")]
    WorkerFailure,
}

impl ResultStatus {
    /// Two-letter code used in logs
    pub fn code(self) -> &'static str {
        match self {
            ResultStatus::Success => "OK",
            ResultStatus::CompileError => "CE",
            ResultStatus::RuntimeError => "RE",
            ResultStatus::Timeout => "TO",
            ResultStatus::WorkerFailure => "WF",
        }
    }

    #[must_use]
    pub fn is_failure(self) -> bool {
        !matches!(self, ResultStatus::Success)
    }
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A result together with how long the caller waited for it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedResult {
    pub result: ExecutionResult,
    pub elapsed: Duration,
}

impl TimedResult {
    pub fn status(&self) -> ResultStatus {
        self.result.status()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submission_ids_are_unique() {
        let a = Submission::new("print(1)");
        let b = Submission::new("print(1)");
        assert_ne!(a.id, b.id);
        assert!(b.id > a.id);
    }

    #[test]
    fn status_matches_variant() {
        assert_eq!(ExecutionResult::Success(String::new()).status(), ResultStatus::Success);
        assert_eq!(ExecutionResult::CompileError("x".into()).status(), ResultStatus::CompileError);
        assert_eq!(ExecutionResult::RuntimeError("x".into()).status(), ResultStatus::RuntimeError);
        assert_eq!(ExecutionResult::Timeout.status(), ResultStatus::Timeout);
        assert_eq!(ExecutionResult::WorkerFailure("x".into()).status(), ResultStatus::WorkerFailure);
    }

    #[test]
    fn describe_prefixes_failures() {
        assert_eq!(ExecutionResult::Success("4\n".into()).describe(), "4\n");
        assert_eq!(
            ExecutionResult::RuntimeError("ZeroDivisionError: division by zero (line 1)".into())
                .describe(),
            "Runtime error: ZeroDivisionError: division by zero (line 1)"
        );
        assert_eq!(
            ExecutionResult::CompileError("unexpected token".into()).describe(),
            "Compile error: unexpected token"
        );
        assert_eq!(ExecutionResult::Timeout.describe(), TIMEOUT_MESSAGE);
        assert!(TIMEOUT_MESSAGE.contains("infinite loop"));
        assert_eq!(
            ExecutionResult::WorkerFailure("worker exited".into()).to_string(),
            "Worker failure: worker exited"
        );
    }

    #[test]
    fn output_only_for_success() {
        assert_eq!(ExecutionResult::Success("hi\n".into()).output(), Some("hi\n"));
        assert_eq!(ExecutionResult::RuntimeError("hi".into()).output(), None);
        assert_eq!(ExecutionResult::Timeout.message(), None);
    }

    #[test]
    fn serializes_with_status_tag() {
        let json = serde_json::to_string(&ExecutionResult::Success("4\n".into())).unwrap();
        assert_eq!(json, r#"{"status":"success","message":"4\n"}"#);

        let json = serde_json::to_string(&ExecutionResult::Timeout).unwrap();
        assert_eq!(json, r#"{"status":"timeout"}"#);

        let back: ExecutionResult =
            serde_json::from_str(r#"{"status":"runtime_error","message":"boom"}"#).unwrap();
        assert_eq!(back, ExecutionResult::RuntimeError("boom".into()));
    }

    #[test]
    fn status_codes() {
        assert_eq!(ResultStatus::Timeout.to_string(), "TO");
        assert_eq!(serde_json::to_string(&ResultStatus::Success).unwrap(), r#""OK""#);
        assert!(ResultStatus::WorkerFailure.is_failure());
        assert!(!ResultStatus::Success.is_failure());
    }
}
