//! Worker process protocol
//!
//! A worker is a separate process that reads one JSON request per line on
//! stdin and answers each with one JSON response line on stdout. The
//! dispatching side drives it through [`WorkerProcess`]; the worker side
//! is [`serve`].

use std::io::{self, BufRead, Write};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::SandboxPolicy;
use crate::engine;
use crate::types::{ExecutionResult, SubmissionId};

pub use process::{WorkerError, WorkerProcess};

mod process;

/// One script to execute
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub id: SubmissionId,
    pub source: String,
    pub policy: SandboxPolicy,
}

/// The classified outcome of one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub id: SubmissionId,
    pub result: ExecutionResult,
}

/// Serve requests until the input is exhausted.
///
/// Returns the number of requests answered. A malformed line is answered
/// with a [`ExecutionResult::WorkerFailure`] and does not stop the loop.
pub fn serve<R: BufRead, W: Write>(input: R, mut output: W) -> io::Result<u64> {
    let mut served = 0;

    for line in input.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<WorkerRequest>(&line) {
            Ok(request) => {
                debug!(id = %request.id, len = request.source.len(), "executing request");
                WorkerResponse {
                    id: request.id,
                    result: engine::execute(&request.source, &request.policy),
                }
            }
            Err(e) => {
                warn!(error = %e, "malformed request");
                WorkerResponse {
                    id: SubmissionId(0),
                    result: ExecutionResult::WorkerFailure(format!("malformed request: {e}")),
                }
            }
        };

        serde_json::to_writer(&mut output, &response)?;
        output.write_all(b"\n")?;
        output.flush()?;
        served += 1;
    }

    Ok(served)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn request(id: u64, source: &str) -> String {
        let request = WorkerRequest {
            id: SubmissionId(id),
            source: source.to_owned(),
            policy: SandboxPolicy::default(),
        };
        serde_json::to_string(&request).unwrap()
    }

    fn responses(output: &[u8]) -> Vec<WorkerResponse> {
        String::from_utf8_lossy(output)
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn answers_each_request_in_order() {
        let input = format!(
            "{}\n{}\n",
            request(1, "print('a')"),
            request(2, "print(1/0)")
        );
        let mut output = Vec::new();
        let served = serve(Cursor::new(input), &mut output).unwrap();
        assert_eq!(served, 2);

        let responses = responses(&output);
        assert_eq!(responses[0].id, SubmissionId(1));
        assert_eq!(responses[0].result, ExecutionResult::Success("a\n".to_owned()));
        assert_eq!(responses[1].id, SubmissionId(2));
        assert_eq!(responses[1].result.status(), crate::ResultStatus::RuntimeError);
    }

    #[test]
    fn state_does_not_leak_between_requests() {
        let input = format!("{}\n{}\n", request(1, "x = 1"), request(2, "print(x)"));
        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();

        let responses = responses(&output);
        assert_eq!(responses[0].result, ExecutionResult::Success(String::new()));
        assert_eq!(responses[1].result.status(), crate::ResultStatus::RuntimeError);
    }

    #[test]
    fn malformed_lines_are_answered() {
        let input = format!("not json\n\n{}\n", request(7, "print(7)"));
        let mut output = Vec::new();
        let served = serve(Cursor::new(input), &mut output).unwrap();
        assert_eq!(served, 2);

        let responses = responses(&output);
        assert_eq!(responses[0].id, SubmissionId(0));
        assert_eq!(responses[0].result.status(), crate::ResultStatus::WorkerFailure);
        assert_eq!(responses[1].result, ExecutionResult::Success("7\n".to_owned()));
    }

    #[test]
    fn policy_travels_with_the_request() {
        let request = WorkerRequest {
            id: SubmissionId(3),
            source: "import math".to_owned(),
            policy: SandboxPolicy::default().with_modules(["random"]),
        };
        let input = serde_json::to_string(&request).unwrap() + "\n";
        let mut output = Vec::new();
        serve(Cursor::new(input), &mut output).unwrap();

        let responses = responses(&output);
        assert_eq!(responses[0].result.status(), crate::ResultStatus::CompileError);
    }
}
