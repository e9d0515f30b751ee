//! Worker process handle
//!
//! Spawns a `rubberduck-worker` with a cleared environment and exchanges
//! one request/response line pair per job.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::{debug, instrument, warn};

use crate::worker::{WorkerRequest, WorkerResponse};

/// Errors from driving a worker process
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to start worker {}: {source}", path.display())]
    Spawn {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("worker I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("worker exited unexpectedly ({0})")]
    Exited(String),

    #[error("worker protocol error: {0}")]
    Protocol(String),

    #[error("worker was terminated after overrunning its deadline")]
    Reclaimed,
}

/// A running worker process
#[derive(Debug)]
pub struct WorkerProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
    jobs: u32,
}

impl WorkerProcess {
    /// Start a worker
    ///
    /// Must be called from within a Tokio runtime. The child is killed when
    /// the handle is dropped.
    #[instrument]
    pub fn spawn(path: &Path) -> Result<Self, WorkerError> {
        let mut command = Command::new(path);
        command.env_clear();
        // Only the search path survives, so a bare binary name still resolves
        if let Some(search) = std::env::var_os("PATH") {
            command.env("PATH", search);
        }

        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| WorkerError::Spawn {
                path: path.to_owned(),
                source,
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| WorkerError::Protocol("worker stdin is not piped".to_owned()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| WorkerError::Protocol("worker stdout is not piped".to_owned()))?;

        debug!(pid = child.id(), "worker started");

        Ok(Self {
            child,
            stdin,
            stdout: BufReader::new(stdout),
            jobs: 0,
        })
    }

    /// OS process id, if the worker is still running
    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Jobs this worker has answered
    pub fn jobs(&self) -> u32 {
        self.jobs
    }

    /// Send one request and wait for its response
    #[instrument(skip_all, fields(id = %request.id, pid = self.child.id()))]
    pub async fn exchange(&mut self, request: &WorkerRequest) -> Result<WorkerResponse, WorkerError> {
        let mut line =
            serde_json::to_string(request).map_err(|e| WorkerError::Protocol(e.to_string()))?;
        line.push('\n');

        if let Err(e) = self.write(line.as_bytes()).await {
            return Err(self.exit_status().await.unwrap_or(e));
        }

        let mut reply = String::new();
        if self.stdout.read_line(&mut reply).await? == 0 {
            return Err(self
                .exit_status()
                .await
                .unwrap_or_else(|| WorkerError::Exited("closed its output".to_owned())));
        }

        let response: WorkerResponse = serde_json::from_str(&reply)
            .map_err(|e| WorkerError::Protocol(format!("malformed response: {e}")))?;
        if response.id != request.id {
            return Err(WorkerError::Protocol(format!(
                "response for {} while waiting for {}",
                response.id, request.id
            )));
        }

        self.jobs += 1;
        debug!(status = %response.result.status(), jobs = self.jobs, "worker answered");
        Ok(response)
    }

    /// Terminate the worker and reap it
    pub async fn kill(&mut self) {
        if let Ok(Some(_)) = self.child.try_wait() {
            return;
        }
        if let Err(e) = self.child.kill().await {
            warn!(error = %e, "failed to kill worker");
        }
    }

    async fn write(&mut self, bytes: &[u8]) -> Result<(), WorkerError> {
        self.stdin.write_all(bytes).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    /// Describe how the worker ended, if it has
    async fn exit_status(&mut self) -> Option<WorkerError> {
        match self.child.wait().await {
            Ok(status) => Some(WorkerError::Exited(status.to_string())),
            Err(e) => {
                warn!(error = %e, "failed to reap worker");
                None
            }
        }
    }
}
