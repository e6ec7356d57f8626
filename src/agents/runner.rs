//! Subprocess runner for external agent invocations.
//!
//! Spawns the process in its working directory, captures a bounded prefix of
//! stdout and stderr, and kills the child when the overall timeout elapses.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::Instant;

/// Default overall timeout for one invocation.
pub const DEFAULT_OVERALL_TIMEOUT: Duration = Duration::from_secs(300);

/// Timeout for waiting for the process to exit after its streams close.
pub const PROCESS_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bytes kept per output stream; the rest is read and discarded.
pub const DEFAULT_CAPTURE_LIMIT: usize = 1024 * 1024;

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    /// Agent name for logging
    pub agent_name: String,
    /// Working directory for the process
    pub working_dir: PathBuf,
    /// Overall execution timeout
    pub overall_timeout: Duration,
    /// Maximum bytes captured from each of stdout and stderr
    pub capture_limit: usize,
}

impl RunnerConfig {
    pub fn new(agent_name: String, working_dir: PathBuf) -> Self {
        Self {
            agent_name,
            working_dir,
            overall_timeout: DEFAULT_OVERALL_TIMEOUT,
            capture_limit: DEFAULT_CAPTURE_LIMIT,
        }
    }

    pub fn with_overall_timeout(mut self, timeout: Duration) -> Self {
        self.overall_timeout = timeout;
        self
    }

    pub fn with_capture_limit(mut self, limit: usize) -> Self {
        self.capture_limit = limit;
        self
    }
}

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("failed to spawn {agent} process: {source}")]
    Spawn {
        agent: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{agent} invocation exceeded overall timeout of {timeout:?}")]
    Timeout { agent: String, timeout: Duration },
    #[error("I/O error while running {agent}: {source}")]
    Io {
        agent: String,
        #[source]
        source: std::io::Error,
    },
}

/// Captured result of a finished process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    /// Exit code; `None` when the process was terminated by a signal.
    pub return_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.return_code == Some(0)
    }
}

/// Runs `command` to completion under `config`.
pub async fn run_process(
    mut command: Command,
    config: &RunnerConfig,
) -> Result<ProcessOutput, RunnerError> {
    command
        .current_dir(&config.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().map_err(|source| RunnerError::Spawn {
        agent: config.agent_name.clone(),
        source,
    })?;
    tracing::debug!(
        agent = %config.agent_name,
        pid = ?child.id(),
        working_dir = %config.working_dir.display(),
        "Spawned agent process"
    );

    let deadline = Instant::now() + config.overall_timeout;
    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    let limit = config.capture_limit;
    let streams = async { tokio::join!(read_capped(stdout, limit), read_capped(stderr, limit)) };
    let (stdout, stderr) = match tokio::time::timeout_at(deadline, streams).await {
        Ok(streams) => streams,
        Err(_) => {
            let _ = child.kill().await;
            return Err(timeout_error(config));
        }
    };
    let io_error = |source| RunnerError::Io {
        agent: config.agent_name.clone(),
        source,
    };
    let stdout = stdout.map_err(io_error)?;
    let stderr = stderr.map_err(io_error)?;

    let wait_deadline = deadline.min(Instant::now() + PROCESS_WAIT_TIMEOUT);
    let status = match tokio::time::timeout_at(wait_deadline, child.wait()).await {
        Ok(status) => status.map_err(io_error)?,
        Err(_) => {
            let _ = child.kill().await;
            return Err(timeout_error(config));
        }
    };

    tracing::debug!(
        agent = %config.agent_name,
        return_code = ?status.code(),
        stdout_len = stdout.len(),
        stderr_len = stderr.len(),
        "Agent process exited"
    );

    Ok(ProcessOutput {
        return_code: status.code(),
        stdout,
        stderr,
    })
}

fn timeout_error(config: &RunnerConfig) -> RunnerError {
    tracing::warn!(
        agent = %config.agent_name,
        "Agent process exceeded timeout of {:?}, killed",
        config.overall_timeout
    );
    RunnerError::Timeout {
        agent: config.agent_name.clone(),
        timeout: config.overall_timeout,
    }
}

/// Reads `reader` to EOF, keeping at most `limit` bytes.
///
/// The pipe keeps draining past the limit so the child never blocks on a
/// full buffer.
async fn read_capped<R: AsyncRead + Unpin>(
    reader: Option<R>,
    limit: usize,
) -> std::io::Result<String> {
    let mut captured = Vec::new();
    let mut discarded = 0usize;
    if let Some(mut reader) = reader {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            let keep = n.min(limit.saturating_sub(captured.len()));
            captured.extend_from_slice(chunk.get(..keep).unwrap_or_default());
            discarded += n - keep;
        }
    }
    if discarded > 0 {
        tracing::debug!(kept = captured.len(), discarded, "Process output exceeded capture limit");
    }
    Ok(String::from_utf8_lossy(&captured).into_owned())
}

#[cfg(test)]
#[path = "tests/runner_tests.rs"]
mod tests;
