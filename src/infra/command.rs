//! External command execution
//!
//! Single place that spawns processes, with:
//! - per-line stdout/stderr streaming
//! - timeout control
//! - cancellation support

use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::domain::job::LogLine;

/// Command execution error
#[derive(Debug)]
pub enum CommandError {
    /// The process could not be spawned
    SpawnFailed(std::io::Error),
    /// The process exceeded its timeout
    Timeout,
    /// The cancellation token fired
    Cancelled,
    /// Waiting for the process failed
    WaitFailed(std::io::Error),
}

impl std::fmt::Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::SpawnFailed(e) => write!(f, "Failed to spawn command: {}", e),
            CommandError::Timeout => write!(f, "Command timed out"),
            CommandError::Cancelled => write!(f, "Command was cancelled"),
            CommandError::WaitFailed(e) => write!(f, "Failed to wait for command: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::SpawnFailed(e) | CommandError::WaitFailed(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of a streamed command
pub struct CommandResult {
    pub status: ExitStatus,
    /// Whether the process was killed by the timeout
    pub timed_out: bool,
}

/// A fully described external invocation
#[derive(Clone, Debug)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub work_dir: PathBuf,
    /// Extra environment passed to the child (inherits the rest)
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args,
            work_dir: work_dir.into(),
            envs: Vec::new(),
            timeout: Duration::from_secs(300),
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Human-readable command line, for run records and log lines
    pub fn display_line(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }

    /// Run the command, streaming each output line over `log_tx`
    ///
    /// Returns when the process exits, times out (process is killed and its
    /// status reported with `timed_out: true`) or the token is cancelled.
    pub async fn run_streamed(
        &self,
        log_tx: broadcast::Sender<LogLine>,
        cancel: CancellationToken,
    ) -> Result<CommandResult, CommandError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.work_dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .spawn()
            .map_err(CommandError::SpawnFailed)?;

        let stdout_task = spawn_line_reader(child.stdout.take(), "stdout", log_tx.clone());
        let stderr_task = spawn_line_reader(child.stderr.take(), "stderr", log_tx);

        let result = tokio::select! {
            _ = cancel.cancelled() => {
                warn!(command = %self.display_line(), "Command cancelled, killing process");
                let _ = child.kill().await;
                Err(CommandError::Cancelled)
            }
            _ = tokio::time::sleep(self.timeout) => {
                error!(command = %self.display_line(), timeout = ?self.timeout, "Command timed out");
                let _ = child.kill().await;
                let status = child.wait().await.map_err(CommandError::WaitFailed)?;
                Ok(CommandResult { status, timed_out: true })
            }
            status = child.wait() => {
                let status = status.map_err(CommandError::WaitFailed)?;
                Ok(CommandResult { status, timed_out: false })
            }
        };

        // Drain the readers so no output line is lost
        let _ = stdout_task.await;
        let _ = stderr_task.await;

        result
    }

    /// Run the command without streaming, capturing the full output
    pub async fn run_captured(&self) -> Result<std::process::Output, CommandError> {
        let output = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.work_dir)
            .envs(self.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .output();

        tokio::select! {
            result = output => result.map_err(CommandError::SpawnFailed),
            _ = tokio::time::sleep(self.timeout) => Err(CommandError::Timeout),
        }
    }
}

fn spawn_line_reader<R>(
    reader: Option<R>,
    stream: &'static str,
    tx: broadcast::Sender<LogLine>,
) -> tokio::task::JoinHandle<()>
where
    R: tokio::io::AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        if let Some(reader) = reader {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let _ = tx.send(LogLine::new(stream, line));
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_captured_success() {
        let spec = CommandSpec::new("echo", vec!["hello".into()], "/tmp")
            .timeout(Duration::from_secs(5));
        let output = spec.run_captured().await.unwrap();
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("hello"));
    }

    #[tokio::test]
    async fn test_run_captured_not_found() {
        let spec = CommandSpec::new("nonexistent_command_12345", vec![], "/tmp")
            .timeout(Duration::from_secs(5));
        let result = spec.run_captured().await;
        assert!(matches!(result, Err(CommandError::SpawnFailed(_))));
    }

    #[tokio::test]
    async fn test_run_streamed_collects_lines_and_status() {
        let spec = CommandSpec::new(
            "sh",
            vec!["-c".into(), "echo one; echo two >&2; exit 3".into()],
            "/tmp",
        )
        .timeout(Duration::from_secs(5));

        let (tx, mut rx) = broadcast::channel(16);
        let result = spec
            .run_streamed(tx, CancellationToken::new())
            .await
            .unwrap();

        assert!(!result.timed_out);
        assert_eq!(result.status.code(), Some(3));

        let mut streams = Vec::new();
        while let Ok(line) = rx.try_recv() {
            streams.push((line.stream, line.content));
        }
        assert!(streams.contains(&("stdout".to_string(), "one".to_string())));
        assert!(streams.contains(&("stderr".to_string(), "two".to_string())));
    }

    #[tokio::test]
    async fn test_env_passthrough() {
        let spec = CommandSpec::new("sh", vec!["-c".into(), "echo $MARKER".into()], "/tmp")
            .env("MARKER", "etl-env")
            .timeout(Duration::from_secs(5));
        let output = spec.run_captured().await.unwrap();
        assert!(String::from_utf8_lossy(&output.stdout).contains("etl-env"));
    }
}
