//! Docker Compose wrappers
//!
//! Detects the available compose flavor and wraps the handful of compose
//! invocations the orchestrator needs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::env::constants::COMPOSE_TIMEOUT_SECS;
use crate::infra::{CommandError, CommandSpec, LogLevel, LogSink};

/// A detected compose flavor bound to one compose file
pub struct ComposeRunner {
    program: &'static str,
    base_args: Vec<&'static str>,
    work_dir: PathBuf,
    compose_file: String,
}

impl ComposeRunner {
    /// Detect which compose command to use (prefer standalone
    /// docker-compose, fall back to the docker compose plugin)
    pub async fn detect(work_dir: &Path, compose_file: &str) -> Option<Self> {
        if tool_available("docker-compose").await {
            return Some(Self::new("docker-compose", vec![], work_dir, compose_file));
        }
        if tool_available("docker").await {
            return Some(Self::new("docker", vec!["compose"], work_dir, compose_file));
        }
        None
    }

    fn new(
        program: &'static str,
        base_args: Vec<&'static str>,
        work_dir: &Path,
        compose_file: &str,
    ) -> Self {
        Self {
            program,
            base_args,
            work_dir: work_dir.to_path_buf(),
            compose_file: compose_file.to_string(),
        }
    }

    /// The command as shown in log lines, e.g. "docker compose"
    pub fn describe(&self) -> String {
        if self.base_args.is_empty() {
            self.program.to_string()
        } else {
            format!("{} {}", self.program, self.base_args.join(" "))
        }
    }

    pub async fn build(&self, sink: &LogSink) -> Result<bool, CommandError> {
        self.exec(&["build"], sink).await
    }

    /// Start the given services detached
    pub async fn up(&self, services: &[&str], sink: &LogSink) -> Result<bool, CommandError> {
        let mut args = vec!["up", "-d"];
        args.extend_from_slice(services);
        self.exec(&args, sink).await
    }

    /// Stop and remove everything the compose file started
    pub async fn down(&self, sink: &LogSink) -> Result<bool, CommandError> {
        self.exec(&["down"], sink).await
    }

    pub async fn ps(&self, sink: &LogSink) -> Result<bool, CommandError> {
        self.exec(&["ps"], sink).await
    }

    async fn exec(&self, args: &[&str], sink: &LogSink) -> Result<bool, CommandError> {
        let full_args = self.full_args(args);
        sink.record(
            LogLevel::Info,
            &format!(">>> {} {}", self.program, full_args.join(" ")),
        );

        let spec = CommandSpec::new(self.program, full_args, self.work_dir.clone())
            .timeout(Duration::from_secs(COMPOSE_TIMEOUT_SECS));
        let output = spec.run_captured().await?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !stdout.trim().is_empty() {
            sink.record(LogLevel::Info, stdout.trim_end());
        }
        // compose progress output usually goes to stderr
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            sink.record(LogLevel::Info, stderr.trim_end());
        }

        Ok(output.status.success())
    }

    fn full_args(&self, args: &[&str]) -> Vec<String> {
        let mut full: Vec<String> = self.base_args.iter().map(|s| s.to_string()).collect();
        full.push("-f".to_string());
        full.push(self.compose_file.clone());
        full.extend(args.iter().map(|s| s.to_string()));
        full
    }
}

/// Whether a tool resolves on PATH
pub async fn tool_available(tool: &str) -> bool {
    CommandSpec::new("which", vec![tool.to_string()], ".")
        .timeout(Duration::from_secs(5))
        .run_captured()
        .await
        .map(|output| output.status.success())
        .unwrap_or(false)
}
