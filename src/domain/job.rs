//! ETL run domain model

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Classification of an ETL run
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Success | JobStatus::Failed)
    }
}

/// What caused a run to start
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum RunTrigger {
    /// Best-effort pass right after agent startup
    Startup,
    /// Periodic trigger at the configured hourly offset
    Scheduled,
    /// Operator-triggered via the API or the `etl` subcommand
    Manual,
}

impl RunTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunTrigger::Startup => "startup",
            RunTrigger::Scheduled => "scheduled",
            RunTrigger::Manual => "manual",
        }
    }
}

/// One invocation of the external ETL job
///
/// A run is a new record per invocation; once the exit code is recorded via
/// [`JobRun::finish`] the record is moved to history and never mutated again.
#[derive(Clone, Debug, Serialize)]
pub struct JobRun {
    pub id: String,
    pub trigger: RunTrigger,
    /// The command line as invoked, for the record
    pub command: String,
    pub status: JobStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

impl JobRun {
    pub fn new(id: String, trigger: RunTrigger, command: String) -> Self {
        Self {
            id,
            trigger,
            command,
            status: JobStatus::Running,
            started_at: Utc::now(),
            finished_at: None,
            exit_code: None,
        }
    }

    /// Record the outcome. Exit code 0 classifies as success, anything else
    /// (including no code at all, e.g. spawn failure or kill) as failure.
    pub fn finish(&mut self, exit_code: Option<i32>) {
        self.status = if exit_code == Some(0) {
            JobStatus::Success
        } else {
            JobStatus::Failed
        };
        self.finished_at = Some(Utc::now());
        self.exit_code = exit_code;
    }
}

/// Controller state machine, surfaced in /health
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ControllerState {
    Idle,
    Probing,
    Running,
    /// Idle between scheduled triggers
    Scheduled,
    /// Terminal: a steady-state pass failed and the process is exiting
    Failed,
}

impl ControllerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ControllerState::Idle => "idle",
            ControllerState::Probing => "probing",
            ControllerState::Running => "running",
            ControllerState::Scheduled => "scheduled",
            ControllerState::Failed => "failed",
        }
    }
}

/// A single output line captured from the external job
#[derive(Clone, Debug, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub stream: String, // stdout | stderr
    pub content: String,
}

impl LogLine {
    pub fn new(stream: &str, content: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: stream.to_string(),
            content: content.into(),
        }
    }

    pub fn stdout(content: impl Into<String>) -> Self {
        Self::new("stdout", content)
    }

    pub fn stderr(content: impl Into<String>) -> Self {
        Self::new("stderr", content)
    }
}
