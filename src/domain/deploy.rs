//! Deployment stage tracking

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Stage state
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Pending,
    Running,
    Success,
    Failed,
    Skipped,
}

/// One step of the deployment pipeline
#[derive(Clone, Debug, Serialize)]
pub struct DeployStage {
    /// Stage identifier (e.g. "prereq", "data_tier")
    pub name: String,
    /// Display name (e.g. "Prerequisites", "Data Tier Up")
    pub display_name: String,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub duration_ms: Option<i64>,
    pub status: StageStatus,
    /// Additional detail, set on failure or skip
    pub message: Option<String>,
}

impl DeployStage {
    pub fn new(name: &str, display_name: &str) -> Self {
        Self {
            name: name.to_string(),
            display_name: display_name.to_string(),
            started_at: None,
            finished_at: None,
            duration_ms: None,
            status: StageStatus::Pending,
            message: None,
        }
    }

    pub fn start(&mut self) {
        self.started_at = Some(Utc::now());
        self.status = StageStatus::Running;
    }

    pub fn finish(&mut self, success: bool, message: Option<String>) {
        let now = Utc::now();
        self.finished_at = Some(now);
        self.status = if success {
            StageStatus::Success
        } else {
            StageStatus::Failed
        };
        self.message = message;
        if let Some(started) = self.started_at {
            self.duration_ms = Some((now - started).num_milliseconds());
        }
    }

    pub fn skip(&mut self, reason: Option<String>) {
        self.status = StageStatus::Skipped;
        self.message = reason;
    }

    /// Icon used by the stage summary block
    pub fn icon(&self) -> &'static str {
        match self.status {
            StageStatus::Success => "✓",
            StageStatus::Failed => "✗",
            StageStatus::Skipped => "⊘",
            StageStatus::Running => "⟳",
            StageStatus::Pending => "○",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_lifecycle() {
        let mut stage = DeployStage::new("prereq", "Prerequisites");
        assert_eq!(stage.status, StageStatus::Pending);

        stage.start();
        assert_eq!(stage.status, StageStatus::Running);
        assert!(stage.started_at.is_some());

        stage.finish(true, None);
        assert_eq!(stage.status, StageStatus::Success);
        assert!(stage.finished_at.is_some());
        assert!(stage.duration_ms.is_some());
        assert_eq!(stage.icon(), "✓");
    }

    #[test]
    fn test_stage_skip() {
        let mut stage = DeployStage::new("build", "Compose Build");
        stage.skip(Some("nothing to build".to_string()));
        assert_eq!(stage.status, StageStatus::Skipped);
        assert_eq!(stage.message.as_deref(), Some("nothing to build"));
    }
}
