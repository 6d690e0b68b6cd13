//! Run storage
//!
//! Tracks the in-flight run and a bounded history of finished runs.
//! A run becomes immutable the moment `finish` moves it into history.

use chrono::{Duration, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

use crate::config::env::constants::MAX_RUN_HISTORY;
use crate::domain::job::JobRun;

/// Store for active and historical ETL runs
pub struct RunStore {
    active: RwLock<HashMap<String, JobRun>>,
    history: RwLock<VecDeque<JobRun>>,
    max_history: usize,
    retention: Duration,
}

impl RunStore {
    pub fn new() -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            max_history: MAX_RUN_HISTORY,
            retention: Duration::hours(24),
        }
    }

    pub fn with_config(max_history: usize, retention_hours: i64) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
            retention: Duration::hours(retention_hours),
        }
    }

    /// Register a freshly started run
    pub async fn create(&self, run: JobRun) -> String {
        let run_id = run.id.clone();
        self.active.write().await.insert(run_id.clone(), run);
        run_id
    }

    /// Look up a run, active first, then history
    pub async fn get_any(&self, run_id: &str) -> Option<JobRun> {
        if let Some(run) = self.active.read().await.get(run_id).cloned() {
            return Some(run);
        }
        let history = self.history.read().await;
        history.iter().find(|r| r.id == run_id).cloned()
    }

    /// Record the outcome and move the run to history
    ///
    /// The stored record is never touched again after this.
    pub async fn finish(&self, run_id: &str, exit_code: Option<i32>) -> Option<JobRun> {
        let run = {
            let mut active = self.active.write().await;
            active.remove(run_id).map(|mut run| {
                run.finish(exit_code);
                run
            })
        };

        if let Some(ref run) = run {
            self.push_history(run.clone()).await;
        }
        run
    }

    async fn push_history(&self, run: JobRun) {
        let mut history = self.history.write().await;
        history.push_front(run);
        while history.len() > self.max_history {
            history.pop_back();
        }
    }

    /// Most recent finished runs, optionally filtered by status
    pub async fn get_history(&self, limit: usize, status: Option<&str>) -> Vec<JobRun> {
        let history = self.history.read().await;
        history
            .iter()
            .filter(|run| status.map_or(true, |s| run.status.as_str() == s))
            .take(limit)
            .cloned()
            .collect()
    }

    pub async fn history_count(&self) -> usize {
        self.history.read().await.len()
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// Drop finished runs older than the retention window
    pub async fn cleanup_stale(&self) {
        let cutoff = Utc::now() - self.retention;
        let mut history = self.history.write().await;
        history.retain(|run| run.finished_at.map_or(true, |t| t > cutoff));
    }
}

impl Default for RunStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::{JobStatus, RunTrigger};

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = RunStore::new();

        let run = JobRun::new("run-1".into(), RunTrigger::Scheduled, "etl".into());
        store.create(run).await;
        assert_eq!(store.active_count().await, 1);

        let finished = store.finish("run-1", Some(0)).await.unwrap();
        assert_eq!(finished.status, JobStatus::Success);
        assert_eq!(store.active_count().await, 0);

        let history = store.get_history(10, None).await;
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id, "run-1");
        assert_eq!(history[0].exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_history_limit() {
        let store = RunStore::with_config(5, 24);

        for i in 0..10 {
            let run = JobRun::new(format!("run-{}", i), RunTrigger::Manual, "etl".into());
            store.create(run).await;
            store.finish(&format!("run-{}", i), Some(0)).await;
        }

        assert_eq!(store.history_count().await, 5);
    }

    #[tokio::test]
    async fn test_history_status_filter() {
        let store = RunStore::new();

        store
            .create(JobRun::new("ok".into(), RunTrigger::Scheduled, "etl".into()))
            .await;
        store.finish("ok", Some(0)).await;
        store
            .create(JobRun::new("bad".into(), RunTrigger::Scheduled, "etl".into()))
            .await;
        store.finish("bad", Some(2)).await;

        let failed = store.get_history(10, Some("failed")).await;
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].id, "bad");
        assert_eq!(failed[0].exit_code, Some(2));
    }
}
