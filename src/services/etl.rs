//! ETL job execution
//!
//! Invokes the external Parquet -> PostgreSQL load job. The executor checks
//! the input-artifact precondition, streams job output into the log sink
//! and records one immutable JobRun per invocation. The load itself is an
//! upsert and must stay idempotent; that contract belongs to the external
//! job, not to this module.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::domain::job::{JobRun, LogLine, RunTrigger};
use crate::error::AgentError;
use crate::infra::{CommandSpec, LogLevel};
use crate::state::AppState;

/// Capacity of the per-run output channel
const JOB_LOG_CAPACITY: usize = 256;

/// Run one ETL pass
///
/// Returns the finished run record; the run is classified `Failed` on any
/// non-zero exit and the code is preserved verbatim for propagation.
/// `MissingInput` is returned without invoking the job at all.
pub async fn run_once(state: &Arc<AppState>, trigger: RunTrigger) -> Result<JobRun, AgentError> {
    let etl = &state.config.etl;

    let input = input_path(state);
    if !input.exists() {
        state.sink.record(
            LogLevel::Error,
            &format!("Input artifact missing: {}", input.display()),
        );
        return Err(AgentError::MissingInput(input));
    }

    let spec = CommandSpec::new(etl.program.clone(), etl.args.clone(), etl.work_dir.clone())
        .env("DATABASE_URL", state.config.database.url())
        .env("REDIS_URL", state.config.cache.url.clone())
        .timeout(Duration::from_secs(etl.timeout_secs));

    let run = JobRun::new(Uuid::new_v4().to_string(), trigger, spec.display_line());
    let run_id = state.runs.create(run.clone()).await;
    let cancel = state.register_run(&run_id).await;

    state.sink.record(
        LogLevel::Info,
        &format!("Starting ETL load ({})", trigger.as_str()),
    );

    let (log_tx, log_rx) = broadcast::channel(JOB_LOG_CAPACITY);
    let drain = spawn_output_drain(state.clone(), log_rx);

    let result = spec.run_streamed(log_tx, cancel).await;

    // make sure every captured line hits the sink before the outcome line
    let _ = drain.await;
    state.unregister_run().await;

    match result {
        Ok(outcome) => {
            let exit_code = outcome.status.code();
            if outcome.status.success() {
                state
                    .sink
                    .record(LogLevel::Info, "ETL load completed successfully");
            } else if outcome.timed_out {
                state.sink.record(
                    LogLevel::Error,
                    &format!("ETL load timed out after {}s", etl.timeout_secs),
                );
            } else {
                state.sink.record(
                    LogLevel::Error,
                    &format!(
                        "ETL load failed with exit code {}",
                        exit_code.unwrap_or(-1)
                    ),
                );
            }

            let finished = state.runs.finish(&run_id, exit_code).await;
            Ok(finished.unwrap_or_else(|| {
                let mut run = run;
                run.finish(exit_code);
                run
            }))
        }
        Err(e) => {
            state.runs.finish(&run_id, None).await;
            state
                .sink
                .record(LogLevel::Error, &format!("Failed to run ETL job: {}", e));
            Err(AgentError::JobSpawn(e))
        }
    }
}

/// The input artifact, resolved against the job's working directory
fn input_path(state: &AppState) -> PathBuf {
    let etl = &state.config.etl;
    if etl.input_artifact.is_absolute() {
        etl.input_artifact.clone()
    } else {
        etl.work_dir.join(&etl.input_artifact)
    }
}

/// Forward captured job output lines into the sink
fn spawn_output_drain(
    state: Arc<AppState>,
    mut rx: broadcast::Receiver<LogLine>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(line) => {
                    let level = if line.stream == "stderr" {
                        LogLevel::Warning
                    } else {
                        LogLevel::Info
                    };
                    state.sink.record(level, &format!("[etl] {}", line.content));
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Dropped ETL output lines");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnvConfig;
    use crate::domain::job::JobStatus;
    use std::path::Path;

    /// State with isolated work/log dirs and a scripted ETL command
    fn test_state(script: &str, with_input: bool) -> Arc<AppState> {
        let work_dir = std::env::temp_dir().join(format!("etl-test-{}", Uuid::new_v4()));
        std::fs::create_dir_all(&work_dir).unwrap();

        let mut config = EnvConfig::from_env();
        config.logs.dir = work_dir.join("logs");
        config.etl.program = "sh".to_string();
        config.etl.args = vec!["-c".to_string(), script.to_string()];
        config.etl.work_dir = work_dir.clone();
        config.etl.input_artifact = PathBuf::from("data/processed/latest_covid_processed.parquet");
        config.etl.timeout_secs = 30;

        if with_input {
            let input = work_dir.join("data/processed");
            std::fs::create_dir_all(&input).unwrap();
            std::fs::write(input.join("latest_covid_processed.parquet"), b"parquet").unwrap();
        }

        Arc::new(AppState::new(config))
    }

    fn daily_log(state: &AppState) -> String {
        let today = chrono::Local::now().date_naive();
        std::fs::read_to_string(state.sink.log_path_for(today)).unwrap_or_default()
    }

    #[tokio::test]
    async fn test_missing_input_fails_fast_without_invocation() {
        let marker = std::env::temp_dir().join(format!("etl-marker-{}", Uuid::new_v4()));
        let state = test_state(&format!("touch {}", marker.display()), false);

        let result = run_once(&state, RunTrigger::Scheduled).await;
        assert!(matches!(result, Err(AgentError::MissingInput(_))));

        // the job was never spawned and no run was recorded
        assert!(!Path::new(&marker).exists());
        assert_eq!(state.runs.history_count().await, 0);
        assert_eq!(state.runs.active_count().await, 0);
    }

    #[tokio::test]
    async fn test_successful_run_records_and_logs() {
        let state = test_state("echo loading; exit 0", true);

        let run = run_once(&state, RunTrigger::Scheduled).await.unwrap();
        assert_eq!(run.status, JobStatus::Success);
        assert_eq!(run.exit_code, Some(0));
        assert!(run.finished_at.is_some());

        let log = daily_log(&state);
        assert_eq!(
            log.lines()
                .filter(|l| l.contains("Starting ETL load (scheduled)"))
                .count(),
            1
        );
        assert_eq!(
            log.lines()
                .filter(|l| l.contains("ETL load completed successfully"))
                .count(),
            1
        );
        assert!(log.contains("[etl] loading"));

        assert_eq!(state.runs.history_count().await, 1);
        assert!(!state.has_active_run().await);
    }

    #[tokio::test]
    async fn test_failed_run_preserves_exit_code() {
        let state = test_state("exit 7", true);

        let run = run_once(&state, RunTrigger::Manual).await.unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.exit_code, Some(7));

        let today = chrono::Local::now().date_naive();
        let errors = std::fs::read_to_string(state.sink.error_path_for(today)).unwrap();
        assert!(errors.contains("ETL load failed with exit code 7"));
    }

    #[tokio::test]
    async fn test_stderr_lines_are_warnings_not_errors() {
        let state = test_state("echo oops >&2; exit 0", true);

        let run = run_once(&state, RunTrigger::Manual).await.unwrap();
        assert_eq!(run.status, JobStatus::Success);

        let log = daily_log(&state);
        assert!(log.contains("[etl] oops"));
        // stderr chatter from a successful job must not pollute the error log
        let today = chrono::Local::now().date_naive();
        assert!(!state.sink.error_path_for(today).exists());
    }
}
