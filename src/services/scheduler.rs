//! Retry/schedule controller
//!
//! Drives probe -> run cycles. At startup the dependency gate is fatal but
//! the first ETL pass is best-effort; at steady state both the gate and the
//! job are fatal and the job's exit code becomes the process exit code, so
//! the external supervisor can alert. A separate heartbeat task keeps a
//! liveness signal flowing independent of job scheduling.

use chrono::{DateTime, Duration as ChronoDuration, Local, Timelike, Utc};
use std::sync::Arc;
use std::time::Duration;

use crate::config::env::constants::HEARTBEAT_INTERVAL_SECS;
use crate::config::stack;
use crate::domain::job::{ControllerState, JobStatus, RunTrigger};
use crate::domain::probe::ProbeOutcome;
use crate::error::AgentError;
use crate::infra::LogLevel;
use crate::services::{etl, probe};
use crate::state::{get_shutdown_token, AppState};

/// Run the controller loop until shutdown or a fatal steady-state failure
pub async fn run_controller(state: Arc<AppState>) -> Result<(), AgentError> {
    let shutdown = get_shutdown_token();

    // startup gate: the database must be reachable before anything runs
    state.set_controller_state(ControllerState::Probing).await;
    if let Err(e) = check_dependencies(&state).await {
        state.set_controller_state(ControllerState::Failed).await;
        return Err(e);
    }

    if state.config.schedule.initial_pass {
        state.set_controller_state(ControllerState::Running).await;
        initial_pass(&state).await;
    }

    loop {
        state.set_controller_state(ControllerState::Scheduled).await;
        let next = next_trigger(Local::now(), state.config.schedule.minute_offset);
        *state.next_trigger.write().await = Some(next.with_timezone(&Utc));
        tracing::info!(next = %next.format("%Y-%m-%d %H:%M:%S"), "Next scheduled ETL pass");

        let wait = (next - Local::now()).to_std().unwrap_or_default();
        tokio::select! {
            _ = shutdown.cancelled() => {
                state.sink.record(LogLevel::Info, "Shutdown requested, stopping scheduler");
                return Ok(());
            }
            _ = tokio::time::sleep(wait) => {}
        }

        // retention sweep rides along with the schedule
        state.sink.sweep();

        scheduled_pass(&state).await?;
    }
}

/// One probe-and-run pass with steady-state semantics, plus a retention
/// sweep. Used by the `etl` subcommand; every failure is fatal and the
/// job's exit code is propagated.
pub async fn run_single_pass(state: &Arc<AppState>) -> Result<(), AgentError> {
    let result = scheduled_pass(state).await;
    state.sink.sweep();
    result
}

/// Best-effort first pass: failures are logged and swallowed so the
/// recurring schedule is never blocked by a bad first run
async fn initial_pass(state: &Arc<AppState>) {
    match etl::run_once(state, RunTrigger::Startup).await {
        Ok(run) if run.status == JobStatus::Failed => {
            state.sink.record(
                LogLevel::Warning,
                &format!(
                    "Initial ETL pass failed (exit code {}), continuing with scheduled runs",
                    run.exit_code.unwrap_or(-1)
                ),
            );
        }
        Ok(_) => {}
        Err(e) => {
            state.sink.record(
                LogLevel::Warning,
                &format!("Initial ETL pass skipped: {}, continuing with scheduled runs", e),
            );
        }
    }
}

/// One steady-state pass: probing failures and job failures are fatal
async fn scheduled_pass(state: &Arc<AppState>) -> Result<(), AgentError> {
    state.set_controller_state(ControllerState::Probing).await;
    if let Err(e) = check_dependencies(state).await {
        state.set_controller_state(ControllerState::Failed).await;
        return Err(e);
    }

    state.set_controller_state(ControllerState::Running).await;
    let run = match etl::run_once(state, RunTrigger::Scheduled).await {
        Ok(run) => run,
        Err(e) => {
            state.set_controller_state(ControllerState::Failed).await;
            return Err(e);
        }
    };

    if run.status == JobStatus::Failed {
        state.set_controller_state(ControllerState::Failed).await;
        return Err(AgentError::JobFailure {
            exit_code: run.exit_code.unwrap_or(1),
        });
    }

    Ok(())
}

/// Probe the database (fatal) and the cache (advisory)
async fn check_dependencies(state: &Arc<AppState>) -> Result<(), AgentError> {
    let database = stack::database_probe(&state.config);
    if let ProbeOutcome::TimedOut { attempts } = probe::probe(&database, &state.sink).await {
        return Err(AgentError::DependencyTimeout {
            service: database.name,
            attempts,
        });
    }

    let cache = stack::cache_probe(&state.config);
    if let ProbeOutcome::TimedOut { attempts } = probe::probe(&cache, &state.sink).await {
        state.sink.record(
            LogLevel::Warning,
            &format!("Cache not ready after {} attempts, continuing without it", attempts),
        );
    }

    Ok(())
}

/// Next wall-clock trigger: the configured minute of the hour, local time
fn next_trigger(now: DateTime<Local>, minute_offset: u32) -> DateTime<Local> {
    let candidate = now
        .with_minute(minute_offset)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    if candidate > now {
        candidate
    } else {
        candidate + ChronoDuration::hours(1)
    }
}

/// Liveness heartbeat: the agent process stays alive for the container,
/// and this task is that concern, decoupled from the ETL schedule.
/// Stale run-history cleanup rides along.
pub fn spawn_heartbeat(state: Arc<AppState>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let shutdown = get_shutdown_token();
        let mut interval = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        interval.tick().await; // the first tick fires immediately

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let controller = state.controller_state().await;
                    let uptime_secs = (Utc::now() - state.started_at).num_seconds();
                    tracing::info!(
                        controller = controller.as_str(),
                        uptime_secs,
                        "Agent heartbeat"
                    );
                    state.runs.cleanup_stale().await;
                }
            }
        }
    })
}
