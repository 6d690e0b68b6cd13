//! Deployment orchestrator
//!
//! Sequences the stack bring-up: prerequisites, config materialization,
//! build, data tier, readiness probes, application tier, job runner, smoke
//! tests. Any fatal step tears the started services back down and the
//! process exits non-zero.

pub mod compose;
pub mod materialize;
pub mod prereq;
pub mod smoke;

pub use compose::ComposeRunner;

use crate::config::stack;
use crate::domain::deploy::DeployStage;
use crate::domain::probe::ProbeOutcome;
use crate::domain::service::{tier_services, ServiceDescriptor, ServiceTier};
use crate::error::AgentError;
use crate::infra::{LogLevel, LogSink};
use crate::services::probe;
use crate::state::AppState;

/// Run a full stack deployment
pub async fn deploy(state: &AppState) -> Result<(), AgentError> {
    let sink = &state.sink;
    let config = &state.config;
    let services = stack::stack_services(config);
    let mut stages = stage_plan();

    sink.record(LogLevel::Info, "=== Deploying COVID visualization stack ===");
    sink.record(
        LogLevel::Info,
        &format!("Stack directory: {}", config.stack_dir.display()),
    );

    // [1/8] Prerequisites
    stages[0].start();
    sink.record(LogLevel::Info, "[1/8] Checking prerequisites...");
    let compose = match prereq::check(config, sink).await {
        Ok(compose) => {
            stages[0].finish(true, None);
            compose
        }
        Err(e) => {
            stages[0].finish(false, Some(e.to_string()));
            return abort(None, sink, &stages, e).await;
        }
    };

    // [2/8] Materialize configuration
    stages[1].start();
    sink.record(LogLevel::Info, "[2/8] Materializing stack configuration...");
    match materialize::materialize(config, sink) {
        Ok(()) => stages[1].finish(true, None),
        Err(e) => {
            stages[1].finish(false, Some(e.to_string()));
            sink.record(
                LogLevel::Error,
                &format!("Failed to materialize configuration: {}", e),
            );
            return abort(None, sink, &stages, deploy_failed("materialize")).await;
        }
    }

    // [3/8] Build images
    stages[2].start();
    sink.record(LogLevel::Info, "[3/8] Building images...");
    match compose.build(sink).await {
        Ok(true) => stages[2].finish(true, None),
        Ok(false) => {
            stages[2].finish(false, Some("compose build failed".to_string()));
            sink.record(LogLevel::Error, "Compose build failed");
            return abort(None, sink, &stages, deploy_failed("build")).await;
        }
        Err(e) => {
            stages[2].finish(false, Some(e.to_string()));
            sink.record(LogLevel::Error, &format!("Failed to run compose build: {}", e));
            return abort(None, sink, &stages, deploy_failed("build")).await;
        }
    }

    // [4/8] Start the data tier
    stages[3].start();
    sink.record(LogLevel::Info, "[4/8] Starting data tier...");
    let data_tier = tier_services(&services, ServiceTier::Data);
    if let Err(e) = start_tier(&compose, &data_tier, sink).await {
        stages[3].finish(false, Some(e.to_string()));
        return abort(Some(&compose), sink, &stages, e).await;
    }
    stages[3].finish(true, None);

    // [5/8] Probe the data tier before anything depends on it
    stages[4].start();
    sink.record(LogLevel::Info, "[5/8] Waiting for data tier readiness...");
    for service in &data_tier {
        let Some(target) = &service.health else { continue };
        match probe::probe(target, sink).await {
            ProbeOutcome::Ready { .. } => {}
            ProbeOutcome::TimedOut { attempts } if service.required => {
                stages[4].finish(false, Some(format!("{} not ready", service.name)));
                let error = AgentError::DependencyTimeout {
                    service: service.name.clone(),
                    attempts,
                };
                return abort(Some(&compose), sink, &stages, error).await;
            }
            ProbeOutcome::TimedOut { .. } => {
                sink.record(
                    LogLevel::Warning,
                    &format!("{} not ready, continuing (advisory)", service.name),
                );
            }
        }
    }
    stages[4].finish(true, None);

    // [6/8] Start the application tier
    stages[5].start();
    sink.record(LogLevel::Info, "[6/8] Starting application tier...");
    let app_tier = tier_services(&services, ServiceTier::Application);
    if let Err(e) = start_tier(&compose, &app_tier, sink).await {
        stages[5].finish(false, Some(e.to_string()));
        return abort(Some(&compose), sink, &stages, e).await;
    }
    stages[5].finish(true, None);

    // [7/8] Start the job runner tier
    stages[6].start();
    sink.record(LogLevel::Info, "[7/8] Starting job runner...");
    let runner_tier = tier_services(&services, ServiceTier::JobRunner);
    if let Err(e) = start_tier(&compose, &runner_tier, sink).await {
        stages[6].finish(false, Some(e.to_string()));
        return abort(Some(&compose), sink, &stages, e).await;
    }
    stages[6].finish(true, None);

    // [8/8] Smoke tests against the application tier health endpoints
    stages[7].start();
    sink.record(LogLevel::Info, "[8/8] Running smoke tests...");
    if let Err(e) = smoke::run(&app_tier, sink).await {
        stages[7].finish(false, Some(e.to_string()));
        return abort(Some(&compose), sink, &stages, e).await;
    }
    stages[7].finish(true, None);

    let _ = compose.ps(sink).await;
    print_summary(sink, &stages);
    sink.record(LogLevel::Info, "=== Deployment complete ===");
    Ok(())
}

/// The eight-stage pipeline, in execution order
fn stage_plan() -> Vec<DeployStage> {
    vec![
        DeployStage::new("prereq", "Prerequisites"),
        DeployStage::new("materialize", "Materialize Config"),
        DeployStage::new("build", "Compose Build"),
        DeployStage::new("data_tier", "Data Tier Up"),
        DeployStage::new("data_probe", "Data Tier Probes"),
        DeployStage::new("app_tier", "Application Tier Up"),
        DeployStage::new("runner_tier", "Job Runner Up"),
        DeployStage::new("smoke", "Smoke Tests"),
    ]
}

/// Bring up one tier's services via compose
async fn start_tier(
    compose: &ComposeRunner,
    tier: &[&ServiceDescriptor],
    sink: &LogSink,
) -> Result<(), AgentError> {
    let names: Vec<&str> = tier.iter().map(|s| s.compose_service.as_str()).collect();
    match compose.up(&names, sink).await {
        Ok(true) => Ok(()),
        Ok(false) => {
            sink.record(
                LogLevel::Error,
                &format!("Failed to start services: {}", names.join(", ")),
            );
            Err(deploy_failed("compose up"))
        }
        Err(e) => {
            sink.record(LogLevel::Error, &format!("Failed to run compose up: {}", e));
            Err(deploy_failed("compose up"))
        }
    }
}

/// Compensating teardown, stage summary, error out
async fn abort(
    compose: Option<&ComposeRunner>,
    sink: &LogSink,
    stages: &[DeployStage],
    error: AgentError,
) -> Result<(), AgentError> {
    if let Some(compose) = compose {
        sink.record(
            LogLevel::Warning,
            "Deployment failed, tearing down started services",
        );
        match compose.down(sink).await {
            Ok(true) => {}
            _ => sink.record(LogLevel::Warning, "Teardown did not complete cleanly"),
        }
    }
    print_summary(sink, stages);
    Err(error)
}

fn deploy_failed(stage: &str) -> AgentError {
    AgentError::DeployFailed {
        stage: stage.to_string(),
    }
}

fn print_summary(sink: &LogSink, stages: &[DeployStage]) {
    sink.record(LogLevel::Info, "=== Stage Summary ===");
    for stage in stages {
        let duration = stage
            .duration_ms
            .map(|d| format!("{}ms", d))
            .unwrap_or_else(|| "-".to_string());
        sink.record(
            LogLevel::Info,
            &format!("{} {} ({})", stage.icon(), stage.display_name, duration),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_plan_shape() {
        let stages = stage_plan();
        assert_eq!(stages.len(), 8);

        let mut names: Vec<_> = stages.iter().map(|s| s.name.as_str()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 8, "stage names must be unique");

        // ordering contract: data tier before application tier before runner
        let order: Vec<_> = stage_plan().iter().map(|s| s.name.clone()).collect();
        let pos = |n: &str| order.iter().position(|s| s == n).unwrap();
        assert!(pos("data_tier") < pos("data_probe"));
        assert!(pos("data_probe") < pos("app_tier"));
        assert!(pos("app_tier") < pos("runner_tier"));
        assert!(pos("runner_tier") < pos("smoke"));
    }
}
