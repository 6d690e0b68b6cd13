//! Stack topology
//!
//! The services making up the visualization stack, in tier order, with
//! their readiness checks. This is the orchestrator's startup plan and the
//! source of the controller's dependency probes.

use std::time::Duration;

use crate::config::env::constants::{SMOKE_INTERVAL_SECS, SMOKE_MAX_ATTEMPTS};
use crate::config::EnvConfig;
use crate::domain::probe::ProbeTarget;
use crate::domain::service::{ServiceDescriptor, ServiceTier};

/// Compose file the orchestrator drives
pub const COMPOSE_FILE: &str = "docker-compose.yml";

/// Cache probe budget; kept short because the cache is advisory
const CACHE_PROBE_ATTEMPTS: u32 = 5;

/// Readiness probe for the analytics database
pub fn database_probe(config: &EnvConfig) -> ProbeTarget {
    let db = &config.database;
    let interval = Duration::from_secs(config.schedule.probe_interval_secs);

    if let Some(command) = &db.ready_command {
        let (program, args) = split_command(command);
        return ProbeTarget::command(
            "postgres",
            program,
            args,
            config.schedule.probe_max_attempts,
            interval,
        );
    }

    ProbeTarget::command(
        "postgres",
        "pg_isready",
        vec![
            "-h".to_string(),
            db.host.clone(),
            "-p".to_string(),
            db.port.to_string(),
            "-U".to_string(),
            db.user.clone(),
            "-d".to_string(),
            db.database.clone(),
            "-t".to_string(),
            "5".to_string(),
        ],
        config.schedule.probe_max_attempts,
        interval,
    )
}

/// Liveness probe for the cache (ping/pong, advisory)
pub fn cache_probe(config: &EnvConfig) -> ProbeTarget {
    let interval = Duration::from_secs(config.schedule.probe_interval_secs);

    if let Some(command) = &config.cache.ready_command {
        let (program, args) = split_command(command);
        return ProbeTarget::command("redis", program, args, CACHE_PROBE_ATTEMPTS, interval);
    }

    ProbeTarget::command(
        "redis",
        "redis-cli",
        vec!["-u".to_string(), config.cache.url.clone(), "ping".to_string()],
        CACHE_PROBE_ATTEMPTS,
        interval,
    )
}

fn split_command(command: &str) -> (String, Vec<String>) {
    let mut parts = command.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_else(|| "true".to_string());
    (program, parts.collect())
}

/// All stack services in startup order (data tier first, job runner last)
pub fn stack_services(config: &EnvConfig) -> Vec<ServiceDescriptor> {
    let smoke_interval = Duration::from_secs(SMOKE_INTERVAL_SECS);

    vec![
        ServiceDescriptor::new("postgres", ServiceTier::Data, "postgres-analytics")
            .with_health(database_probe(config)),
        ServiceDescriptor::new("redis", ServiceTier::Data, "redis")
            .with_health(cache_probe(config))
            .advisory(),
        ServiceDescriptor::new("grafana", ServiceTier::Application, "grafana").with_health(
            ProbeTarget::http(
                "grafana",
                format!(
                    "http://localhost:{}/api/health",
                    config.dashboard.grafana_port
                ),
                "database",
                SMOKE_MAX_ATTEMPTS,
                smoke_interval,
            ),
        ),
        ServiceDescriptor::new("airflow", ServiceTier::Application, "airflow-webserver")
            .with_health(ProbeTarget::http(
                "airflow",
                format!("http://localhost:{}/health", config.dashboard.airflow_port),
                "healthy",
                SMOKE_MAX_ATTEMPTS,
                smoke_interval,
            )),
        ServiceDescriptor::new("etl-agent", ServiceTier::JobRunner, "etl-agent"),
    ]
}

/// Host ports the stack binds, for the advisory port check
pub fn stack_ports(config: &EnvConfig) -> Vec<(&'static str, u16)> {
    vec![
        ("postgres", config.database.port),
        ("grafana", config.dashboard.grafana_port),
        ("airflow", config.dashboard.airflow_port),
    ]
}
