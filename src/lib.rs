//! covidviz-agent - deployment and ETL agent for the COVID visualization stack
//!
//! Runs as:
//! - long-lived agent (default): readiness-gated scheduled ETL passes plus
//!   a status API
//! - `deploy` subcommand: one-shot stack deployment with teardown on failure
//! - `etl` subcommand: single probe-and-load pass, exit code propagated

pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod infra;
pub mod middleware;
pub mod services;
pub mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

pub use config::EnvConfig;
use state::{get_shutdown_token, trigger_shutdown, AppState};

/// Flags parsed from the command line
#[derive(Debug, Default)]
pub struct RuntimeConfig {
    pub port_override: Option<u16>,
}

/// Initialize the tracing subscriber
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

/// Run the long-lived agent: controller, heartbeat and status API
///
/// Returns the process exit code. A fatal steady-state controller failure
/// carries the job's own exit code through unchanged.
pub async fn init_and_run_agent(runtime: RuntimeConfig) -> i32 {
    let mut config = EnvConfig::from_env();
    if let Some(port) = runtime.port_override {
        config.port = port;
    }
    let state = Arc::new(AppState::new(config));

    spawn_signal_watcher();
    let heartbeat = services::scheduler::spawn_heartbeat(state.clone());

    // status API
    let addr = SocketAddr::from(([0, 0, 0, 0], state.config.port));
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind status API");
            return 1;
        }
    };
    tracing::info!(%addr, "Status API listening");

    let app = api::router(state.clone());
    let shutdown = get_shutdown_token();
    let server = tokio::spawn(async move {
        let _ = axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;
    });

    // the controller runs in the foreground; its outcome is the process's
    let result = services::scheduler::run_controller(state.clone()).await;

    trigger_shutdown();
    let _ = server.await;
    heartbeat.abort();

    match result {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Agent terminated");
            e.exit_code()
        }
    }
}

/// Run a one-shot stack deployment
pub async fn run_deploy() -> i32 {
    let config = EnvConfig::from_env();
    let state = AppState::new(config);

    match services::deploy::deploy(&state).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, "Deployment failed");
            e.exit_code()
        }
    }
}

/// Run a single probe-and-load ETL pass (the cron entry point)
pub async fn run_etl_once() -> i32 {
    let config = EnvConfig::from_env();
    let state = Arc::new(AppState::new(config));

    spawn_signal_watcher();

    match services::scheduler::run_single_pass(&state).await {
        Ok(()) => 0,
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "ETL pass failed");
            e.exit_code()
        }
    }
}

/// Cancel all background work on interrupt without corrupting the logs
fn spawn_signal_watcher() {
    tokio::spawn(async {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupt received, shutting down");
            trigger_shutdown();
        }
    });
}
