//! Health and status API
//!
//! /health and /status endpoints, no authentication required

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::sync::Arc;

use crate::config::env::constants::VERSION;
use crate::domain::job::JobRun;
use crate::state::AppState;

/// Health check response
#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
    hostname: String,
    timestamp: String,
    started_at: String,
    uptime_secs: i64,
    /// Controller state machine position
    controller: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_trigger: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_run: Option<String>,
    history_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    last_run: Option<JobRun>,
}

/// Health and status routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(health_check))
}

/// GET /health, GET /status
async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let now = chrono::Utc::now();
    let controller = state.controller_state().await;
    let next_trigger = state
        .next_trigger
        .read()
        .await
        .map(|t| t.to_rfc3339());
    let last_run = state.runs.get_history(1, None).await.into_iter().next();

    Json(HealthResponse {
        status: "ok",
        service: "covidviz-agent",
        version: VERSION,
        hostname: hostname::get()
            .map(|h| h.to_string_lossy().to_string())
            .unwrap_or_else(|_| "unknown".to_string()),
        timestamp: now.to_rfc3339(),
        started_at: state.started_at.to_rfc3339(),
        uptime_secs: (now - state.started_at).num_seconds(),
        controller: controller.as_str(),
        next_trigger,
        active_run: state.active_run_id().await,
        history_count: state.runs.history_count().await,
        last_run,
    })
}
