//! Run history and manual trigger API
//!
//! /runs, /runs/:id and POST /runs/trigger (all behind the API key)

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::config::env::constants::MAX_RUN_HISTORY;
use crate::domain::job::{JobRun, RunTrigger};
use crate::error::{ApiError, ApiResult};
use crate::middleware::RequireApiKey;
use crate::services::etl;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
    status: Option<String>,
}

/// Run routes
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/runs", get(list_runs))
        .route("/runs/:id", get(get_run))
        .route("/runs/trigger", post(trigger_run))
}

/// GET /runs?limit=&status=
async fn list_runs(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let limit = query.limit.unwrap_or(20).min(MAX_RUN_HISTORY);
    let runs = state.runs.get_history(limit, query.status.as_deref()).await;
    let total = state.runs.history_count().await;
    Ok(Json(serde_json::json!({ "runs": runs, "total": total })))
}

/// GET /runs/:id
async fn get_run(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
    Path(run_id): Path<String>,
) -> ApiResult<Json<JobRun>> {
    state
        .runs
        .get_any(&run_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::not_found("run"))
}

/// POST /runs/trigger
///
/// Starts a manual ETL pass; conflicts while a run is already in flight.
/// Failures of a manual pass are recorded, not fatal to the agent.
async fn trigger_run(
    _auth: RequireApiKey,
    State(state): State<Arc<AppState>>,
) -> ApiResult<impl IntoResponse> {
    if state.has_active_run().await {
        return Err(ApiError::conflict("An ETL run is already in progress"));
    }

    tokio::spawn(async move {
        if let Err(e) = etl::run_once(&state, RunTrigger::Manual).await {
            tracing::warn!(error = %e, "Manual ETL run failed");
        }
    });

    Ok(Json(serde_json::json!({ "status": "triggered" })))
}
