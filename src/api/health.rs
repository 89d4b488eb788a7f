//! `/health`: liveness plus a cheap read against the screen store.

use axum::{extract::State, Json};
use serde::Serialize;

use super::routes::ApiState;
use crate::error::AppError;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub schema_version: i64,
    /// `executed_at` of the newest logged run, if any.
    pub last_run_at: Option<String>,
    pub uptime_secs: u64,
}

pub async fn health(State(state): State<ApiState>) -> Result<Json<HealthResponse>, AppError> {
    let schema_version = state.store.schema_version().await?;
    let last_run_at = state
        .store
        .list_recent_runs(None, 1)
        .await?
        .into_iter()
        .next()
        .map(|r| r.executed_at);

    Ok(Json(HealthResponse {
        status: "ok",
        schema_version,
        last_run_at,
        uptime_secs: state.started.elapsed().as_secs(),
    }))
}
