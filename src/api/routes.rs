use std::time::Instant;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::config::HISTORY_DAYS;
use crate::db::{ScreenRun, ScreenStore, StoredResult, StrategyStatistics};
use crate::error::{AppError, Result};
use crate::timefmt;

#[derive(Clone)]
pub struct ApiState {
    pub store: ScreenStore,
    pub started: Instant,
}

impl ApiState {
    pub fn new(store: ScreenStore) -> Self {
        Self {
            store,
            started: Instant::now(),
        }
    }
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(super::health::health))
        .route("/runs/recent", get(get_recent_runs))
        .route("/runs/range", get(get_runs_in_range))
        .route("/runs/:id", get(get_run))
        .route("/runs/:id/results", get(get_run_results))
        .route("/symbols/top", get(get_top_symbols))
        .route("/symbols/:symbol/history", get(get_symbol_history))
        .route("/strategies/:name/stats", get(get_strategy_stats))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Query param structs
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct RecentRunsQuery {
    pub strategy: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct RangeQuery {
    pub start: String,
    pub end: String,
    pub strategy: Option<String>,
}

#[derive(Deserialize)]
pub struct TopSymbolsQuery {
    pub strategy: Option<String>,
    pub days: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

// ---------------------------------------------------------------------------
// Response types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct RunWithResults {
    #[serde(flatten)]
    pub run: ScreenRun,
    pub results: Vec<StoredResult>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct SymbolCount {
    pub symbol: String,
    pub appearances: i64,
}

#[derive(Debug, Serialize)]
pub struct SymbolAppearance {
    pub run: ScreenRun,
    pub result: StoredResult,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn get_recent_runs(
    State(state): State<ApiState>,
    Query(params): Query<RecentRunsQuery>,
) -> Result<Json<Vec<ScreenRun>>> {
    let limit = params.limit.unwrap_or(20).clamp(1, 500);
    let runs = state
        .store
        .list_recent_runs(params.strategy.as_deref(), limit)
        .await?;
    Ok(Json(runs))
}

async fn get_runs_in_range(
    State(state): State<ApiState>,
    Query(params): Query<RangeQuery>,
) -> Result<Json<Vec<ScreenRun>>> {
    // Normalize so bare dates compare correctly against stored timestamps.
    let start = timefmt::iso(timefmt::parse_iso(&params.start)?);
    let end = timefmt::iso(timefmt::parse_iso(&params.end)?);
    let runs = state
        .store
        .list_runs_in_range(&start, &end, params.strategy.as_deref())
        .await?;
    Ok(Json(runs))
}

async fn get_run(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<RunWithResults>> {
    let run = state
        .store
        .read_run(id)
        .await?
        .ok_or_else(|| AppError::not_found("run", id))?;
    let results = state.store.read_results(id).await?;
    Ok(Json(RunWithResults { run, results }))
}

async fn get_run_results(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<StoredResult>>> {
    if state.store.read_run(id).await?.is_none() {
        return Err(AppError::not_found("run", id));
    }
    Ok(Json(state.store.read_results(id).await?))
}

async fn get_top_symbols(
    State(state): State<ApiState>,
    Query(params): Query<TopSymbolsQuery>,
) -> Result<Json<Vec<SymbolCount>>> {
    let rows = state
        .store
        .top_symbols(
            params.strategy.as_deref(),
            params.days.unwrap_or(HISTORY_DAYS),
            params.limit.unwrap_or(20).clamp(1, 500),
        )
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|(symbol, appearances)| SymbolCount { symbol, appearances })
            .collect(),
    ))
}

async fn get_symbol_history(
    State(state): State<ApiState>,
    Path(symbol): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Result<Json<Vec<SymbolAppearance>>> {
    let rows = state
        .store
        .symbol_history(&symbol.to_uppercase(), params.days.unwrap_or(HISTORY_DAYS))
        .await?;
    Ok(Json(
        rows.into_iter()
            .map(|(run, result)| SymbolAppearance { run, result })
            .collect(),
    ))
}

async fn get_strategy_stats(
    State(state): State<ApiState>,
    Path(name): Path<String>,
    Query(params): Query<DaysQuery>,
) -> Result<Json<StrategyStatistics>> {
    let stats = state
        .store
        .strategy_statistics(&name, params.days.unwrap_or(HISTORY_DAYS))
        .await?;
    Ok(Json(stats))
}
