/// Row types for the screen log tables. Decoded by column name through
/// `sqlx::FromRow`, so column order in a SELECT never matters.
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::strategy::ScreenFilters;
use crate::types::{Bias, Style};

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct RunRow {
    pub id: i64,
    pub strategy_name: String,
    pub scan_code: String,
    pub executed_at: String,
    pub result_count: i64,
    pub filters: Option<String>,
    pub bias: String,
    pub style: String,
}

/// One stored scanner match plus its backfilled forward prices and returns.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct StoredResult {
    pub id: i64,
    pub run_id: i64,
    pub symbol: String,
    pub exchange: String,
    pub contract_id: i64,
    pub rank: i64,
    pub distance: Option<String>,
    pub benchmark: Option<String>,
    pub price_at_screen: Option<f64>,
    pub volume_at_screen: Option<i64>,
    pub price_1d_later: Option<f64>,
    pub price_1w_later: Option<f64>,
    pub price_1m_later: Option<f64>,
    pub return_1d: Option<f64>,
    pub return_1w: Option<f64>,
    pub return_1m: Option<f64>,
}

/// A result joined with the columns of its parent run. The run id is the
/// result's `run_id`, so only the remaining run columns are selected.
#[derive(Debug, sqlx::FromRow)]
pub struct SymbolHistoryRow {
    #[sqlx(flatten)]
    pub result: StoredResult,
    pub strategy_name: String,
    pub scan_code: String,
    pub executed_at: String,
    pub result_count: i64,
    pub filters: Option<String>,
    pub bias: String,
    pub style: String,
}

#[derive(Debug, sqlx::FromRow)]
pub struct RunAggregateRow {
    pub total_runs: i64,
    pub total_results: i64,
    pub avg_results_per_run: Option<f64>,
}

#[derive(Debug, sqlx::FromRow)]
pub struct ReturnAggregateRow {
    pub avg_return_1d: Option<f64>,
    pub avg_return_1w: Option<f64>,
    pub avg_return_1m: Option<f64>,
    pub winners_1d: i64,
    pub losers_1d: i64,
    pub total_with_data: i64,
}

#[derive(Debug, sqlx::FromRow)]
pub struct SymbolCountRow {
    pub symbol: String,
    pub appearances: i64,
}

/// A recorded strategy execution.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenRun {
    pub id: i64,
    pub strategy_name: String,
    pub scan_code: String,
    pub executed_at: String,
    pub result_count: i64,
    /// Filters as they were when the run executed.
    pub filters: Option<ScreenFilters>,
    pub bias: Bias,
    pub style: Style,
}

impl TryFrom<RunRow> for ScreenRun {
    type Error = AppError;

    fn try_from(row: RunRow) -> Result<Self> {
        let filters = row
            .filters
            .as_deref()
            .map(serde_json::from_str::<ScreenFilters>)
            .transpose()?;
        Ok(Self {
            id: row.id,
            strategy_name: row.strategy_name,
            scan_code: row.scan_code,
            executed_at: row.executed_at,
            result_count: row.result_count,
            filters,
            bias: row.bias.parse()?,
            style: row.style.parse()?,
        })
    }
}

impl SymbolHistoryRow {
    pub fn into_pair(self) -> Result<(ScreenRun, StoredResult)> {
        let run = ScreenRun::try_from(RunRow {
            id: self.result.run_id,
            strategy_name: self.strategy_name,
            scan_code: self.scan_code,
            executed_at: self.executed_at,
            result_count: self.result_count,
            filters: self.filters,
            bias: self.bias,
            style: self.style,
        })?;
        Ok((run, self.result))
    }
}
