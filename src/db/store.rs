use std::path::Path;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use tracing::{debug, info};

use crate::config::DB_MAX_CONNECTIONS;
use crate::db::models::{RunRow, ScreenRun, StoredResult, SymbolHistoryRow};
use crate::error::{AppError, Result};
use crate::strategy::{ScreenFilters, StrategyDefinition};
use crate::timefmt;
use crate::types::{Bias, ScreenResult, Style};

const RUN_COLUMNS: &str =
    "id, strategy_name, scan_code, executed_at, result_count, filters, bias, style";

const RESULT_COLUMNS: &str = "id, run_id, symbol, exchange, contract_id, rank, distance, \
     benchmark, price_at_screen, volume_at_screen, price_1d_later, price_1w_later, \
     price_1m_later, return_1d, return_1w, return_1m";

/// The strategy fields recorded with a run, captured by value so later edits
/// to the live strategy never rewrite history.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSnapshot {
    pub strategy_name: String,
    pub scan_code: String,
    pub filters: ScreenFilters,
    pub bias: Bias,
    pub style: Style,
}

impl From<&StrategyDefinition> for RunSnapshot {
    fn from(s: &StrategyDefinition) -> Self {
        Self {
            strategy_name: s.name.clone(),
            scan_code: s.scan_code.clone(),
            filters: s.filters.clone(),
            bias: s.bias,
            style: s.style,
        }
    }
}

/// Durable log of screen runs and their ranked results, backed by SQLite.
/// Each write method is one transaction; reads need none.
#[derive(Clone)]
pub struct ScreenStore {
    pub(super) pool: sqlx::SqlitePool,
}

impl ScreenStore {
    /// Open (creating if needed) the database at `path` and apply migrations.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(DB_MAX_CONNECTIONS)
            .connect_with(options)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;

        info!("Screen store ready at {}", path.display());
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    pub async fn schema_version(&self) -> Result<i64> {
        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version.unwrap_or(0))
    }

    // -----------------------------------------------------------------------
    // Write path
    // -----------------------------------------------------------------------

    /// Record one execution and all of its results atomically.
    /// `executed_at` defaults to now.
    pub async fn write_run(
        &self,
        snapshot: &RunSnapshot,
        results: &[ScreenResult],
        executed_at: Option<&str>,
    ) -> Result<i64> {
        let executed_at = executed_at.map_or_else(timefmt::now_iso, str::to_string);
        let filters = serde_json::to_string(&snapshot.filters)?;
        let result_count = results.len() as i64;

        let mut tx = self.pool.begin().await?;

        let run_id = sqlx::query(
            r#"
            INSERT INTO screen_runs
                (strategy_name, scan_code, executed_at, result_count, filters, bias, style)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snapshot.strategy_name)
        .bind(&snapshot.scan_code)
        .bind(&executed_at)
        .bind(result_count)
        .bind(&filters)
        .bind(snapshot.bias.to_string())
        .bind(snapshot.style.to_string())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for r in results {
            sqlx::query(
                r#"
                INSERT INTO screen_results
                    (run_id, symbol, exchange, contract_id, rank, distance, benchmark,
                     price_at_screen, volume_at_screen)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(run_id)
            .bind(&r.symbol)
            .bind(&r.exchange)
            .bind(r.contract_id)
            .bind(i64::from(r.rank))
            .bind(&r.distance)
            .bind(&r.benchmark)
            .bind(r.price)
            .bind(r.volume)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        debug!(
            run_id,
            strategy = %snapshot.strategy_name,
            result_count,
            "Recorded screen run"
        );
        Ok(run_id)
    }

    /// Fill in the screen-time price for a result written without one.
    pub async fn record_screen_price(
        &self,
        result_id: i64,
        price: f64,
        volume: Option<i64>,
    ) -> Result<()> {
        let updated = sqlx::query(
            r#"
            UPDATE screen_results
            SET price_at_screen = ?,
                volume_at_screen = COALESCE(?, volume_at_screen)
            WHERE id = ?
            "#,
        )
        .bind(price)
        .bind(volume)
        .bind(result_id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(AppError::not_found("screen result", result_id));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Read path
    // -----------------------------------------------------------------------

    pub async fn read_run(&self, run_id: i64) -> Result<Option<ScreenRun>> {
        let sql = format!("SELECT {RUN_COLUMNS} FROM screen_runs WHERE id = ?");
        sqlx::query_as::<_, RunRow>(&sql)
            .bind(run_id)
            .fetch_optional(&self.pool)
            .await?
            .map(ScreenRun::try_from)
            .transpose()
    }

    /// Results of a run, best rank first. Empty for unknown runs.
    pub async fn read_results(&self, run_id: i64) -> Result<Vec<StoredResult>> {
        let sql = format!("SELECT {RESULT_COLUMNS} FROM screen_results WHERE run_id = ? ORDER BY rank ASC");
        Ok(sqlx::query_as::<_, StoredResult>(&sql)
            .bind(run_id)
            .fetch_all(&self.pool)
            .await?)
    }

    /// Newest runs first; insertion order breaks timestamp ties.
    pub async fn list_recent_runs(
        &self,
        strategy_name: Option<&str>,
        limit: i64,
    ) -> Result<Vec<ScreenRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM screen_runs \
             WHERE (? IS NULL OR strategy_name = ?) \
             ORDER BY executed_at DESC, id DESC \
             LIMIT ?"
        );
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(strategy_name)
            .bind(strategy_name)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ScreenRun::try_from).collect()
    }

    /// Runs with `start <= executed_at <= end`, compared as strings.
    pub async fn list_runs_in_range(
        &self,
        start: &str,
        end: &str,
        strategy_name: Option<&str>,
    ) -> Result<Vec<ScreenRun>> {
        let sql = format!(
            "SELECT {RUN_COLUMNS} FROM screen_runs \
             WHERE executed_at BETWEEN ? AND ? \
               AND (? IS NULL OR strategy_name = ?) \
             ORDER BY executed_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, RunRow>(&sql)
            .bind(start)
            .bind(end)
            .bind(strategy_name)
            .bind(strategy_name)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(ScreenRun::try_from).collect()
    }

    /// Every appearance of `symbol` in the last `days_back` days, newest first.
    pub async fn symbol_history(
        &self,
        symbol: &str,
        days_back: i64,
    ) -> Result<Vec<(ScreenRun, StoredResult)>> {
        let cutoff = timefmt::days_ago_iso(days_back);
        let rows = sqlx::query_as::<_, SymbolHistoryRow>(
            r#"
            SELECT
                s.id AS id, s.run_id AS run_id, s.symbol AS symbol, s.exchange AS exchange,
                s.contract_id AS contract_id, s.rank AS rank,
                s.distance AS distance, s.benchmark AS benchmark,
                s.price_at_screen AS price_at_screen, s.volume_at_screen AS volume_at_screen,
                s.price_1d_later AS price_1d_later, s.price_1w_later AS price_1w_later,
                s.price_1m_later AS price_1m_later,
                s.return_1d AS return_1d, s.return_1w AS return_1w, s.return_1m AS return_1m,
                r.strategy_name AS strategy_name, r.scan_code AS scan_code,
                r.executed_at AS executed_at, r.result_count AS result_count,
                r.filters AS filters, r.bias AS bias, r.style AS style
            FROM screen_results s
            JOIN screen_runs r ON s.run_id = r.id
            WHERE s.symbol = ?
              AND r.executed_at >= ?
            ORDER BY r.executed_at DESC, r.id DESC
            "#,
        )
        .bind(symbol)
        .bind(&cutoff)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(SymbolHistoryRow::into_pair).collect()
    }
}
