//! Forward-return backfill and the aggregate queries built on it.

use serde::Serialize;
use tracing::{debug, info};

use super::models::{ReturnAggregateRow, RunAggregateRow, SymbolCountRow};
use super::store::ScreenStore;
use crate::error::Result;
use crate::timefmt;

/// Percent move from the screen-time price to a later price.
pub fn horizon_return(price_at_screen: f64, later_price: f64) -> f64 {
    (later_price - price_at_screen) / price_at_screen * 100.0
}

/// Aggregates for one strategy over a trailing window.
/// Return averages only cover results with a 1-day return.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrategyStatistics {
    pub strategy_name: String,
    pub days_back: i64,
    pub total_runs: i64,
    pub total_results: i64,
    pub avg_results_per_run: f64,
    pub avg_return_1d: Option<f64>,
    pub avg_return_1w: Option<f64>,
    pub avg_return_1m: Option<f64>,
    pub winners_1d: i64,
    pub losers_1d: i64,
    pub total_with_backtest_data: i64,
}

impl StrategyStatistics {
    /// Share of backtested results with a positive 1-day return, in percent.
    pub fn win_rate_1d(&self) -> f64 {
        let decided = self.winners_1d + self.losers_1d;
        if decided == 0 {
            return 0.0;
        }
        self.winners_1d as f64 / decided as f64 * 100.0
    }
}

impl ScreenStore {
    /// Record realized prices for one result. Each supplied horizon stores
    /// its price and computed return; absent horizons keep their old values.
    /// Returns false (and writes nothing) when the result has no usable
    /// screen-time price or does not exist.
    pub async fn backfill_prices(
        &self,
        result_id: i64,
        price_1d: Option<f64>,
        price_1w: Option<f64>,
        price_1m: Option<f64>,
    ) -> Result<bool> {
        if price_1d.is_none() && price_1w.is_none() && price_1m.is_none() {
            return Ok(false);
        }

        let mut tx = self.pool.begin().await?;

        let base: Option<Option<f64>> =
            sqlx::query_scalar("SELECT price_at_screen FROM screen_results WHERE id = ?")
                .bind(result_id)
                .fetch_optional(&mut *tx)
                .await?;
        let Some(base) = base.flatten().filter(|p| *p > 0.0) else {
            tx.rollback().await?;
            debug!(result_id, "No screen-time price, skipping backfill");
            return Ok(false);
        };

        let ret = |p: Option<f64>| p.map(|p| horizon_return(base, p));

        sqlx::query(
            r#"
            UPDATE screen_results SET
                price_1d_later = COALESCE(?, price_1d_later),
                price_1w_later = COALESCE(?, price_1w_later),
                price_1m_later = COALESCE(?, price_1m_later),
                return_1d = COALESCE(?, return_1d),
                return_1w = COALESCE(?, return_1w),
                return_1m = COALESCE(?, return_1m)
            WHERE id = ?
            "#,
        )
        .bind(price_1d)
        .bind(price_1w)
        .bind(price_1m)
        .bind(ret(price_1d))
        .bind(ret(price_1w))
        .bind(ret(price_1m))
        .bind(result_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn strategy_statistics(
        &self,
        strategy_name: &str,
        days_back: i64,
    ) -> Result<StrategyStatistics> {
        let cutoff = timefmt::days_ago_iso(days_back);

        let runs = sqlx::query_as::<_, RunAggregateRow>(
            r#"
            SELECT
                COUNT(*) AS total_runs,
                COALESCE(SUM(result_count), 0) AS total_results,
                AVG(result_count) AS avg_results_per_run
            FROM screen_runs
            WHERE strategy_name = ? AND executed_at >= ?
            "#,
        )
        .bind(strategy_name)
        .bind(&cutoff)
        .fetch_one(&self.pool)
        .await?;

        let returns = sqlx::query_as::<_, ReturnAggregateRow>(
            r#"
            SELECT
                AVG(s.return_1d) AS avg_return_1d,
                AVG(s.return_1w) AS avg_return_1w,
                AVG(s.return_1m) AS avg_return_1m,
                COUNT(CASE WHEN s.return_1d > 0 THEN 1 END) AS winners_1d,
                COUNT(CASE WHEN s.return_1d < 0 THEN 1 END) AS losers_1d,
                COUNT(*) AS total_with_data
            FROM screen_results s
            JOIN screen_runs r ON s.run_id = r.id
            WHERE r.strategy_name = ?
              AND r.executed_at >= ?
              AND s.return_1d IS NOT NULL
            "#,
        )
        .bind(strategy_name)
        .bind(&cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(StrategyStatistics {
            strategy_name: strategy_name.to_string(),
            days_back,
            total_runs: runs.total_runs,
            total_results: runs.total_results,
            avg_results_per_run: runs.avg_results_per_run.unwrap_or(0.0),
            avg_return_1d: returns.avg_return_1d,
            avg_return_1w: returns.avg_return_1w,
            avg_return_1m: returns.avg_return_1m,
            winners_1d: returns.winners_1d,
            losers_1d: returns.losers_1d,
            total_with_backtest_data: returns.total_with_data,
        })
    }

    /// Most frequently screened symbols. Ties are ordered by symbol.
    pub async fn top_symbols(
        &self,
        strategy_name: Option<&str>,
        days_back: i64,
        limit: i64,
    ) -> Result<Vec<(String, i64)>> {
        let cutoff = timefmt::days_ago_iso(days_back);
        let rows = sqlx::query_as::<_, SymbolCountRow>(
            r#"
            SELECT s.symbol AS symbol, COUNT(*) AS appearances
            FROM screen_results s
            JOIN screen_runs r ON s.run_id = r.id
            WHERE (? IS NULL OR r.strategy_name = ?)
              AND r.executed_at >= ?
            GROUP BY s.symbol
            ORDER BY appearances DESC, s.symbol ASC
            LIMIT ?
            "#,
        )
        .bind(strategy_name)
        .bind(strategy_name)
        .bind(&cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| (r.symbol, r.appearances)).collect())
    }

    /// Retention cleanup. Returns the number of runs removed.
    pub async fn delete_runs_older_than(&self, days_to_keep: i64) -> Result<u64> {
        let cutoff = timefmt::days_ago_iso(days_to_keep);
        let mut tx = self.pool.begin().await?;

        let results = sqlx::query(
            "DELETE FROM screen_results \
             WHERE run_id IN (SELECT id FROM screen_runs WHERE executed_at < ?)",
        )
        .bind(&cutoff)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        let runs = sqlx::query("DELETE FROM screen_runs WHERE executed_at < ?")
            .bind(&cutoff)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        tx.commit().await?;

        if runs > 0 {
            info!(runs, results, "Deleted runs older than {days_to_keep} days");
        }
        Ok(runs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::store::tests::{days_ago, result, snapshot, temp_store};
    use crate::db::StoredResult;

    fn approx(a: Option<f64>, b: f64) -> bool {
        a.is_some_and(|a| (a - b).abs() < 1e-9)
    }

    async fn single_result(store: &ScreenStore, price: Option<f64>) -> StoredResult {
        let run_id = store
            .write_run(&snapshot("s1"), &[result("AAPL", 1, price)], None)
            .await
            .unwrap();
        store.read_results(run_id).await.unwrap().remove(0)
    }

    async fn reload(store: &ScreenStore, r: &StoredResult) -> StoredResult {
        store.read_results(r.run_id).await.unwrap().remove(0)
    }

    #[test]
    fn horizon_return_is_percent_change() {
        assert!((horizon_return(100.0, 105.0) - 5.0).abs() < 1e-9);
        assert!((horizon_return(100.0, 95.0) + 5.0).abs() < 1e-9);
        assert!((horizon_return(50.0, 50.0)).abs() < 1e-9);
    }

    #[tokio::test]
    async fn backfill_computes_each_horizon() {
        let (_dir, store) = temp_store().await;
        let r = single_result(&store, Some(100.0)).await;

        let written = store
            .backfill_prices(r.id, Some(105.0), Some(110.0), Some(95.0))
            .await
            .unwrap();
        assert!(written);

        let r = reload(&store, &r).await;
        assert_eq!(r.price_1d_later, Some(105.0));
        assert_eq!(r.price_1w_later, Some(110.0));
        assert_eq!(r.price_1m_later, Some(95.0));
        assert!(approx(r.return_1d, 5.0));
        assert!(approx(r.return_1w, 10.0));
        assert!(approx(r.return_1m, -5.0));
    }

    #[tokio::test]
    async fn backfill_without_screen_price_is_noop() {
        let (_dir, store) = temp_store().await;
        let r = single_result(&store, None).await;

        let written = store
            .backfill_prices(r.id, Some(105.0), Some(110.0), Some(95.0))
            .await
            .unwrap();
        assert!(!written);

        let after = reload(&store, &r).await;
        assert_eq!(after, r);
        assert!(after.price_1d_later.is_none() && after.return_1d.is_none());
        assert!(after.return_1w.is_none() && after.return_1m.is_none());
    }

    #[tokio::test]
    async fn backfill_of_unknown_result_is_noop() {
        let (_dir, store) = temp_store().await;
        assert!(!store.backfill_prices(12345, Some(1.0), None, None).await.unwrap());
    }

    #[tokio::test]
    async fn later_backfill_keeps_earlier_horizons() {
        let (_dir, store) = temp_store().await;
        let r = single_result(&store, Some(100.0)).await;

        store.backfill_prices(r.id, Some(102.0), None, None).await.unwrap();
        store.backfill_prices(r.id, None, Some(120.0), None).await.unwrap();

        let r = reload(&store, &r).await;
        assert!(approx(r.return_1d, 2.0));
        assert!(approx(r.return_1w, 20.0));
        assert!(r.return_1m.is_none());

        // A fresh 1-day price replaces the old one.
        store.backfill_prices(r.id, Some(90.0), None, None).await.unwrap();
        let r = reload(&store, &r).await;
        assert!(approx(r.return_1d, -10.0));
        assert!(approx(r.return_1w, 20.0));
    }

    #[tokio::test]
    async fn statistics_count_winners_and_losers() {
        let (_dir, store) = temp_store().await;
        for ret_1d in [5.0, -3.0, 5.0] {
            let run_id = store
                .write_run(&snapshot("S"), &[result("AAPL", 1, Some(100.0))], None)
                .await
                .unwrap();
            let id = store.read_results(run_id).await.unwrap()[0].id;
            store
                .backfill_prices(id, Some(100.0 + ret_1d), None, None)
                .await
                .unwrap();
        }
        // A run without backtest data still counts at run level.
        store
            .write_run(&snapshot("S"), &[result("MSFT", 1, None), result("AMD", 2, None)], None)
            .await
            .unwrap();

        let stats = store.strategy_statistics("S", 30).await.unwrap();
        assert_eq!(stats.total_runs, 4);
        assert_eq!(stats.total_results, 5);
        assert!((stats.avg_results_per_run - 1.25).abs() < 1e-9);
        assert_eq!(stats.winners_1d, 2);
        assert_eq!(stats.losers_1d, 1);
        assert_eq!(stats.total_with_backtest_data, 3);
        assert!(approx(stats.avg_return_1d, 7.0 / 3.0));
        assert!(stats.avg_return_1w.is_none());
        assert!((stats.win_rate_1d() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn statistics_for_unknown_strategy_are_zero() {
        let (_dir, store) = temp_store().await;
        let stats = store.strategy_statistics("nobody", 30).await.unwrap();
        assert_eq!(stats.total_runs, 0);
        assert_eq!(stats.total_results, 0);
        assert_eq!(stats.avg_results_per_run, 0.0);
        assert_eq!(stats.total_with_backtest_data, 0);
        assert!(stats.avg_return_1d.is_none());
        assert_eq!(stats.win_rate_1d(), 0.0);
    }

    #[tokio::test]
    async fn statistics_respect_window() {
        let (_dir, store) = temp_store().await;
        store
            .write_run(&snapshot("S"), &[result("AAPL", 1, None)], Some(&days_ago(60)))
            .await
            .unwrap();
        assert_eq!(store.strategy_statistics("S", 30).await.unwrap().total_runs, 0);
        assert_eq!(store.strategy_statistics("S", 90).await.unwrap().total_runs, 1);
    }

    #[tokio::test]
    async fn top_symbols_by_count_then_name() {
        let (_dir, store) = temp_store().await;
        let runs: [&[&str]; 3] = [
            &["AAPL", "TSLA", "MSFT"],
            &["TSLA", "AAPL", "AMD"],
            &["AAPL"],
        ];
        for symbols in runs {
            let rows: Vec<_> = symbols
                .iter()
                .enumerate()
                .map(|(i, s)| result(s, i as u32 + 1, None))
                .collect();
            store.write_run(&snapshot("s1"), &rows, None).await.unwrap();
        }
        store
            .write_run(&snapshot("other"), &[result("ZZZ", 1, None)], None)
            .await
            .unwrap();

        let top = store.top_symbols(None, 30, 10).await.unwrap();
        assert_eq!(
            top,
            vec![
                ("AAPL".to_string(), 3),
                ("TSLA".to_string(), 2),
                ("AMD".to_string(), 1),
                ("MSFT".to_string(), 1),
                ("ZZZ".to_string(), 1),
            ]
        );

        let limited = store.top_symbols(Some("s1"), 30, 2).await.unwrap();
        assert_eq!(limited, vec![("AAPL".to_string(), 3), ("TSLA".to_string(), 2)]);
    }

    #[tokio::test]
    async fn cleanup_cascades_to_results() {
        let (_dir, store) = temp_store().await;
        let old = store
            .write_run(
                &snapshot("s1"),
                &[result("AAPL", 1, None), result("TSLA", 2, None)],
                Some(&days_ago(120)),
            )
            .await
            .unwrap();
        let fresh = store
            .write_run(&snapshot("s1"), &[result("AAPL", 1, None)], None)
            .await
            .unwrap();

        assert_eq!(store.delete_runs_older_than(90).await.unwrap(), 1);
        assert!(store.read_run(old).await.unwrap().is_none());
        assert!(store.read_results(old).await.unwrap().is_empty());
        assert_eq!(store.read_results(fresh).await.unwrap().len(), 1);

        assert_eq!(store.delete_runs_older_than(90).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn out_of_range_windows_are_clamped() {
        let (_dir, store) = temp_store().await;
        store
            .write_run(&snapshot("S"), &[result("AAPL", 1, Some(10.0))], Some(&days_ago(400)))
            .await
            .unwrap();

        let stats = store.strategy_statistics("S", i64::MAX).await.unwrap();
        assert_eq!(stats.total_runs, 1);
        let stats = store.strategy_statistics("S", 100_000_000).await.unwrap();
        assert_eq!(stats.total_results, 1);

        let top = store.top_symbols(None, i64::MAX, 5).await.unwrap();
        assert_eq!(top, vec![("AAPL".to_string(), 1)]);
        assert_eq!(store.symbol_history("AAPL", i64::MAX).await.unwrap().len(), 1);

        assert_eq!(store.delete_runs_older_than(i64::MAX).await.unwrap(), 0);
        assert_eq!(store.delete_runs_older_than(i64::MIN).await.unwrap(), 1);
    }
}
