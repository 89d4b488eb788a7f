pub mod executor;
pub mod latency;

pub use executor::{ScreenExecutor, StrategyOutcome};

use tracing::warn;

use crate::db::{RunSnapshot, ScreenStore};
use crate::error::{AppError, Result};
use crate::strategy::StrategyStore;

/// What [`record_outcome`] persisted.
#[derive(Debug)]
pub struct Recorded {
    /// Screen log id, present when the scan succeeded.
    pub run_id: Option<i64>,
    /// Result of saving the refreshed accumulator to the strategy library.
    pub saved: Result<()>,
}

/// Persist one executed strategy: its refreshed accumulator goes back to the
/// strategy library and, when the scan succeeded, the run goes to the screen
/// log. A failed library save does not stop the run being logged; it is
/// handed back in [`Recorded::saved`].
///
/// A strategy that never reached the scanner is left alone.
pub async fn record_outcome(
    strategies: &mut StrategyStore,
    screens: &ScreenStore,
    outcome: &StrategyOutcome,
) -> Result<Recorded> {
    if matches!(outcome.outcome, Err(AppError::NotConnected(_))) {
        return Ok(Recorded {
            run_id: None,
            saved: Ok(()),
        });
    }

    let saved = strategies.update(outcome.strategy.clone());
    if let Err(e) = &saved {
        warn!(strategy = %outcome.strategy.name, "Could not save performance: {e}");
    }

    let run_id = match &outcome.outcome {
        Ok(results) => {
            let snapshot = RunSnapshot::from(&outcome.strategy);
            Some(screens.write_run(&snapshot, results, None).await?)
        }
        Err(_) => None,
    };
    Ok(Recorded { run_id, saved })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::db::store::tests::temp_store;
    use crate::strategy::StrategyDefinition;
    use crate::screener::executor::tests::{items, FakeScanner};

    #[tokio::test]
    async fn batch_outcomes_are_logged_and_performance_saved() {
        let (dir, screens) = temp_store().await;
        let mut library = StrategyStore::open(dir.path().join("strategies")).unwrap();

        let fake = Arc::new(FakeScanner {
            connected: true,
            items: items(&["AAA", "BBB"]),
            ..Default::default()
        });
        let exec = ScreenExecutor::new(fake, None).unwrap();

        let batch: Vec<_> = library
            .list(None, None, true)
            .into_iter()
            .filter(|s| s.name == "momentum_long")
            .cloned()
            .collect();
        let outcomes = exec.execute_all(batch, 10, Duration::ZERO).await;
        assert_eq!(outcomes.len(), 1);

        let recorded = record_outcome(&mut library, &screens, &outcomes[0])
            .await
            .unwrap();
        recorded.saved.expect("performance saved");
        let run_id = recorded.run_id.expect("run recorded");

        let run = screens.read_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.strategy_name, "momentum_long");
        assert_eq!(run.result_count, 2);
        assert_eq!(run.scan_code, "TOP_PERC_GAIN");

        assert_eq!(library.get("momentum_long").unwrap().performance.total_runs, 1);
        let reopened = StrategyStore::open(dir.path().join("strategies")).unwrap();
        assert_eq!(reopened.get("momentum_long").unwrap().performance.total_runs, 1);
    }

    #[tokio::test]
    async fn not_connected_records_nothing() {
        let (dir, screens) = temp_store().await;
        let mut library = StrategyStore::open(dir.path().join("strategies")).unwrap();
        let exec = ScreenExecutor::new(Arc::new(FakeScanner::default()), None).unwrap();

        let batch = vec![library.get("short_bias").unwrap().clone()];
        let outcomes = exec.execute_all(batch, 10, Duration::ZERO).await;

        let recorded = record_outcome(&mut library, &screens, &outcomes[0]).await.unwrap();
        assert_eq!(recorded.run_id, None);
        assert!(recorded.saved.is_ok());
        assert!(screens.list_recent_runs(None, 10).await.unwrap().is_empty());
        assert_eq!(library.get("short_bias").unwrap().performance.total_runs, 0);
    }

    #[tokio::test]
    async fn failed_library_save_is_reported_alongside_the_run() {
        let (dir, screens) = temp_store().await;
        let mut library = StrategyStore::open(dir.path().join("strategies")).unwrap();
        let fake = Arc::new(FakeScanner {
            connected: true,
            items: items(&["AAA"]),
            ..Default::default()
        });
        let exec = ScreenExecutor::new(fake, None).unwrap();

        // Never saved, so the library has nothing to update.
        let ghost = StrategyDefinition::new("ghost", "unsaved", "TOP_PERC_GAIN");
        let outcomes = exec.execute_all(vec![ghost], 10, Duration::ZERO).await;

        let recorded = record_outcome(&mut library, &screens, &outcomes[0]).await.unwrap();
        assert!(matches!(recorded.saved, Err(AppError::NotFound { .. })));
        let run = screens
            .read_run(recorded.run_id.expect("run still logged"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(run.strategy_name, "ghost");
        assert!(!library.contains("ghost"));
    }
}
