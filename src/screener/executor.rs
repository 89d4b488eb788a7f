use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::latency::{LatencySummary, ScanLatency};
use crate::error::{AppError, Result};
use crate::gateway::ScanCapability;
use crate::strategy::StrategyDefinition;
use crate::types::{ScanParams, ScreenResult};

/// Outcome of one strategy in a batch. `strategy` carries the updated
/// performance accumulator whether or not the scan succeeded.
#[derive(Debug)]
pub struct StrategyOutcome {
    pub strategy: StrategyDefinition,
    pub outcome: Result<Vec<ScreenResult>>,
}

/// Runs strategies against the scan capability and normalizes the results.
pub struct ScreenExecutor {
    scanner: Arc<dyn ScanCapability>,
    /// Replaces each strategy's own location code when set.
    location_override: Option<String>,
    latency: ScanLatency,
}

impl ScreenExecutor {
    pub fn new(scanner: Arc<dyn ScanCapability>, location_override: Option<String>) -> Result<Self> {
        Ok(Self {
            scanner,
            location_override,
            latency: ScanLatency::new()?,
        })
    }

    /// Scanner parameters for `strategy`. Market cap bounds are sent in
    /// millions of USD.
    pub fn scan_params(&self, strategy: &StrategyDefinition) -> ScanParams {
        let f = &strategy.filters;
        ScanParams {
            instrument: strategy.instrument.clone(),
            location_code: self
                .location_override
                .clone()
                .unwrap_or_else(|| strategy.location_code.clone()),
            scan_code: strategy.scan_code.clone(),
            above_price: f.price_min,
            below_price: f.price_max,
            above_volume: f.volume_min,
            market_cap_above_millions: f.market_cap_min.map(|v| v / 1_000_000.0),
            market_cap_below_millions: f.market_cap_max.map(|v| v / 1_000_000.0),
        }
    }

    /// Execute one strategy, returning at most `max_results` ranked results.
    ///
    /// Without a gateway session this fails before touching the strategy.
    /// Any later failure still counts as a run with zero results.
    pub async fn execute(
        &self,
        strategy: &mut StrategyDefinition,
        max_results: usize,
    ) -> Result<Vec<ScreenResult>> {
        if !self.scanner.is_connected() {
            return Err(AppError::NotConnected(format!(
                "cannot execute '{}'",
                strategy.name
            )));
        }

        let params = self.scan_params(strategy);
        debug!(strategy = %strategy.name, ?params, "Running scanner");

        let started = Instant::now();
        let scanned = self.scanner.scan(&params).await;
        self.latency.record(started.elapsed());

        let items = match scanned {
            Ok(items) => items,
            Err(e) => {
                strategy.performance.update_run(0);
                strategy.touch();
                return Err(match e {
                    e @ AppError::ExternalCall(_) => e,
                    other => AppError::ExternalCall(other.to_string()),
                });
            }
        };

        let mut results: Vec<ScreenResult> = items
            .into_iter()
            .take(max_results)
            .zip(1u32..)
            .map(|(item, rank)| ScreenResult::from_scan_item(item, rank))
            .collect();

        self.enrich(&mut results).await;

        strategy.performance.update_run(results.len());
        strategy.touch();

        info!(
            strategy = %strategy.name,
            results = results.len(),
            "Strategy executed in {:.0}ms",
            started.elapsed().as_secs_f64() * 1000.0
        );
        Ok(results)
    }

    /// Attach price, volume and implied volatility. Missing data is not an
    /// error; the results keep empty market-data fields.
    async fn enrich(&self, results: &mut [ScreenResult]) {
        if results.is_empty() {
            return;
        }
        let ids: Vec<i64> = results.iter().map(|r| r.contract_id).collect();
        match self.scanner.snapshot(&ids).await {
            Ok(snaps) => {
                let by_id: HashMap<i64, _> = snaps.iter().map(|s| (s.contract_id, s)).collect();
                for r in results.iter_mut() {
                    if let Some(snap) = by_id.get(&r.contract_id) {
                        r.apply_snapshot(snap);
                    }
                }
            }
            Err(e) => warn!("Market data snapshot failed, results kept without prices: {e}"),
        }
    }

    /// Execute each enabled strategy in turn, pausing `delay` between them.
    /// A failing strategy is reported in its outcome and the batch continues.
    pub async fn execute_all(
        &self,
        strategies: Vec<StrategyDefinition>,
        max_results: usize,
        delay: Duration,
    ) -> Vec<StrategyOutcome> {
        let enabled: Vec<_> = strategies.into_iter().filter(|s| s.enabled).collect();
        let total = enabled.len();
        let mut outcomes = Vec::with_capacity(total);

        for (i, mut strategy) in enabled.into_iter().enumerate() {
            info!("[{}/{}] Running strategy '{}'", i + 1, total, strategy.name);
            let outcome = self.execute(&mut strategy, max_results).await;
            if let Err(e) = &outcome {
                warn!(strategy = %strategy.name, "Strategy failed: {e}");
            }
            outcomes.push(StrategyOutcome { strategy, outcome });

            if i + 1 < total && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
        }

        if let Some(s) = self.latency_summary() {
            info!(
                "Scan latency over {} scans: p50={:.0}ms p95={:.0}ms p99={:.0}ms",
                s.samples, s.p50_ms, s.p95_ms, s.p99_ms
            );
        }
        outcomes
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        self.latency.summary()
    }
}
