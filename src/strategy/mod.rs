pub mod predefined;
pub mod record;
pub mod store;

pub use store::StrategyStore;

use std::collections::BTreeSet;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::timefmt;
use crate::types::{Bias, Style};

pub const DEFAULT_INSTRUMENT: &str = "STK";
/// US major exchanges (NYSE, NASDAQ, AMEX).
pub const DEFAULT_LOCATION_CODE: &str = "STK.US.MAJOR";

// ---------------------------------------------------------------------------
// Filters
// ---------------------------------------------------------------------------

/// Screening bounds. Every bound is optional; absent bounds are not sent to
/// the scanner and are omitted from serialized snapshots.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScreenFilters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_max: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_min: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume_max: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_volume_min: Option<i64>,

    /// USD.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub market_cap_max: Option<f64>,

    /// Percent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub price_change_max: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volatility_max: Option<f64>,
}

// ---------------------------------------------------------------------------
// Performance accumulator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Performance {
    pub total_runs: u32,
    pub successful_picks: u32,
    pub failed_picks: u32,
    /// Running mean of every `return_pct` passed to `record_result`.
    pub avg_return: f64,
    pub last_run: Option<NaiveDateTime>,
    pub last_result_count: u32,
}

impl Performance {
    /// Called once per execution, whatever the outcome.
    pub fn update_run(&mut self, result_count: usize) {
        self.total_runs += 1;
        self.last_run = Some(timefmt::now());
        self.last_result_count = u32::try_from(result_count).unwrap_or(u32::MAX);
    }

    pub fn record_result(&mut self, successful: bool, return_pct: f64) {
        if successful {
            self.successful_picks += 1;
        } else {
            self.failed_picks += 1;
        }
        let n = f64::from(self.total_picks());
        self.avg_return = (self.avg_return * (n - 1.0) + return_pct) / n;
    }

    pub fn total_picks(&self) -> u32 {
        self.successful_picks + self.failed_picks
    }

    /// Percent of recorded picks that succeeded; 0 with no picks.
    pub fn success_rate(&self) -> f64 {
        let total = self.total_picks();
        if total == 0 {
            return 0.0;
        }
        f64::from(self.successful_picks) / f64::from(total) * 100.0
    }
}

// ---------------------------------------------------------------------------
// Strategy definition
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyDefinition {
    pub name: String,
    pub description: String,
    /// Opaque scanner query identifier, e.g. `TOP_PERC_GAIN`.
    pub scan_code: String,
    pub filters: ScreenFilters,
    pub bias: Bias,
    pub style: Style,
    pub instrument: String,
    pub location_code: String,
    pub performance: Performance,
    pub created: NaiveDateTime,
    pub modified: NaiveDateTime,
    pub enabled: bool,
    pub tags: BTreeSet<String>,
}

impl StrategyDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        scan_code: impl Into<String>,
    ) -> Self {
        let now = timefmt::now();
        Self {
            name: name.into(),
            description: description.into(),
            scan_code: scan_code.into(),
            filters: ScreenFilters::default(),
            bias: Bias::default(),
            style: Style::default(),
            instrument: DEFAULT_INSTRUMENT.to_string(),
            location_code: DEFAULT_LOCATION_CODE.to_string(),
            performance: Performance::default(),
            created: now,
            modified: now,
            enabled: true,
            tags: BTreeSet::new(),
        }
    }

    pub fn touch(&mut self) {
        self.modified = timefmt::now();
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn performance_running_average_and_success_rate() {
        let mut perf = Performance::default();
        perf.record_result(true, 10.0);
        perf.record_result(true, 5.0);
        perf.record_result(false, -2.0);

        assert_eq!(perf.successful_picks, 2);
        assert_eq!(perf.failed_picks, 1);
        assert!((perf.avg_return - 13.0 / 3.0).abs() < 1e-9);
        assert!((perf.success_rate() - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn success_rate_is_zero_without_picks() {
        assert_eq!(Performance::default().success_rate(), 0.0);
    }

    #[test]
    fn update_run_does_not_touch_pick_statistics() {
        let mut perf = Performance::default();
        perf.update_run(7);
        perf.update_run(0);

        assert_eq!(perf.total_runs, 2);
        assert_eq!(perf.last_result_count, 0);
        assert!(perf.last_run.is_some());
        assert_eq!(perf.total_picks(), 0);
        assert_eq!(perf.avg_return, 0.0);
    }

    #[test]
    fn filters_serialize_without_empty_bounds() {
        let filters = ScreenFilters {
            price_min: Some(2.0),
            volume_min: Some(500_000),
            ..Default::default()
        };
        let json = serde_json::to_value(&filters).unwrap();
        assert_eq!(json, serde_json::json!({"price_min": 2.0, "volume_min": 500000}));
    }

    #[test]
    fn filters_reject_unknown_keys() {
        let err = serde_json::from_str::<ScreenFilters>(r#"{"price_floor": 3.0}"#);
        assert!(err.is_err());
    }
}
