//! Round-trip latency of gateway scanner requests.

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;

use crate::error::{AppError, Result};

/// Slowest scan tracked: ten minutes, in microseconds.
const MAX_TRACKED_US: u64 = 600_000_000;

/// Values stored in microseconds.
pub struct ScanLatency {
    inner: Mutex<hdrhistogram::Histogram<u64>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencySummary {
    pub samples: u64,
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
}

impl ScanLatency {
    /// 1us to ten minutes, 3 significant figures.
    pub fn new() -> Result<Self> {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, MAX_TRACKED_US, 3)
            .map_err(|e| AppError::Config(format!("latency histogram: {e}")))?;
        Ok(Self {
            inner: Mutex::new(histogram),
        })
    }

    pub fn record(&self, d: Duration) {
        let us = d.as_micros().clamp(1, u128::from(MAX_TRACKED_US)) as u64;
        if let Ok(mut h) = self.inner.lock() {
            let _ = h.record(us);
        }
    }

    /// None until the first sample.
    pub fn summary(&self) -> Option<LatencySummary> {
        let h = self.inner.lock().ok()?;
        if h.len() == 0 {
            return None;
        }
        let ms = |q: f64| h.value_at_quantile(q) as f64 / 1000.0;
        Some(LatencySummary {
            samples: h.len(),
            p50_ms: ms(0.5),
            p95_ms: ms(0.95),
            p99_ms: ms(0.99),
        })
    }

    pub fn len(&self) -> u64 {
        self.inner.lock().map(|h| h.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_has_no_summary() {
        let lat = ScanLatency::new().unwrap();
        assert!(lat.summary().is_none());
        assert_eq!(lat.len(), 0);
    }

    #[test]
    fn percentiles_in_milliseconds() {
        let lat = ScanLatency::new().unwrap();
        for ms in 1..=100u64 {
            lat.record(Duration::from_millis(ms));
        }
        let s = lat.summary().unwrap();
        assert_eq!(s.samples, 100);
        assert!((s.p50_ms - 50.0).abs() < 0.5, "p50 {}", s.p50_ms);
        assert!((s.p99_ms - 99.0).abs() < 0.5, "p99 {}", s.p99_ms);
        assert!(s.p50_ms <= s.p95_ms && s.p95_ms <= s.p99_ms);
    }

    #[test]
    fn out_of_range_samples_are_clamped() {
        let lat = ScanLatency::new().unwrap();
        lat.record(Duration::ZERO);
        lat.record(Duration::from_secs(3600));
        assert_eq!(lat.len(), 2);
    }
}
