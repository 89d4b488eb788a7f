//! On-disk shape of a strategy file.
//!
//! The record is a plain serde struct; conversion to and from
//! [`StrategyDefinition`] is explicit so that enum values and timestamps are
//! validated in one place.

use serde::{Deserialize, Serialize};

use super::{Performance, ScreenFilters, StrategyDefinition, DEFAULT_INSTRUMENT, DEFAULT_LOCATION_CODE};
use crate::error::{AppError, Result};
use crate::timefmt;

pub const STRATEGY_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRecord {
    /// Files written before versioning carry no version field.
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub scan_code: String,
    #[serde(default)]
    pub filters: ScreenFilters,
    #[serde(default = "default_bias")]
    pub bias: String,
    #[serde(default = "default_style")]
    pub style: String,
    #[serde(default = "default_instrument")]
    pub instrument: String,
    #[serde(default = "default_location_code")]
    pub location_code: String,
    #[serde(default)]
    pub performance: PerformanceRecord,
    #[serde(default)]
    pub created: Option<String>,
    #[serde(default)]
    pub modified: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceRecord {
    pub total_runs: u32,
    pub successful_picks: u32,
    pub failed_picks: u32,
    pub avg_return: f64,
    pub last_run: Option<String>,
    pub last_result_count: u32,
}

fn default_schema_version() -> u32 {
    STRATEGY_SCHEMA_VERSION
}

fn default_bias() -> String {
    "neutral".to_string()
}

fn default_style() -> String {
    "custom".to_string()
}

fn default_instrument() -> String {
    DEFAULT_INSTRUMENT.to_string()
}

fn default_location_code() -> String {
    DEFAULT_LOCATION_CODE.to_string()
}

fn default_enabled() -> bool {
    true
}

impl From<&StrategyDefinition> for StrategyRecord {
    fn from(s: &StrategyDefinition) -> Self {
        Self {
            schema_version: STRATEGY_SCHEMA_VERSION,
            name: s.name.clone(),
            description: s.description.clone(),
            scan_code: s.scan_code.clone(),
            filters: s.filters.clone(),
            bias: s.bias.to_string(),
            style: s.style.to_string(),
            instrument: s.instrument.clone(),
            location_code: s.location_code.clone(),
            performance: PerformanceRecord {
                total_runs: s.performance.total_runs,
                successful_picks: s.performance.successful_picks,
                failed_picks: s.performance.failed_picks,
                avg_return: s.performance.avg_return,
                last_run: s.performance.last_run.map(timefmt::iso),
                last_result_count: s.performance.last_result_count,
            },
            created: Some(timefmt::iso(s.created)),
            modified: Some(timefmt::iso(s.modified)),
            enabled: s.enabled,
            tags: s.tags.iter().cloned().collect(),
        }
    }
}

impl TryFrom<StrategyRecord> for StrategyDefinition {
    type Error = AppError;

    fn try_from(r: StrategyRecord) -> Result<Self> {
        if r.schema_version != STRATEGY_SCHEMA_VERSION {
            return Err(AppError::UnsupportedSchema(r.schema_version));
        }

        let now = timefmt::now();
        let created = r.created.as_deref().map(timefmt::parse_iso).transpose()?;
        let modified = r.modified.as_deref().map(timefmt::parse_iso).transpose()?;
        let last_run = r
            .performance
            .last_run
            .as_deref()
            .map(timefmt::parse_iso)
            .transpose()?;

        Ok(Self {
            name: r.name,
            description: r.description,
            scan_code: r.scan_code,
            filters: r.filters,
            bias: r.bias.parse()?,
            style: r.style.parse()?,
            instrument: r.instrument,
            location_code: r.location_code,
            performance: Performance {
                total_runs: r.performance.total_runs,
                successful_picks: r.performance.successful_picks,
                failed_picks: r.performance.failed_picks,
                avg_return: r.performance.avg_return,
                last_run,
                last_result_count: r.performance.last_result_count,
            },
            created: created.unwrap_or(now),
            modified: modified.or(created).unwrap_or(now),
            enabled: r.enabled,
            tags: r.tags.into_iter().collect(),
        })
    }
}

/// Parse a strategy document from JSON text.
pub fn decode(json: &str) -> Result<StrategyDefinition> {
    let record: StrategyRecord = serde_json::from_str(json)?;
    StrategyDefinition::try_from(record)
}

/// Render a strategy as pretty-printed JSON.
pub fn encode(strategy: &StrategyDefinition) -> Result<String> {
    Ok(serde_json::to_string_pretty(&StrategyRecord::from(strategy))?)
}
