use std::str::FromStr;

use crate::error::{AppError, Result};

/// Client Portal gateway REST root.
pub const GATEWAY_URL: &str = "https://localhost:5000/v1/api";

/// Request timeout for gateway calls (seconds).
pub const GATEWAY_TIMEOUT_SECS: u64 = 30;

pub const DB_PATH: &str = "falcon_data/screens.db";
pub const STRATEGY_DIR: &str = "falcon_data/strategies";

/// SQLite pool size. The store is single-writer; extra connections only serve
/// the read-only API.
pub const DB_MAX_CONNECTIONS: u32 = 4;

/// Results kept per strategy execution.
pub const MAX_RESULTS: usize = 50;

/// Pause between strategies in a batch run (seconds).
pub const STRATEGY_DELAY_SECS: u64 = 2;

/// Screen runs older than this are removed by `cleanup`.
pub const RETENTION_DAYS: i64 = 90;

/// Default trailing window for history and statistics queries.
pub const HISTORY_DAYS: i64 = 30;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TradingMode {
    #[default]
    Paper,
    Live,
}

impl std::fmt::Display for TradingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradingMode::Paper => write!(f, "paper"),
            TradingMode::Live => write!(f, "live"),
        }
    }
}

impl FromStr for TradingMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paper" => Ok(TradingMode::Paper),
            "live" => Ok(TradingMode::Live),
            other => Err(AppError::Config(format!(
                "TRADING_MODE must be 'paper' or 'live', got '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_url: String,
    pub trading_mode: TradingMode,
    pub gateway_timeout_secs: u64,
    /// The gateway serves a self-signed certificate (GATEWAY_ACCEPT_INVALID_CERTS)
    pub gateway_accept_invalid_certs: bool,
    /// Overrides every strategy's location code when set (LOCATION_CODE)
    pub location_code: Option<String>,
    pub db_path: String,
    pub strategy_dir: String,
    pub log_level: String,
    pub api_port: u16,
    pub max_results: usize,
    pub strategy_delay_secs: u64,
    pub retention_days: i64,
}

impl Config {
    /// Read configuration from the process environment, after loading `.env`
    /// if one exists.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary variable source. Unset keys take
    /// their defaults; set but malformed keys are errors.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| var(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        Ok(Self {
            gateway_url: non_empty("GATEWAY_URL").unwrap_or_else(|| GATEWAY_URL.to_string()),
            trading_mode: non_empty("TRADING_MODE")
                .map(|v| v.parse::<TradingMode>())
                .transpose()?
                .unwrap_or_default(),
            gateway_timeout_secs: parsed(&non_empty, "GATEWAY_TIMEOUT_SECS", GATEWAY_TIMEOUT_SECS)?,
            gateway_accept_invalid_certs: non_empty("GATEWAY_ACCEPT_INVALID_CERTS")
                .map(|v| parse_bool("GATEWAY_ACCEPT_INVALID_CERTS", &v))
                .transpose()?
                .unwrap_or(true),
            location_code: non_empty("LOCATION_CODE"),
            db_path: non_empty("DB_PATH").unwrap_or_else(|| DB_PATH.to_string()),
            strategy_dir: non_empty("STRATEGY_DIR").unwrap_or_else(|| STRATEGY_DIR.to_string()),
            log_level: non_empty("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            api_port: parsed(&non_empty, "API_PORT", 3000u16)?,
            max_results: parsed(&non_empty, "MAX_RESULTS", MAX_RESULTS)?,
            strategy_delay_secs: parsed(&non_empty, "STRATEGY_DELAY_SECS", STRATEGY_DELAY_SECS)?,
            retention_days: parsed(&non_empty, "RETENTION_DAYS", RETENTION_DAYS)?,
        })
    }

    pub fn is_paper_trading(&self) -> bool {
        self.trading_mode == TradingMode::Paper
    }
}

fn parsed<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T> {
    match var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| AppError::Config(format!("{key} has invalid value '{raw}'"))),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(AppError::Config(format!("{key} must be a boolean, got '{raw}'"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_vars(|k| vars.get(k).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg.gateway_url, GATEWAY_URL);
        assert_eq!(cfg.trading_mode, TradingMode::Paper);
        assert!(cfg.is_paper_trading());
        assert!(cfg.gateway_accept_invalid_certs);
        assert_eq!(cfg.location_code, None);
        assert_eq!(cfg.db_path, DB_PATH);
        assert_eq!(cfg.api_port, 3000);
        assert_eq!(cfg.max_results, MAX_RESULTS);
        assert_eq!(cfg.retention_days, RETENTION_DAYS);
    }

    #[test]
    fn reads_overrides() {
        let cfg = config(&[
            ("TRADING_MODE", "LIVE"),
            ("GATEWAY_ACCEPT_INVALID_CERTS", "false"),
            ("LOCATION_CODE", "STK.NASDAQ"),
            ("MAX_RESULTS", "10"),
            ("API_PORT", "8080"),
            ("STRATEGY_DIR", "/tmp/strats"),
        ])
        .unwrap();
        assert_eq!(cfg.trading_mode, TradingMode::Live);
        assert!(!cfg.gateway_accept_invalid_certs);
        assert_eq!(cfg.location_code.as_deref(), Some("STK.NASDAQ"));
        assert_eq!(cfg.max_results, 10);
        assert_eq!(cfg.api_port, 8080);
        assert_eq!(cfg.strategy_dir, "/tmp/strats");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(config(&[("TRADING_MODE", "demo")]), Err(AppError::Config(_))));
        assert!(matches!(config(&[("API_PORT", "99999")]), Err(AppError::Config(_))));
        assert!(matches!(
            config(&[("GATEWAY_ACCEPT_INVALID_CERTS", "maybe")]),
            Err(AppError::Config(_))
        ));
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let cfg = config(&[("DB_PATH", "  "), ("LOCATION_CODE", "")]).unwrap();
        assert_eq!(cfg.db_path, DB_PATH);
        assert_eq!(cfg.location_code, None);
    }
}
