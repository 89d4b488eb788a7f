use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;

// ---------------------------------------------------------------------------
// Strategy classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bias {
    Long,
    Short,
    #[default]
    Neutral,
}

impl std::fmt::Display for Bias {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Bias::Long => "long",
            Bias::Short => "short",
            Bias::Neutral => "neutral",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Bias {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "long" => Ok(Bias::Long),
            "short" => Ok(Bias::Short),
            "neutral" => Ok(Bias::Neutral),
            other => Err(AppError::UnknownVariant {
                kind: "bias",
                value: other.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Momentum,
    MeanReversion,
    Breakout,
    Value,
    Volatility,
    #[default]
    Custom,
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Style::Momentum => "momentum",
            Style::MeanReversion => "mean_reversion",
            Style::Breakout => "breakout",
            Style::Value => "value",
            Style::Volatility => "volatility",
            Style::Custom => "custom",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Style {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "momentum" => Ok(Style::Momentum),
            "mean_reversion" => Ok(Style::MeanReversion),
            "breakout" => Ok(Style::Breakout),
            "value" => Ok(Style::Value),
            "volatility" => Ok(Style::Volatility),
            "custom" => Ok(Style::Custom),
            other => Err(AppError::UnknownVariant {
                kind: "style",
                value: other.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Scanner request / response
// ---------------------------------------------------------------------------

/// Parameters handed to the external scan capability.
/// Market cap bounds are already in millions of USD.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanParams {
    pub instrument: String,
    pub location_code: String,
    pub scan_code: String,
    pub above_price: Option<f64>,
    pub below_price: Option<f64>,
    pub above_volume: Option<i64>,
    pub market_cap_above_millions: Option<f64>,
    pub market_cap_below_millions: Option<f64>,
}

/// One raw match from the scanner, in scanner rank order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanItem {
    pub symbol: String,
    pub exchange: String,
    pub contract_id: i64,
    pub distance: Option<String>,
    pub benchmark: Option<String>,
    pub projection: Option<String>,
}

/// Market-data snapshot for one contract. Every field may be missing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QuoteSnapshot {
    pub contract_id: i64,
    pub last_price: Option<f64>,
    pub close_price: Option<f64>,
    pub volume: Option<i64>,
    /// Decimal fraction, e.g. 0.35 for 35%.
    pub implied_volatility: Option<f64>,
}

// ---------------------------------------------------------------------------
// Screen result
// ---------------------------------------------------------------------------

/// A normalized scanner match as produced by the executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenResult {
    pub symbol: String,
    /// 1-based, scanner order.
    pub rank: u32,
    pub contract_id: i64,
    pub exchange: String,
    pub distance: Option<String>,
    pub benchmark: Option<String>,
    pub projection: Option<String>,
    pub price: Option<f64>,
    pub volume: Option<i64>,
    /// Annualized implied volatility in percent.
    pub impl_volatility: Option<f64>,
}

impl ScreenResult {
    pub fn from_scan_item(item: ScanItem, rank: u32) -> Self {
        Self {
            symbol: item.symbol,
            rank,
            contract_id: item.contract_id,
            exchange: item.exchange,
            distance: item.distance,
            benchmark: item.benchmark,
            projection: item.projection,
            price: None,
            volume: None,
            impl_volatility: None,
        }
    }

    /// Last price wins; the close is used when no trade printed.
    pub fn apply_snapshot(&mut self, snap: &QuoteSnapshot) {
        self.price = snap
            .last_price
            .filter(|p| *p > 0.0)
            .or_else(|| snap.close_price.filter(|p| *p > 0.0));
        self.volume = snap.volume.filter(|v| *v > 0);
        self.impl_volatility = snap
            .implied_volatility
            .filter(|iv| *iv > 0.0)
            .map(|iv| iv * 100.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_round_trip_through_strings() {
        for bias in [Bias::Long, Bias::Short, Bias::Neutral] {
            assert_eq!(bias.to_string().parse::<Bias>().unwrap(), bias);
        }
        for style in [
            Style::Momentum,
            Style::MeanReversion,
            Style::Breakout,
            Style::Value,
            Style::Volatility,
            Style::Custom,
        ] {
            assert_eq!(style.to_string().parse::<Style>().unwrap(), style);
        }
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        assert!(matches!(
            "sideways".parse::<Bias>(),
            Err(AppError::UnknownVariant { kind: "bias", .. })
        ));
        assert!(matches!(
            "MOMENTUM".parse::<Style>(),
            Err(AppError::UnknownVariant { kind: "style", .. })
        ));
    }

    #[test]
    fn snapshot_falls_back_to_close_and_scales_iv() {
        let mut r = ScreenResult::from_scan_item(
            ScanItem {
                symbol: "AAPL".to_string(),
                exchange: "NASDAQ".to_string(),
                contract_id: 265598,
                ..Default::default()
            },
            1,
        );
        r.apply_snapshot(&QuoteSnapshot {
            contract_id: 265598,
            last_price: Some(0.0),
            close_price: Some(187.5),
            volume: Some(1_200_000),
            implied_volatility: Some(0.25),
        });
        assert_eq!(r.price, Some(187.5));
        assert_eq!(r.volume, Some(1_200_000));
        assert!((r.impl_volatility.unwrap() - 25.0).abs() < 1e-9);
    }
}
