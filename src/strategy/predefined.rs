use super::{ScreenFilters, StrategyDefinition};
use crate::types::{Bias, Style};

/// Names of the built-in strategies. These can be disabled but never deleted.
pub const PREDEFINED_NAMES: &[&str] = &[
    "momentum_long",
    "short_bias",
    "high_volume_breakout",
    "high_volatility",
];

pub fn is_predefined(name: &str) -> bool {
    PREDEFINED_NAMES.contains(&name)
}

/// Fresh copies of every built-in strategy.
pub fn predefined_strategies() -> Vec<StrategyDefinition> {
    vec![
        StrategyDefinition {
            filters: ScreenFilters {
                price_min: Some(2.0),
                price_max: Some(20.0),
                volume_min: Some(500_000),
                ..Default::default()
            },
            bias: Bias::Long,
            style: Style::Momentum,
            tags: tags(&["momentum", "long", "gainers", "small_cap", "day_trading"]),
            ..StrategyDefinition::new(
                "momentum_long",
                "Low float, high volume % gainers in the $2-$20 range",
                "TOP_PERC_GAIN",
            )
        },
        StrategyDefinition {
            filters: ScreenFilters {
                price_min: Some(1.0),
                price_max: Some(30.0),
                volume_min: Some(2_000_000),
                market_cap_min: Some(5_000_000.0),
                market_cap_max: Some(300_000_000.0),
                ..Default::default()
            },
            bias: Bias::Short,
            style: Style::MeanReversion,
            tags: tags(&["short", "overextended", "parabolic", "fade"]),
            ..StrategyDefinition::new(
                "short_bias",
                "Overextended parabolic small-cap gainers due for a pullback",
                "TOP_PERC_GAIN",
            )
        },
        StrategyDefinition {
            filters: ScreenFilters {
                price_min: Some(10.0),
                price_max: Some(200.0),
                volume_min: Some(2_000_000),
                ..Default::default()
            },
            bias: Bias::Long,
            style: Style::Breakout,
            tags: tags(&["breakout", "volume", "long"]),
            ..StrategyDefinition::new(
                "high_volume_breakout",
                "Breakout candidates with unusual volume",
                "HOT_BY_VOLUME",
            )
        },
        StrategyDefinition {
            filters: ScreenFilters {
                price_min: Some(5.0),
                price_max: Some(500.0),
                volume_min: Some(500_000),
                ..Default::default()
            },
            bias: Bias::Neutral,
            style: Style::Volatility,
            tags: tags(&["volatility", "options"]),
            ..StrategyDefinition::new(
                "high_volatility",
                "High option implied volatility, potential for big moves",
                "HIGH_OPT_IMP_VOLAT",
            )
        },
    ]
}

fn tags(values: &[&str]) -> std::collections::BTreeSet<String> {
    values.iter().map(|t| t.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_match_definitions() {
        let names: Vec<String> = predefined_strategies().into_iter().map(|s| s.name).collect();
        assert_eq!(names, PREDEFINED_NAMES);
        assert!(is_predefined("short_bias"));
        assert!(!is_predefined("my_custom"));
    }
}
