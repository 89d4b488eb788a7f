//! Plain-text tables for the command line.

use std::fmt::Write;

use crate::db::{ScreenRun, StoredResult, StrategyStatistics};
use crate::strategy::StrategyDefinition;
use crate::timefmt;
use crate::types::ScreenResult;

fn opt_f64(v: Option<f64>, decimals: usize) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:.decimals$}"))
}

fn opt_pct(v: Option<f64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| format!("{v:+.2}%"))
}

fn opt_int(v: Option<i64>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

/// Fresh results from an execution.
pub fn screen_results(strategy: &str, results: &[ScreenResult]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{strategy}: {} result(s)", results.len());
    if results.is_empty() {
        return out;
    }
    let _ = writeln!(
        out,
        "{:>4}  {:<8} {:<12} {:>10} {:>12} {:>8}  {}",
        "Rank", "Symbol", "Exchange", "Price", "Volume", "IV", "Scan data"
    );
    for r in results {
        let _ = writeln!(
            out,
            "{:>4}  {:<8} {:<12} {:>10} {:>12} {:>8}  {}",
            r.rank,
            r.symbol,
            r.exchange,
            opt_f64(r.price, 2),
            opt_int(r.volume),
            opt_f64(r.impl_volatility, 1),
            r.distance.as_deref().unwrap_or(""),
        );
    }
    out
}

pub fn runs(runs: &[ScreenRun]) -> String {
    if runs.is_empty() {
        return "No screen runs found.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6}  {:<26} {:<24} {:<20} {:>7}",
        "Run", "Executed at", "Strategy", "Scan code", "Results"
    );
    for r in runs {
        let _ = writeln!(
            out,
            "{:>6}  {:<26} {:<24} {:<20} {:>7}",
            r.id, r.executed_at, r.strategy_name, r.scan_code, r.result_count
        );
    }
    out
}

pub fn stored_results(results: &[StoredResult]) -> String {
    if results.is_empty() {
        return "No results.\n".to_string();
    }
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:>6} {:>4}  {:<8} {:>10} {:>9} {:>9} {:>9}",
        "Id", "Rank", "Symbol", "Screen px", "1d", "1w", "1m"
    );
    for r in results {
        let _ = writeln!(
            out,
            "{:>6} {:>4}  {:<8} {:>10} {:>9} {:>9} {:>9}",
            r.id,
            r.rank,
            r.symbol,
            opt_f64(r.price_at_screen, 2),
            opt_pct(r.return_1d),
            opt_pct(r.return_1w),
            opt_pct(r.return_1m),
        );
    }
    out
}

pub fn symbol_history(symbol: &str, rows: &[(ScreenRun, StoredResult)]) -> String {
    if rows.is_empty() {
        return format!("{symbol} has not appeared in any screen.\n");
    }
    let mut out = String::new();
    let _ = writeln!(out, "{symbol}: {} appearance(s)", rows.len());
    for (run, res) in rows {
        let _ = writeln!(
            out,
            "  {}  {:<24} rank {:>3}  1d {}",
            run.executed_at,
            run.strategy_name,
            res.rank,
            opt_pct(res.return_1d)
        );
    }
    out
}

pub fn top_symbols(rows: &[(String, i64)]) -> String {
    if rows.is_empty() {
        return "No symbols screened in this window.\n".to_string();
    }
    let mut out = String::new();
    for (i, (symbol, count)) in rows.iter().enumerate() {
        let _ = writeln!(out, "{:>3}. {:<8} {:>5}", i + 1, symbol, count);
    }
    out
}

pub fn statistics(stats: &StrategyStatistics) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Strategy '{}' (last {} days)",
        stats.strategy_name, stats.days_back
    );
    let _ = writeln!(
        out,
        "  Runs: {}  Results: {}  Avg per run: {:.1}",
        stats.total_runs, stats.total_results, stats.avg_results_per_run
    );
    if stats.total_with_backtest_data == 0 {
        let _ = writeln!(out, "  No backtest data yet.");
        return out;
    }
    let _ = writeln!(
        out,
        "  Backtested: {}  Winners: {}  Losers: {}  Win rate: {:.1}%",
        stats.total_with_backtest_data,
        stats.winners_1d,
        stats.losers_1d,
        stats.win_rate_1d()
    );
    let _ = writeln!(
        out,
        "  Avg return  1d {}  1w {}  1m {}",
        opt_pct(stats.avg_return_1d),
        opt_pct(stats.avg_return_1w),
        opt_pct(stats.avg_return_1m)
    );
    out
}

pub fn strategy_list(strategies: &[&StrategyDefinition]) -> String {
    if strategies.is_empty() {
        return "No strategies.\n".to_string();
    }
    let mut out = String::new();
    for s in strategies {
        let _ = writeln!(
            out,
            "{} {:<24} {:<8} {:<15} {:<20} runs={}",
            if s.enabled { "*" } else { " " },
            s.name,
            s.bias.to_string(),
            s.style.to_string(),
            s.scan_code,
            s.performance.total_runs
        );
    }
    out
}

pub fn strategy_detail(s: &StrategyDefinition) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}{}", s.name, if s.enabled { "" } else { " (disabled)" });
    if !s.description.is_empty() {
        let _ = writeln!(out, "  {}", s.description);
    }
    let _ = writeln!(out, "  Scan code: {}  Bias: {}  Style: {}", s.scan_code, s.bias, s.style);
    let _ = writeln!(out, "  Instrument: {}  Location: {}", s.instrument, s.location_code);

    let f = &s.filters;
    let bounds = [
        ("price", f.price_min, f.price_max),
        ("volume", f.volume_min.map(|v| v as f64), f.volume_max.map(|v| v as f64)),
        ("market cap", f.market_cap_min, f.market_cap_max),
        ("change %", f.price_change_min, f.price_change_max),
        ("volatility", f.volatility_min, f.volatility_max),
    ];
    for (label, lo, hi) in bounds {
        if lo.is_some() || hi.is_some() {
            let _ = writeln!(out, "  {label}: {} .. {}", opt_f64(lo, 2), opt_f64(hi, 2));
        }
    }
    if let Some(v) = f.avg_volume_min {
        let _ = writeln!(out, "  avg volume: >= {v}");
    }
    if !s.tags.is_empty() {
        let tags: Vec<&str> = s.tags.iter().map(String::as_str).collect();
        let _ = writeln!(out, "  Tags: {}", tags.join(", "));
    }

    let p = &s.performance;
    let _ = writeln!(
        out,
        "  Runs: {}  Last results: {}  Last run: {}",
        p.total_runs,
        p.last_result_count,
        p.last_run.map_or_else(|| "never".to_string(), timefmt::iso)
    );
    if p.total_picks() > 0 {
        let _ = writeln!(
            out,
            "  Picks: {} ({} ok)  Success: {:.1}%  Avg return: {:+.2}%",
            p.total_picks(),
            p.successful_picks,
            p.success_rate(),
            p.avg_return
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::predefined::predefined_strategies;

    #[test]
    fn empty_tables_say_so() {
        assert!(runs(&[]).contains("No screen runs"));
        assert!(top_symbols(&[]).contains("No symbols"));
        assert_eq!(screen_results("s", &[]), "s: 0 result(s)\n");
    }

    #[test]
    fn statistics_without_backtest_data() {
        let stats = StrategyStatistics {
            strategy_name: "s".into(),
            days_back: 30,
            total_runs: 2,
            total_results: 5,
            avg_results_per_run: 2.5,
            ..Default::default()
        };
        let text = statistics(&stats);
        assert!(text.contains("Runs: 2"));
        assert!(text.contains("No backtest data yet."));
    }

    #[test]
    fn detail_lists_only_set_bounds() {
        let short = predefined_strategies()
            .into_iter()
            .find(|s| s.name == "short_bias")
            .unwrap();
        let text = strategy_detail(&short);
        assert!(text.contains("price: 1.00 .. 30.00"));
        assert!(text.contains("market cap:"));
        assert!(!text.contains("volatility:"));
        assert!(text.contains("Last run: never"));
    }

    #[test]
    fn returns_are_signed_percentages() {
        assert_eq!(opt_pct(Some(5.0)), "+5.00%");
        assert_eq!(opt_pct(Some(-3.25)), "-3.25%");
        assert_eq!(opt_pct(None), "-");
    }
}
