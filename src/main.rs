mod api;
mod config;
mod db;
mod error;
mod gateway;
mod report;
mod screener;
mod strategy;
mod timefmt;
mod types;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::api::{router, ApiState};
use crate::config::{Config, HISTORY_DAYS};
use crate::db::ScreenStore;
use crate::error::{AppError, Result};
use crate::gateway::GatewayClient;
use crate::screener::{record_outcome, ScreenExecutor, StrategyOutcome};
use crate::strategy::StrategyStore;
use crate::types::{Bias, Style};

#[derive(Parser, Debug)]
#[command(name = "falcon", about = "Strategy screener for the brokerage gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one strategy, or every enabled strategy when no name is given
    Run {
        name: Option<String>,
        /// Results kept per strategy (defaults to MAX_RESULTS)
        #[arg(long)]
        max_results: Option<usize>,
    },
    /// Manage the strategy library
    #[command(subcommand)]
    Strategies(StrategiesCommand),
    /// Query logged screen runs
    #[command(subcommand)]
    History(HistoryCommand),
    /// Backtest statistics for one strategy
    Stats {
        name: String,
        #[arg(long, default_value_t = HISTORY_DAYS)]
        days: i64,
    },
    /// Most frequently screened symbols
    TopSymbols {
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long, default_value_t = HISTORY_DAYS)]
        days: i64,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Record realized prices for a screen result
    Backfill {
        result_id: i64,
        #[arg(long = "price-1d")]
        price_1d: Option<f64>,
        #[arg(long = "price-1w")]
        price_1w: Option<f64>,
        #[arg(long = "price-1m")]
        price_1m: Option<f64>,
    },
    /// Set the screen-time price of a result that was logged without one
    SetPrice {
        result_id: i64,
        price: f64,
        #[arg(long)]
        volume: Option<i64>,
    },
    /// Delete screen runs older than the retention window
    Cleanup {
        /// Days to keep (defaults to RETENTION_DAYS)
        #[arg(long)]
        days: Option<i64>,
    },
    /// Serve the read-only query API
    Serve {
        /// Defaults to API_PORT
        #[arg(long)]
        port: Option<u16>,
    },
}

#[derive(Subcommand, Debug)]
enum StrategiesCommand {
    List {
        #[arg(long)]
        bias: Option<Bias>,
        #[arg(long)]
        style: Option<Style>,
        /// Include disabled strategies
        #[arg(long)]
        all: bool,
    },
    Show {
        name: String,
    },
    Tag {
        tag: String,
    },
    Enable {
        name: String,
    },
    Disable {
        name: String,
    },
    Delete {
        name: String,
    },
    Export {
        path: PathBuf,
    },
    Import {
        path: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Best success rate first
    Top {
        #[arg(long, default_value_t = 10)]
        limit: usize,
        #[arg(long, default_value_t = 1)]
        min_runs: u32,
    },
    /// Record the outcome of one pick; a positive return counts as a success
    RecordPick {
        name: String,
        #[arg(allow_negative_numbers = true)]
        return_pct: f64,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryCommand {
    Recent {
        #[arg(long)]
        strategy: Option<String>,
        #[arg(long, default_value_t = 20)]
        limit: i64,
    },
    /// Runs between two timestamps (or dates), inclusive
    Range {
        start: String,
        end: String,
        #[arg(long)]
        strategy: Option<String>,
    },
    Run {
        id: i64,
    },
    Symbol {
        symbol: String,
        #[arg(long, default_value_t = HISTORY_DAYS)]
        days: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = dispatch(cli.command, cfg).await {
        error!("{e}");
        std::process::exit(1);
    }
}

async fn dispatch(command: Command, cfg: Config) -> Result<()> {
    match command {
        Command::Run { name, max_results } => {
            run_strategies(&cfg, name, max_results.unwrap_or(cfg.max_results)).await
        }
        Command::Strategies(cmd) => manage_strategies(&cfg, cmd),
        Command::History(cmd) => {
            let store = open_screens(&cfg).await?;
            let res = query_history(&store, cmd).await;
            store.close().await;
            res
        }
        Command::Stats { name, days } => {
            let store = open_screens(&cfg).await?;
            let stats = store.strategy_statistics(&name, days).await?;
            print!("{}", report::statistics(&stats));
            store.close().await;
            Ok(())
        }
        Command::TopSymbols {
            strategy,
            days,
            limit,
        } => {
            let store = open_screens(&cfg).await?;
            let rows = store.top_symbols(strategy.as_deref(), days, limit).await?;
            print!("{}", report::top_symbols(&rows));
            store.close().await;
            Ok(())
        }
        Command::Backfill {
            result_id,
            price_1d,
            price_1w,
            price_1m,
        } => {
            let store = open_screens(&cfg).await?;
            if store
                .backfill_prices(result_id, price_1d, price_1w, price_1m)
                .await?
            {
                println!("Backfilled result {result_id}");
            } else {
                println!("Nothing written: result {result_id} has no screen-time price or no prices were given");
            }
            store.close().await;
            Ok(())
        }
        Command::SetPrice {
            result_id,
            price,
            volume,
        } => {
            let store = open_screens(&cfg).await?;
            store.record_screen_price(result_id, price, volume).await?;
            println!("Recorded screen price {price} for result {result_id}");
            store.close().await;
            Ok(())
        }
        Command::Cleanup { days } => {
            let store = open_screens(&cfg).await?;
            let days = days.unwrap_or(cfg.retention_days);
            let deleted = store.delete_runs_older_than(days).await?;
            println!("Deleted {deleted} run(s) older than {days} days");
            store.close().await;
            Ok(())
        }
        Command::Serve { port } => serve(&cfg, port.unwrap_or(cfg.api_port)).await,
    }
}

async fn open_screens(cfg: &Config) -> Result<ScreenStore> {
    ScreenStore::open(Path::new(&cfg.db_path)).await
}

// ---------------------------------------------------------------------------
// run
// ---------------------------------------------------------------------------

async fn run_strategies(cfg: &Config, name: Option<String>, max_results: usize) -> Result<()> {
    let mut library = StrategyStore::open(&cfg.strategy_dir)?;
    let screens = open_screens(cfg).await?;

    // Resolve the named strategy before touching the network.
    let named = name
        .map(|n| {
            library
                .get(&n)
                .cloned()
                .ok_or_else(|| AppError::not_found("strategy", n))
        })
        .transpose()?;

    let gateway = Arc::new(GatewayClient::new(cfg)?);
    gateway.connect().await?;
    if !cfg.is_paper_trading() {
        warn!("Connected in live trading mode");
    }
    let executor = ScreenExecutor::new(gateway.clone(), cfg.location_code.clone())?;

    let single = named.is_some();
    let outcomes = match named {
        // An explicitly named strategy runs even when disabled.
        Some(mut strategy) => {
            let outcome = executor.execute(&mut strategy, max_results).await;
            vec![StrategyOutcome { strategy, outcome }]
        }
        None => {
            let batch = library.list(None, None, true).into_iter().cloned().collect();
            executor
                .execute_all(batch, max_results, Duration::from_secs(cfg.strategy_delay_secs))
                .await
        }
    };

    let mut failures = 0usize;
    let mut save_error = None;
    for outcome in &outcomes {
        match &outcome.outcome {
            Ok(results) => print!("{}", report::screen_results(&outcome.strategy.name, results)),
            Err(e) => {
                failures += 1;
                println!("{}: failed: {e}", outcome.strategy.name);
            }
        }
        let recorded = record_outcome(&mut library, &screens, outcome).await?;
        if let Some(run_id) = recorded.run_id {
            info!(strategy = %outcome.strategy.name, run_id, "Run logged");
        }
        if let Err(e) = recorded.saved {
            println!("{}: performance not saved: {e}", outcome.strategy.name);
            save_error.get_or_insert(e);
        }
    }

    gateway.disconnect();
    screens.close().await;

    info!(
        "Executed {} strategies ({} failed)",
        outcomes.len(),
        failures
    );
    if single {
        if let Some(StrategyOutcome {
            outcome: Err(e), ..
        }) = outcomes.into_iter().next()
        {
            return Err(e);
        }
    }
    save_error.map_or(Ok(()), Err)
}

// ---------------------------------------------------------------------------
// strategies
// ---------------------------------------------------------------------------

fn manage_strategies(cfg: &Config, cmd: StrategiesCommand) -> Result<()> {
    let mut library = StrategyStore::open(&cfg.strategy_dir)?;

    match cmd {
        StrategiesCommand::List { bias, style, all } => {
            let shown = library.list(bias, style, !all);
            print!("{}", report::strategy_list(&shown));
            println!("{} of {} strategies shown", shown.len(), library.len());
        }
        StrategiesCommand::Show { name } => {
            let s = library
                .get(&name)
                .ok_or_else(|| AppError::not_found("strategy", &name))?;
            print!("{}", report::strategy_detail(s));
            if library.is_predefined(&name) {
                println!("  Built-in: can be disabled but not deleted");
            }
        }
        StrategiesCommand::Tag { tag } => {
            print!("{}", report::strategy_list(&library.tag_lookup(&tag)));
        }
        StrategiesCommand::Enable { name } => {
            library.set_enabled(&name, true)?;
            println!("Enabled {name}");
        }
        StrategiesCommand::Disable { name } => {
            library.set_enabled(&name, false)?;
            println!("Disabled {name}");
        }
        StrategiesCommand::Delete { name } => {
            library.delete(&name)?;
            println!("Deleted {name}");
        }
        StrategiesCommand::Export { path } => {
            let n = library.export(&path)?;
            println!("Exported {n} strategies to {}", path.display());
        }
        StrategiesCommand::Import { path, overwrite } => {
            let summary = library.import(&path, overwrite)?;
            println!(
                "Imported {} strategies ({} failed)",
                summary.imported, summary.failed
            );
        }
        StrategiesCommand::Top { limit, min_runs } => {
            let top = library.top_performing(limit, min_runs);
            for s in &top {
                println!(
                    "{:<24} {:>6.1}%  picks={} runs={}",
                    s.name,
                    s.performance.success_rate(),
                    s.performance.total_picks(),
                    s.performance.total_runs
                );
            }
            if top.is_empty() {
                println!("No strategies with at least {min_runs} run(s)");
            }
        }
        StrategiesCommand::RecordPick { name, return_pct } => {
            let mut s = library
                .get(&name)
                .cloned()
                .ok_or_else(|| AppError::not_found("strategy", &name))?;
            s.performance.record_result(return_pct > 0.0, return_pct);
            let rate = s.performance.success_rate();
            library.update(s)?;
            println!("Recorded pick for {name}: success rate now {rate:.1}%");
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// history
// ---------------------------------------------------------------------------

async fn query_history(store: &ScreenStore, cmd: HistoryCommand) -> Result<()> {
    match cmd {
        HistoryCommand::Recent { strategy, limit } => {
            let runs = store.list_recent_runs(strategy.as_deref(), limit).await?;
            print!("{}", report::runs(&runs));
        }
        HistoryCommand::Range {
            start,
            end,
            strategy,
        } => {
            let start = timefmt::iso(timefmt::parse_iso(&start)?);
            let end = timefmt::iso(timefmt::parse_iso(&end)?);
            let runs = store
                .list_runs_in_range(&start, &end, strategy.as_deref())
                .await?;
            print!("{}", report::runs(&runs));
        }
        HistoryCommand::Run { id } => {
            let run = store
                .read_run(id)
                .await?
                .ok_or_else(|| AppError::not_found("run", id))?;
            print!("{}", report::runs(std::slice::from_ref(&run)));
            print!("{}", report::stored_results(&store.read_results(id).await?));
        }
        HistoryCommand::Symbol { symbol, days } => {
            let symbol = symbol.to_uppercase();
            let rows = store.symbol_history(&symbol, days).await?;
            print!("{}", report::symbol_history(&symbol, &rows));
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// serve
// ---------------------------------------------------------------------------

async fn serve(cfg: &Config, port: u16) -> Result<()> {
    let store = open_screens(cfg).await?;
    let app = router(ApiState::new(store));

    let bind_addr = format!("0.0.0.0:{port}");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;
    Ok(())
}
