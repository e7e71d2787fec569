mod data;

use anyhow::Context as _;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use data::FileMarketData;
use pat_analyzer::greeks::{implied_volatility, BlackScholes};
use pat_analyzer::metrics::align_returns;
use pat_core::config;
use pat_core::market::{Ohlcv, OptionType};
use pat_core::traits::MarketDataSource;
use pat_signals::signal::CompositeResult;
use pat_signals::SignalEngine;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter};

#[derive(Parser)]
#[command(
    name = "pat",
    version,
    about = "PAT: risk-adjusted trading signals, options analytics, portfolio optimization"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite signal scan, one result per symbol.
    Scan {
        #[arg(required = true)]
        symbols: Vec<String>,
        /// Print the advisory text block instead of JSON.
        #[arg(long)]
        text: bool,
    },
    /// Elliott wave analysis with its 3-signal composite.
    Elliott { symbol: String },
    /// IV rank/percentile, skew, term structure, put/call ratio.
    Options {
        symbol: String,
        /// Valuation date (defaults to today).
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Deep in-the-money long-dated contracts and roll advice.
    Leaps {
        symbol: String,
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Black-Scholes price and Greeks for one contract.
    Greeks {
        #[arg(long)]
        spot: f64,
        #[arg(long)]
        strike: f64,
        /// Calendar days to expiry.
        #[arg(long)]
        days: f64,
        /// Annualized volatility, e.g. 0.25.
        #[arg(long)]
        vol: f64,
        #[arg(long)]
        put: bool,
    },
    /// Implied volatility from a market price.
    Iv {
        #[arg(long)]
        price: f64,
        #[arg(long)]
        spot: f64,
        #[arg(long)]
        strike: f64,
        #[arg(long)]
        days: f64,
        #[arg(long)]
        put: bool,
    },
    /// Monte Carlo portfolio optimization over aligned daily returns.
    Optimize {
        #[arg(required = true)]
        symbols: Vec<String>,
        /// Override the configured sampler seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Replay the composite signal over history.
    Backtest {
        symbol: String,
        #[arg(long)]
        start: Option<NaiveDate>,
        #[arg(long)]
        end: Option<NaiveDate>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise start at info and switch to the configured
    // level once the config is loaded.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let from_env = env_filter.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(env_filter.unwrap_or_else(|| EnvFilter::new("info")));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();

    let cfg = config::load(&cli.config)?;
    if !from_env {
        filter_handle.modify(|f| *f = EnvFilter::new(&cfg.pat.log_level))?;
    }

    let source = Arc::new(FileMarketData::new(config::shellexpand(&cfg.pat.data_dir)));
    info!("pat: data source '{}' at {}", source.name(), cfg.pat.data_dir);
    let engine = Arc::new(SignalEngine::new(cfg.signals.clone(), cfg.risk.clone()));

    match cli.command {
        Commands::Scan { symbols, text } => {
            let requested = symbols.len();
            let results = scan_all(&source, &engine, symbols).await;
            if results.is_empty() {
                anyhow::bail!("scan failed for all {requested} symbols");
            }
            if text {
                for r in &results {
                    println!("{}\n", SignalEngine::format_result(r));
                }
            } else {
                print_json(&results)?;
            }
        }
        Commands::Elliott { symbol } => {
            let bars = source.price_history(&symbol).await?;
            print_json(&engine.elliott(&symbol, &bars)?)?;
        }
        Commands::Options { symbol, as_of } => {
            let spot = spot_price(source.as_ref(), &symbol).await?;
            let chains = source.option_chains(&symbol).await?;
            let iv_history = source.iv_history(&symbol).await?;
            let analysis = pat_analyzer::analyze_options(
                &symbol,
                spot,
                &chains,
                &iv_history,
                as_of.unwrap_or_else(today),
                &cfg.options,
            )?;
            print_json(&analysis)?;
        }
        Commands::Leaps { symbol, as_of } => {
            let spot = spot_price(source.as_ref(), &symbol).await?;
            let chains = source.option_chains(&symbol).await?;
            if chains.is_empty() {
                anyhow::bail!("no option chains for {symbol}");
            }
            let analysis = pat_analyzer::analyze_leaps(
                &symbol,
                spot,
                &chains,
                as_of.unwrap_or_else(today),
                &cfg.options,
            )?;
            print_json(&analysis)?;
        }
        Commands::Greeks {
            spot,
            strike,
            days,
            vol,
            put,
        } => {
            let model = BlackScholes::new(
                spot,
                strike,
                days / 365.0,
                cfg.options.risk_free_rate,
                cfg.options.dividend_yield,
                vol,
            )?;
            print_json(&model.greeks(option_type(put)))?;
        }
        Commands::Iv {
            price,
            spot,
            strike,
            days,
            put,
        } => {
            let iv = implied_volatility(
                price,
                spot,
                strike,
                days / 365.0,
                cfg.options.risk_free_rate,
                cfg.options.dividend_yield,
                option_type(put),
            )?;
            print_json(&serde_json::json!({ "implied_volatility": iv }))?;
        }
        Commands::Optimize { symbols, seed } => {
            let mut histories = Vec::with_capacity(symbols.len());
            for symbol in &symbols {
                let normalized = pat_core::market::normalize_symbol(symbol)?;
                let bars = source.price_history(&normalized).await?;
                histories.push((normalized, bars));
            }
            let matrix = align_returns(&histories)?;
            let mut opt = cfg.optimizer.clone();
            opt.seed = seed.or(opt.seed);
            let result =
                tokio::task::spawn_blocking(move || pat_analyzer::optimize_portfolio(&matrix, &opt))
                    .await??;
            print_json(&result)?;
        }
        Commands::Backtest { symbol, start, end } => {
            let bars = source.price_history(&symbol).await?;
            print_json(&engine.backtest(&symbol, &bars, start, end)?)?;
        }
    }

    Ok(())
}

/// Scan every symbol concurrently. Failed symbols are logged and left out.
async fn scan_all(
    source: &Arc<FileMarketData>,
    engine: &Arc<SignalEngine>,
    symbols: Vec<String>,
) -> Vec<CompositeResult> {
    let mut handles = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let source = Arc::clone(source);
        let engine = Arc::clone(engine);
        let task = tokio::spawn(scan_symbol(source, engine, symbol.clone()));
        handles.push((symbol, task));
    }
    let mut results = Vec::with_capacity(handles.len());
    for (symbol, handle) in handles {
        match handle.await {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => warn!("scan {symbol}: skipped: {e:#}"),
            Err(e) => warn!("scan {symbol}: task failed: {e}"),
        }
    }
    results
}

/// Fetch one symbol's data and score it on the blocking pool.
async fn scan_symbol(
    source: Arc<FileMarketData>,
    engine: Arc<SignalEngine>,
    symbol: String,
) -> anyhow::Result<CompositeResult> {
    let bars = source
        .price_history(&symbol)
        .await
        .with_context(|| format!("loading bars for {symbol}"))?;
    let put_call = match source.option_chains(&symbol).await {
        Ok(chains) => pat_analyzer::put_call_ratio(&chains),
        Err(e) => {
            warn!("scan {symbol}: option chains unavailable: {e}");
            None
        }
    };
    let result =
        tokio::task::spawn_blocking(move || engine.scan(&symbol, &bars, put_call)).await??;
    Ok(result)
}

async fn spot_price(source: &dyn MarketDataSource, symbol: &str) -> anyhow::Result<f64> {
    let bars = source.price_history(symbol).await?;
    Ohlcv::from_bars(&bars)?
        .last_close()
        .with_context(|| format!("no price history for {symbol}"))
}

fn option_type(put: bool) -> OptionType {
    if put {
        OptionType::Put
    } else {
        OptionType::Call
    }
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
