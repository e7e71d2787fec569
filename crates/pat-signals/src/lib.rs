//! # pat-signals
//!
//! Signal side of PAT: the technical indicator library, twelve independent
//! signal evaluators, weighted composite aggregation, ATR/Kelly risk context,
//! the Elliott wave analyzer, and a no-lookahead backtest replay.
//!
//! Everything here is a pure computation over supplied bars; nothing holds
//! shared mutable state, so scans for different symbols can run concurrently.

pub mod backtest;
pub mod composite;
pub mod elliott;
pub mod indicators;
pub mod kelly;
pub mod risk;
pub mod scoring;
pub mod signal;

use chrono::NaiveDate;
use pat_core::config::{RiskConfig, SignalsConfig};
use pat_core::market::{normalize_symbol, Ohlcv, PriceBar};
use pat_core::PatError;
use tracing::debug;

use backtest::BacktestResult;
use elliott::ElliottResult;
use scoring::ScoringInput;
use signal::{CompositeResult, Direction};

/// Orchestrates scoring, aggregation, and risk context for one configuration.
#[derive(Debug, Clone, Default)]
pub struct SignalEngine {
    signals: SignalsConfig,
    risk: RiskConfig,
}

impl SignalEngine {
    pub fn new(signals: SignalsConfig, risk: RiskConfig) -> Self {
        Self { signals, risk }
    }

    pub fn signals_config(&self) -> &SignalsConfig {
        &self.signals
    }

    pub fn risk_config(&self) -> &RiskConfig {
        &self.risk
    }

    /// Use a backtest's realized win rate and payoff for Kelly sizing.
    pub fn with_kelly_inputs(mut self, win_rate: f64, payoff_ratio: f64) -> Self {
        self.risk.win_rate = Some(win_rate);
        self.risk.payoff_ratio = Some(payoff_ratio);
        self
    }

    /// Full composite scan of the latest bar.
    ///
    /// `put_call_ratio` is `None` when no option chain is available; that
    /// evaluator is then dropped and its weight redistributed.
    pub fn scan(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        put_call_ratio: Option<f64>,
    ) -> Result<CompositeResult, PatError> {
        let symbol = normalize_symbol(symbol)?;
        let ohlcv = Ohlcv::from_bars(bars)?;
        let Some(current_price) = ohlcv.last_close() else {
            return Err(PatError::invalid(format!("no price history for {symbol}")));
        };

        let input = ScoringInput {
            bars: &ohlcv,
            put_call_ratio,
        };
        let raw = composite::evaluate_all(&input, &self.signals);
        let agg = composite::aggregate(&raw, &self.signals);
        let risk = risk::compute_risk_context(
            &ohlcv,
            agg.direction,
            agg.composite_score,
            &self.risk,
        );
        debug!(
            "scan {symbol}: {} bars, score {:+.3}, {}",
            ohlcv.len(),
            agg.composite_score,
            agg.direction
        );

        Ok(CompositeResult {
            symbol,
            current_price,
            direction: agg.direction,
            conviction: agg.conviction,
            composite_score: agg.composite_score,
            confidence: agg.confidence,
            signals: agg.signals,
            risk,
        })
    }

    /// Elliott wave analysis plus its 3-signal composite.
    pub fn elliott(&self, symbol: &str, bars: &[PriceBar]) -> Result<ElliottResult, PatError> {
        let symbol = normalize_symbol(symbol)?;
        let ohlcv = Ohlcv::from_bars(bars)?;
        elliott::elliott_composite(&symbol, &ohlcv, &self.signals, &self.risk)
            .ok_or_else(|| PatError::invalid(format!("no price history for {symbol}")))
    }

    /// Replay the composite over `[start, end]`. Either bound defaults to the
    /// corresponding end of the supplied history.
    pub fn backtest(
        &self,
        symbol: &str,
        bars: &[PriceBar],
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Result<BacktestResult, PatError> {
        let symbol = normalize_symbol(symbol)?;
        let ohlcv = Ohlcv::from_bars(bars)?;
        let (Some(&first), Some(&last)) = (ohlcv.dates.first(), ohlcv.dates.last()) else {
            return Err(PatError::invalid(format!("no price history for {symbol}")));
        };
        backtest::run_backtest(
            &symbol,
            &ohlcv,
            start.unwrap_or(first),
            end.unwrap_or(last),
            &self.signals,
        )
    }

    /// Format a result as a human-readable advisory block.
    pub fn format_result(result: &CompositeResult) -> String {
        let fmt_opt = |v: Option<f64>, prefix: &str| match v {
            Some(x) => format!("{prefix}{x:.2}"),
            None => "N/A".to_string(),
        };
        let lean = match result.direction {
            Direction::Buy => "bullish",
            Direction::Sell => "bearish",
            Direction::Hold => "neutral",
        };
        let mut lines = vec![
            "[SIGNAL ADVISORY | NOT INVESTMENT ADVICE]".to_string(),
            format!(
                "Symbol: {} | Price: ${:.2}",
                result.symbol, result.current_price
            ),
            format!(
                "Direction: {} ({lean}) | Conviction: {} | Score: {:+.3} | Confidence: {}%",
                result.direction, result.conviction, result.composite_score, result.confidence
            ),
            format!(
                "Stop: {} | Target: {} | R/R: {} | Size: {} shares ({})",
                fmt_opt(result.risk.stop_loss, "$"),
                fmt_opt(result.risk.target_price, "$"),
                fmt_opt(result.risk.risk_reward, ""),
                result
                    .risk
                    .position_size
                    .map_or_else(|| "N/A".to_string(), |s| format!("{s:.0}")),
                result
                    .risk
                    .position_pct
                    .map_or_else(|| "N/A".to_string(), |p| format!("{:.1}%", p * 100.0)),
            ),
        ];
        for s in &result.signals {
            lines.push(format!(
                "  {:<15} {:+.2} (w {:.3}) {}",
                s.name, s.score, s.weight, s.description
            ));
        }
        lines.push("[END SIGNAL ADVISORY]".to_string());
        lines.join("\n")
    }
}
