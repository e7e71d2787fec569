//! Rolling-window replay of the composite signal.
//!
//! For each day in the range the composite is computed on bars up to and
//! including that day only, then graded against the realized forward
//! returns at 1, 5, and 21 bars. Execution, slippage, and costs are not
//! modelled: a "signal return" is simply `composite_score × forward_return`.

use chrono::NaiveDate;
use pat_core::config::SignalsConfig;
use pat_core::market::Ohlcv;
use pat_core::PatError;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::composite::{aggregate, evaluate_all};
use crate::scoring::ScoringInput;
use crate::signal::{Conviction, Direction};

/// Minimum slice length before a day is scored.
pub const WARMUP_BARS: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Horizon {
    OneDay,
    FiveDay,
    TwentyOneDay,
}

impl Horizon {
    pub const ALL: [Horizon; 3] = [Horizon::OneDay, Horizon::FiveDay, Horizon::TwentyOneDay];

    pub fn bars(self) -> usize {
        match self {
            Self::OneDay => 1,
            Self::FiveDay => 5,
            Self::TwentyOneDay => 21,
        }
    }
}

/// One value per forward horizon.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PerHorizon<T> {
    #[serde(rename = "1d")]
    pub d1: T,
    #[serde(rename = "5d")]
    pub d5: T,
    #[serde(rename = "21d")]
    pub d21: T,
}

impl<T> PerHorizon<T> {
    pub fn get(&self, horizon: Horizon) -> &T {
        match horizon {
            Horizon::OneDay => &self.d1,
            Horizon::FiveDay => &self.d5,
            Horizon::TwentyOneDay => &self.d21,
        }
    }

    fn from_fn(mut f: impl FnMut(Horizon) -> T) -> Self {
        Self {
            d1: f(Horizon::OneDay),
            d5: f(Horizon::FiveDay),
            d21: f(Horizon::TwentyOneDay),
        }
    }
}

/// The composite on one replayed day and what happened next.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailySignal {
    pub date: NaiveDate,
    pub composite_score: f64,
    pub direction: Direction,
    pub conviction: Conviction,
    pub confidence: u8,
    /// Forward percentage returns; `None` past the end of the data.
    pub forward: PerHorizon<Option<f64>>,
    /// `composite_score × forward`.
    pub signal_return: PerHorizon<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HorizonMetrics {
    /// Percentage of scored days where the score sign matched the move.
    pub hit_rate: f64,
    pub avg_signal_return: f64,
    /// Gross gains over gross losses; `None` with no losing days.
    pub profit_factor: Option<f64>,
    pub total_signals: usize,
    pub wins: usize,
    pub losses: usize,
    /// Mean signal return of winning days.
    pub avg_win: Option<f64>,
    /// Mean absolute signal return of losing days.
    pub avg_loss: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConvictionBreakdown {
    pub conviction: Conviction,
    pub count: usize,
    pub hit_rate: PerHorizon<f64>,
    pub avg_return: PerHorizon<f64>,
}

/// Cumulative signal return per horizon at a date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquityPoint {
    pub date: NaiveDate,
    pub cumulative: PerHorizon<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_trading_days: usize,
    pub horizons: PerHorizon<HorizonMetrics>,
    pub conviction_breakdown: Vec<ConvictionBreakdown>,
    pub daily_signals: Vec<DailySignal>,
    pub equity_curve: Vec<EquityPoint>,
    pub max_drawdown: PerHorizon<f64>,
}

impl BacktestResult {
    /// Win rate and payoff ratio from the 21-bar horizon, for Kelly sizing.
    /// `None` without both winning and losing days.
    pub fn kelly_inputs(&self) -> Option<(f64, f64)> {
        let m = &self.horizons.d21;
        let decided = m.wins + m.losses;
        let (avg_win, avg_loss) = (m.avg_win?, m.avg_loss?);
        if decided == 0 || avg_loss == 0.0 {
            return None;
        }
        Some((m.wins as f64 / decided as f64, avg_win / avg_loss))
    }
}

/// Percentage return from `idx` to `idx + horizon`.
pub fn forward_return(close: &[f64], idx: usize, horizon: usize) -> Option<f64> {
    let current = *close.get(idx)?;
    let future = *close.get(idx + horizon)?;
    if current == 0.0 {
        return None;
    }
    Some((future - current) / current * 100.0)
}

fn same_sign(a: f64, b: f64) -> bool {
    (a > 0.0 && b > 0.0) || (a < 0.0 && b < 0.0)
}

/// Hit rate, average signal return, and profit factor over `(score, forward)` pairs.
pub fn horizon_metrics(pairs: &[(f64, f64)]) -> HorizonMetrics {
    if pairs.is_empty() {
        return HorizonMetrics::default();
    }
    let total = pairs.len();
    let signal_returns: Vec<f64> = pairs.iter().map(|(s, r)| s * r).collect();
    let gains: Vec<f64> = signal_returns.iter().copied().filter(|r| *r > 0.0).collect();
    let drops: Vec<f64> = signal_returns.iter().copied().filter(|r| *r < 0.0).collect();
    let hits = pairs.iter().filter(|(s, r)| same_sign(*s, *r)).count();

    let gross_gain: f64 = gains.iter().sum();
    let gross_loss: f64 = drops.iter().sum::<f64>().abs();
    let mean = |v: &[f64]| (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64);

    HorizonMetrics {
        hit_rate: hits as f64 / total as f64 * 100.0,
        avg_signal_return: signal_returns.iter().sum::<f64>() / total as f64,
        profit_factor: (gross_loss > 0.0).then(|| gross_gain / gross_loss),
        total_signals: total,
        wins: gains.len(),
        losses: drops.len(),
        avg_win: mean(gains.as_slice()),
        avg_loss: mean(drops.as_slice()).map(f64::abs),
    }
}

/// Largest peak-to-trough drop of a cumulative series.
pub fn max_drawdown(cumulative: &[f64]) -> f64 {
    let Some(&first) = cumulative.first() else {
        return 0.0;
    };
    let mut peak = first;
    let mut worst = 0.0f64;
    for &v in cumulative {
        peak = peak.max(v);
        worst = worst.max(peak - v);
    }
    worst
}

fn conviction_breakdown(days: &[DailySignal]) -> Vec<ConvictionBreakdown> {
    Conviction::ALL
        .iter()
        .map(|&conviction| {
            let group: Vec<&DailySignal> =
                days.iter().filter(|d| d.conviction == conviction).collect();
            let stats = |h: Horizon| {
                let valid: Vec<(f64, f64)> = group
                    .iter()
                    .filter_map(|d| Some((d.composite_score, (*d.forward.get(h))?)))
                    .collect();
                if valid.is_empty() {
                    return (0.0, 0.0);
                }
                let hits = valid.iter().filter(|(s, r)| same_sign(*s, *r)).count();
                let avg = valid.iter().map(|(s, r)| s * r).sum::<f64>() / valid.len() as f64;
                (hits as f64 / valid.len() as f64 * 100.0, avg)
            };
            ConvictionBreakdown {
                conviction,
                count: group.len(),
                hit_rate: PerHorizon::from_fn(|h| stats(h).0),
                avg_return: PerHorizon::from_fn(|h| stats(h).1),
            }
        })
        .collect()
}

/// Replay the composite over `bars` for every bar dated within `[start, end]`.
///
/// Put/call data is not replayed, so that evaluator is unavailable on every
/// day and its weight is redistributed as in a live scan without a chain.
pub fn run_backtest(
    symbol: &str,
    bars: &Ohlcv,
    start: NaiveDate,
    end: NaiveDate,
    config: &SignalsConfig,
) -> Result<BacktestResult, PatError> {
    if bars.is_empty() {
        return Err(PatError::invalid(format!("no price history for {symbol}")));
    }
    if start > end {
        return Err(PatError::invalid(format!(
            "backtest start {start} is after end {end}"
        )));
    }

    let mut daily_signals = Vec::new();
    for (idx, date) in bars.dates.iter().enumerate() {
        if *date < start || *date > end || idx + 1 < WARMUP_BARS {
            continue;
        }
        let slice = bars.head(idx + 1);
        let input = ScoringInput {
            bars: &slice,
            put_call_ratio: None,
        };
        let agg = aggregate(&evaluate_all(&input, config), config);

        let forward = PerHorizon::from_fn(|h| forward_return(&bars.close, idx, h.bars()));
        let signal_return =
            PerHorizon::from_fn(|h| forward.get(h).map(|r| agg.composite_score * r));
        daily_signals.push(DailySignal {
            date: *date,
            composite_score: agg.composite_score,
            direction: agg.direction,
            conviction: agg.conviction,
            confidence: agg.confidence,
            forward,
            signal_return,
        });
    }

    let horizons = PerHorizon::from_fn(|h| {
        let pairs: Vec<(f64, f64)> = daily_signals
            .iter()
            .filter_map(|d| Some((d.composite_score, (*d.forward.get(h))?)))
            .collect();
        horizon_metrics(&pairs)
    });

    let mut running = PerHorizon::<f64>::default();
    let equity_curve: Vec<EquityPoint> = daily_signals
        .iter()
        .map(|d| {
            running.d1 += d.signal_return.d1.unwrap_or(0.0);
            running.d5 += d.signal_return.d5.unwrap_or(0.0);
            running.d21 += d.signal_return.d21.unwrap_or(0.0);
            EquityPoint {
                date: d.date,
                cumulative: running,
            }
        })
        .collect();

    let max_drawdown = PerHorizon::from_fn(|h| {
        let series: Vec<f64> = equity_curve.iter().map(|e| *e.cumulative.get(h)).collect();
        max_drawdown(&series)
    });

    info!(
        "backtest {symbol}: {} days scored, 21d hit rate {:.1}%",
        daily_signals.len(),
        horizons.d21.hit_rate
    );

    Ok(BacktestResult {
        symbol: symbol.to_string(),
        start_date: start,
        end_date: end,
        total_trading_days: daily_signals.len(),
        horizons,
        conviction_breakdown: conviction_breakdown(&daily_signals),
        daily_signals,
        equity_curve,
        max_drawdown,
    })
}
