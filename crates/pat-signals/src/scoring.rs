//! Individual signal evaluators.
//!
//! Each evaluator maps indicator state at the latest bar to a score in
//! [-1, +1] (−1 strong sell, 0 neutral, +1 strong buy) plus a description.
//! Evaluators never fail: missing history yields a neutral score whose note
//! says what was missing.

use pat_core::config::SignalWeights;
use pat_core::market::Ohlcv;
use serde::{Deserialize, Serialize};

use crate::indicators::{self, latest, previous};

/// Clamp to [-1, 1].
pub fn clamp_score(value: f64) -> f64 {
    if value.is_nan() {
        return 0.0;
    }
    value.clamp(-1.0, 1.0)
}

/// An evaluator's output.
#[derive(Debug, Clone, PartialEq)]
pub struct Score {
    pub value: f64,
    pub note: String,
}

impl Score {
    fn new(value: f64, note: impl Into<String>) -> Self {
        Self {
            value: clamp_score(value),
            note: note.into(),
        }
    }

    fn neutral(note: impl Into<String>) -> Self {
        Self::new(0.0, note)
    }
}

/// Inputs shared by every evaluator for one scan.
#[derive(Debug, Clone, Copy)]
pub struct ScoringInput<'a> {
    pub bars: &'a Ohlcv,
    /// Put/call ratio from the option chain, when one was supplied.
    pub put_call_ratio: Option<f64>,
}

/// The closed set of composite evaluators, in canonical order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evaluator {
    MaCrossover,
    Rsi,
    Macd,
    Bollinger,
    MeanReversion,
    Trend,
    Volume,
    Adx,
    Stochastic,
    AdLine,
    Cmf,
    PutCallRatio,
}

impl Evaluator {
    pub const ALL: [Evaluator; 12] = [
        Evaluator::MaCrossover,
        Evaluator::Rsi,
        Evaluator::Macd,
        Evaluator::Bollinger,
        Evaluator::MeanReversion,
        Evaluator::Trend,
        Evaluator::Volume,
        Evaluator::Adx,
        Evaluator::Stochastic,
        Evaluator::AdLine,
        Evaluator::Cmf,
        Evaluator::PutCallRatio,
    ];

    /// Stable wire name.
    pub fn name(self) -> &'static str {
        match self {
            Self::MaCrossover => "ma_crossover",
            Self::Rsi => "rsi",
            Self::Macd => "macd",
            Self::Bollinger => "bollinger",
            Self::MeanReversion => "mean_reversion",
            Self::Trend => "trend",
            Self::Volume => "volume",
            Self::Adx => "adx",
            Self::Stochastic => "stochastic",
            Self::AdLine => "ad_line",
            Self::Cmf => "cmf",
            Self::PutCallRatio => "put_call_ratio",
        }
    }

    /// Short human label.
    pub fn label(self) -> &'static str {
        match self {
            Self::MaCrossover => "SMA 20/50 crossover",
            Self::Rsi => "RSI (14) overbought/oversold",
            Self::Macd => "MACD histogram momentum",
            Self::Bollinger => "Bollinger Band %B position",
            Self::MeanReversion => "Z-score mean reversion",
            Self::Trend => "EMA 20/50/200 alignment",
            Self::Volume => "OBV trend confirmation",
            Self::Adx => "ADX trend strength",
            Self::Stochastic => "Stochastic %K/%D oscillator",
            Self::AdLine => "A/D line vs price trend",
            Self::Cmf => "Chaikin Money Flow pressure",
            Self::PutCallRatio => "Put/call ratio contrarian sentiment",
        }
    }

    /// Raw (pre-redistribution) weight from a weight table.
    pub fn weight(self, weights: &SignalWeights) -> f64 {
        match self {
            Self::MaCrossover => weights.ma_crossover,
            Self::Rsi => weights.rsi,
            Self::Macd => weights.macd,
            Self::Bollinger => weights.bollinger,
            Self::MeanReversion => weights.mean_reversion,
            Self::Trend => weights.trend,
            Self::Volume => weights.volume,
            Self::Adx => weights.adx,
            Self::Stochastic => weights.stochastic,
            Self::AdLine => weights.ad_line,
            Self::Cmf => weights.cmf,
            Self::PutCallRatio => weights.put_call_ratio,
        }
    }

    /// Whether the evaluator's data source exists for this scan. Only the
    /// put/call signal depends on data beyond the bars.
    pub fn is_available(self, input: &ScoringInput<'_>) -> bool {
        match self {
            Self::PutCallRatio => input.put_call_ratio.is_some_and(f64::is_finite),
            _ => true,
        }
    }

    /// Score the latest bar.
    pub fn score(self, input: &ScoringInput<'_>) -> Score {
        let bars = input.bars;
        let close = &bars.close;
        match self {
            Self::MaCrossover => score_ma_crossover(close),
            Self::Rsi => score_rsi(close),
            Self::Macd => score_macd(close),
            Self::Bollinger => score_bollinger(close),
            Self::MeanReversion => score_mean_reversion(close),
            Self::Trend => score_trend(close),
            Self::Volume => score_volume_trend(bars),
            Self::Adx => score_adx(bars),
            Self::Stochastic => score_stochastic(bars),
            Self::AdLine => score_ad_line(bars),
            Self::Cmf => score_cmf(bars),
            Self::PutCallRatio => score_put_call_ratio(input.put_call_ratio),
        }
    }
}

// --- Momentum ---

/// SMA 20/50 gap: a 2% gap scores ±1.
pub fn score_ma_crossover(close: &[f64]) -> Score {
    let (Some(fast), Some(slow)) = (
        latest(&indicators::sma(close, 20)),
        latest(&indicators::sma(close, 50)),
    ) else {
        return Score::neutral("insufficient history for SMA 50");
    };
    if slow == 0.0 {
        return Score::neutral("SMA 50 is zero");
    }
    let gap = (fast - slow) / slow;
    let side = if gap >= 0.0 { "above" } else { "below" };
    Score::new(
        gap / 0.02,
        format!("SMA 20 {:.2}% {side} SMA 50", gap.abs() * 100.0),
    )
}

/// RSI(14): below 30 buys, above 70 sells, linear inside each zone.
pub fn score_rsi(close: &[f64]) -> Score {
    let Some(value) = latest(&indicators::rsi(close, 14)) else {
        return Score::neutral("insufficient history for RSI 14");
    };
    if value < 30.0 {
        Score::new((30.0 - value) / 30.0, format!("RSI {value:.1} oversold"))
    } else if value > 70.0 {
        Score::new(-(value - 70.0) / 30.0, format!("RSI {value:.1} overbought"))
    } else {
        Score::neutral(format!("RSI {value:.1} neutral"))
    }
}

/// MACD histogram normalized by the stddev of the last 26 closes.
pub fn score_macd(close: &[f64]) -> Score {
    let Some(hist) = latest(&indicators::macd(close, 12, 26, 9).histogram) else {
        return Score::neutral("insufficient history for MACD 12/26/9");
    };
    let window = &close[close.len().saturating_sub(26)..];
    match indicators::sample_std(window) {
        Some(std) if std > 0.0 => {
            let tone = if hist > 0.0 { "bullish" } else { "bearish" };
            Score::new(hist / std, format!("MACD histogram {hist:+.3} ({tone})"))
        }
        _ => Score::neutral("flat prices, MACD undefined"),
    }
}

// --- Mean reversion ---

/// `1 - 2·%B`: lower band buys, upper band sells.
pub fn score_bollinger(close: &[f64]) -> Score {
    match latest(&indicators::bollinger(close, 20, 2.0).pct_b) {
        Some(pct_b) => Score::new(1.0 - 2.0 * pct_b, format!("%B {pct_b:.2}")),
        None => Score::neutral("Bollinger bands unavailable"),
    }
}

/// Z-score against SMA 20: `clamp(-z / 2)`, so |z| ≥ 2 is a full signal.
pub fn score_mean_reversion(close: &[f64]) -> Score {
    let (Some(mean), Some(std)) = (
        latest(&indicators::sma(close, 20)),
        latest(&indicators::rolling_std(close, 20)),
    ) else {
        return Score::neutral("insufficient history for 20-day z-score");
    };
    if std == 0.0 {
        return Score::neutral("zero volatility, z-score undefined");
    }
    let Some(price) = close.last() else {
        return Score::neutral("no prices");
    };
    let z = (price - mean) / std;
    Score::new(-z / 2.0, format!("z-score {z:+.2} vs SMA 20"))
}

// --- Trend ---

/// EMA 20/50/200 alignment plus price vs EMA 200.
pub fn score_trend(close: &[f64]) -> Score {
    let (Some(e20), Some(e50), Some(e200), Some(price)) = (
        latest(&indicators::ema(close, 20)),
        latest(&indicators::ema(close, 50)),
        latest(&indicators::ema(close, 200)),
        close.last().copied(),
    ) else {
        return Score::neutral("insufficient history for EMA 200");
    };
    let vote = |bullish: bool, weight: f64| if bullish { weight } else { -weight };
    let score = vote(e20 > e50, 0.33) + vote(e50 > e200, 0.33) + vote(price > e200, 0.34);
    let tone = if score > 0.0 { "bullish" } else { "bearish" };
    Score::new(score, format!("EMA alignment {tone} ({score:+.2})"))
}

// --- Volume ---

/// OBV deviation from its SMA 20 must agree with price vs SMA 20.
pub fn score_volume_trend(bars: &Ohlcv) -> Score {
    let obv = indicators::obv(bars);
    let (Some(obv_now), Some(obv_ma), Some(price_ma), Some(price)) = (
        latest(&obv),
        latest(&indicators::sma_opt(&obv, 20)),
        latest(&indicators::sma(&bars.close, 20)),
        bars.last_close(),
    ) else {
        return Score::neutral("insufficient history for OBV trend");
    };
    if obv_ma == 0.0 {
        return Score::neutral("OBV average is zero");
    }
    let deviation = (obv_now - obv_ma) / obv_ma.abs();
    let price_dir = if price > price_ma { 1.0 } else { -1.0 };
    if deviation * price_dir > 0.0 {
        Score::new(
            price_dir * deviation.abs().min(1.0),
            format!("OBV confirms price trend ({:+.1}%)", deviation * 100.0),
        )
    } else {
        Score::neutral("OBV diverges from price, no confirmation")
    }
}

// --- Trend strength ---

/// ADX below 20 is trendless. Above, strength maps 20→0.5 … 50→1.0, signed by DI.
pub fn score_adx(bars: &Ohlcv) -> Score {
    let a = indicators::adx(bars, 14);
    let (Some(adx), Some(plus), Some(minus)) =
        (latest(&a.adx), latest(&a.plus_di), latest(&a.minus_di))
    else {
        return Score::neutral("insufficient history for ADX 14");
    };
    if adx < 20.0 || plus == minus {
        return Score::neutral(format!("ADX {adx:.1}, no clear trend"));
    }
    let strength = ((adx - 20.0) / 30.0).clamp(0.0, 1.0) * 0.5 + 0.5;
    if plus > minus {
        Score::new(strength, format!("ADX {adx:.1}, +DI leads"))
    } else {
        Score::new(-strength, format!("ADX {adx:.1}, -DI leads"))
    }
}

/// %K below 20 buys, above 80 sells; a %K/%D cross adds ±0.3.
pub fn score_stochastic(bars: &Ohlcv) -> Score {
    let st = indicators::stochastic(bars, 14, 3);
    let (Some(k), Some(d)) = (latest(&st.k), latest(&st.d)) else {
        return Score::neutral("insufficient history for stochastic 14/3");
    };
    let mut score = if k <= 20.0 {
        (20.0 - k) / 20.0
    } else if k >= 80.0 {
        -(k - 80.0) / 20.0
    } else {
        0.0
    };
    let mut note = format!("%K {k:.1} / %D {d:.1}");
    if let (Some(prev_k), Some(prev_d)) = (previous(&st.k), previous(&st.d)) {
        if prev_k <= prev_d && k > d {
            score = clamp_score(score + 0.3);
            note.push_str(", bullish cross");
        } else if prev_k >= prev_d && k < d {
            score = clamp_score(score - 0.3);
            note.push_str(", bearish cross");
        }
    }
    Score::new(score, note)
}

/// A/D vs price, each against its SMA 20. Agreement is continuation (±0.5),
/// disagreement is a divergence pointing the A/D way (±0.7).
pub fn score_ad_line(bars: &Ohlcv) -> Score {
    let ad = indicators::accumulation_distribution(bars);
    let (Some(ad_now), Some(ad_ma), Some(price_ma), Some(price)) = (
        latest(&ad),
        latest(&indicators::sma_opt(&ad, 20)),
        latest(&indicators::sma(&bars.close, 20)),
        bars.last_close(),
    ) else {
        return Score::neutral("insufficient history for A/D trend");
    };
    match (ad_now > ad_ma, price > price_ma) {
        (true, true) => Score::new(0.5, "accumulation confirms rising price"),
        (false, false) => Score::new(-0.5, "distribution confirms falling price"),
        (true, false) => Score::new(0.7, "bullish divergence: accumulation into weakness"),
        (false, true) => Score::new(-0.7, "bearish divergence: distribution into strength"),
    }
}

/// CMF(20) scaled ×2.
pub fn score_cmf(bars: &Ohlcv) -> Score {
    match latest(&indicators::chaikin_money_flow(bars, 20)) {
        Some(cmf) => {
            let tone = if cmf >= 0.0 { "buying" } else { "selling" };
            Score::new(cmf * 2.0, format!("CMF {cmf:+.3} ({tone} pressure)"))
        }
        None => Score::neutral("insufficient history for CMF 20"),
    }
}

// --- Sentiment ---

/// Contrarian put/call: above 1.2 is fear (buy), below 0.5 complacency (sell).
pub fn score_put_call_ratio(ratio: Option<f64>) -> Score {
    let Some(ratio) = ratio.filter(|r| r.is_finite()) else {
        return Score::neutral("no option chain, put/call unavailable");
    };
    if ratio > 1.2 {
        Score::new((ratio - 1.2) / 0.8, format!("put/call {ratio:.2}, excessive fear"))
    } else if ratio < 0.5 {
        Score::new(-(0.5 - ratio) / 0.5, format!("put/call {ratio:.2}, complacency"))
    } else {
        Score::neutral(format!("put/call {ratio:.2} neutral"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use pat_core::market::PriceBar;

    fn bars(closes: &[f64]) -> Ohlcv {
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars: Vec<PriceBar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c * 1.01,
                low: c * 0.99,
                close: c,
                volume: 1_000_000.0,
            })
            .collect();
        Ohlcv::from_bars(&bars).unwrap()
    }

    fn uptrend(n: usize) -> Vec<f64> {
        (0..n).map(|i| 100.0 * 1.004f64.powi(i as i32)).collect()
    }

    #[test]
    fn test_every_evaluator_clamped_on_extreme_input() {
        let mut closes = uptrend(260);
        closes.push(1_000.0);
        let ohlcv = bars(&closes);
        let input = ScoringInput {
            bars: &ohlcv,
            put_call_ratio: Some(25.0),
        };
        for ev in Evaluator::ALL {
            let s = ev.score(&input);
            assert!(s.value.abs() <= 1.0, "{} out of range: {}", ev.name(), s.value);
        }
    }

    #[test]
    fn test_every_evaluator_neutral_on_empty_history() {
        let ohlcv = Ohlcv::default();
        let input = ScoringInput {
            bars: &ohlcv,
            put_call_ratio: None,
        };
        for ev in Evaluator::ALL {
            let s = ev.score(&input);
            assert_eq!(s.value, 0.0, "{} should be neutral", ev.name());
            assert!(!s.note.is_empty());
        }
    }

    #[test]
    fn test_weights_match_canonical_table() {
        let w = SignalWeights::default();
        let total: f64 = Evaluator::ALL.iter().map(|e| e.weight(&w)).sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert_eq!(Evaluator::Trend.weight(&w), 0.12);
        assert_eq!(Evaluator::PutCallRatio.weight(&w), 0.05);
    }

    #[test]
    fn test_ma_crossover_uptrend_is_bullish() {
        let s = score_ma_crossover(&uptrend(80));
        assert!(s.value > 0.0);
        assert!(s.note.contains("above"));
    }

    #[test]
    fn test_rsi_zones() {
        let falling: Vec<f64> = (0..30).map(|i| 100.0 - i as f64).collect();
        let s = score_rsi(&falling);
        assert!((s.value - 1.0).abs() < 1e-9, "RSI 0 → +1, got {}", s.value);
        let rising: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        assert!((score_rsi(&rising).value + 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_bollinger_mapping_midpoint() {
        // Symmetric oscillation ending at the window mean gives %B ≈ 0.5.
        let mut closes: Vec<f64> = (0..19)
            .map(|i| if i % 2 == 0 { 101.0 } else { 99.0 })
            .collect();
        closes.push(100.0);
        let s = score_bollinger(&closes);
        assert!(s.value.abs() < 0.05, "got {}", s.value);
    }

    #[test]
    fn test_mean_reversion_sells_spike() {
        let mut closes: Vec<f64> = (0..19).map(|i| 100.0 + (i % 3) as f64).collect();
        closes.push(130.0);
        let s = score_mean_reversion(&closes);
        assert_eq!(s.value, -1.0);
    }

    #[test]
    fn test_trend_full_alignment() {
        let s = score_trend(&uptrend(260));
        assert!((s.value - 1.0).abs() < 1e-12);
        let falling: Vec<f64> = uptrend(260).into_iter().rev().collect();
        assert!((score_trend(&falling).value + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_trend_short_history_neutral() {
        let s = score_trend(&uptrend(150));
        assert_eq!(s.value, 0.0);
        assert!(s.note.contains("EMA 200"));
    }

    #[test]
    fn test_adx_uptrend_positive() {
        let s = score_adx(&bars(&uptrend(80)));
        assert!(s.value >= 0.5, "got {}", s.value);
    }

    #[test]
    fn test_ad_line_divergence_values() {
        // Closing on the high with a falling SMA relationship is tested via
        // constructed bars: price below its mean while A/D rises.
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars: Vec<PriceBar> = (0..30)
            .map(|i| {
                let c = 100.0 - i as f64 * 0.5;
                PriceBar {
                    date: start + Duration::days(i),
                    open: c,
                    high: c + 1.0,
                    low: c - 1.0,
                    close: c + 1.0,
                    volume: 1_000.0,
                }
            })
            .collect();
        let ohlcv = Ohlcv::from_bars(&bars).unwrap();
        let s = score_ad_line(&ohlcv);
        assert_eq!(s.value, 0.7);
    }

    #[test]
    fn test_put_call_ratio_bands() {
        assert_eq!(score_put_call_ratio(Some(2.0)).value, 1.0);
        assert!((score_put_call_ratio(Some(1.6)).value - 0.5).abs() < 1e-12);
        assert_eq!(score_put_call_ratio(Some(0.8)).value, 0.0);
        assert!((score_put_call_ratio(Some(0.25)).value + 0.5).abs() < 1e-12);
        assert_eq!(score_put_call_ratio(None).value, 0.0);
    }

    #[test]
    fn test_put_call_availability() {
        let ohlcv = bars(&uptrend(10));
        let with = ScoringInput {
            bars: &ohlcv,
            put_call_ratio: Some(0.9),
        };
        let without = ScoringInput {
            bars: &ohlcv,
            put_call_ratio: None,
        };
        assert!(Evaluator::PutCallRatio.is_available(&with));
        assert!(!Evaluator::PutCallRatio.is_available(&without));
        assert!(Evaluator::Rsi.is_available(&without));
    }
}
