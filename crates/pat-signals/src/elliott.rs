//! Elliott wave detection.
//!
//! Swing highs and lows come from an ATR-filtered zigzag. The most recent
//! pivots are matched against impulse (5-wave) and corrective (A-B-C)
//! templates, and impulse candidates are graded by Fibonacci ratio adherence.
//! The result feeds a standalone 3-signal composite (wave, RSI, MACD).

use chrono::NaiveDate;
use pat_core::config::{RiskConfig, SignalsConfig};
use pat_core::market::Ohlcv;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

use crate::indicators;
use crate::risk::compute_risk_context;
use crate::scoring::{clamp_score, score_macd, score_rsi};
use crate::signal::{Conviction, Direction, RiskContext, SignalScore};

/// Default swing threshold in multiples of the median ATR(14).
pub const ZIGZAG_ATR_MULTIPLE: f64 = 1.5;
/// Default number of trailing bars examined by [`detect_waves`].
pub const DEFAULT_LOOKBACK: usize = 200;

const MIN_ZIGZAG_BARS: usize = 20;
const MIN_WAVE_BARS: usize = 50;
const CORRECTIVE_CONFIDENCE: f64 = 0.4;
const MIN_SCORING_CONFIDENCE: f64 = 0.15;

const WAVE2_RETRACE: (f64, f64) = (0.382, 0.618);
const WAVE3_EXTENSION: (f64, f64) = (1.272, 2.618);
const WAVE4_RETRACE: (f64, f64) = (0.236, 0.500);
const WAVE5_EXTENSION: (f64, f64) = (0.618, 1.618);

const FIB_RATIOS: [f64; 7] = [0.236, 0.382, 0.500, 0.618, 0.786, 1.000, 1.618];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PivotType {
    High,
    Low,
}

/// A zigzag swing point, indexed into the analysed slice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub index: usize,
    pub price: f64,
    pub pivot_type: PivotType,
}

/// Detect alternating swing highs and lows.
///
/// A reversal is confirmed once price moves `atr_multiple` × median ATR(14)
/// against the running extreme. The final, still-forming extreme is appended
/// as the last pivot. Fewer than 20 bars yields no pivots.
pub fn zigzag_pivots(bars: &Ohlcv, atr_multiple: f64) -> Vec<Pivot> {
    let n = bars.len();
    if n < MIN_ZIGZAG_BARS {
        return Vec::new();
    }
    let mut atr_values: Vec<f64> = indicators::atr(bars, 14).into_iter().flatten().collect();
    let Some(median_atr) = median(&mut atr_values) else {
        return Vec::new();
    };
    let min_swing = median_atr * atr_multiple;

    let pivot = |index: usize, price: f64, pivot_type: PivotType| Pivot {
        index,
        price,
        pivot_type,
    };

    let mut pivots = Vec::new();
    // 0 = undecided, 1 = rising (tracking a high), -1 = falling (tracking a low)
    let mut direction = 0i8;
    let (mut hi_idx, mut hi) = (0, bars.high[0]);
    let (mut lo_idx, mut lo) = (0, bars.low[0]);

    for i in 1..n {
        let (h, l) = (bars.high[i], bars.low[i]);
        match direction {
            0 => {
                if h - lo >= min_swing {
                    pivots.push(pivot(lo_idx, lo, PivotType::Low));
                    direction = 1;
                    (hi_idx, hi) = (i, h);
                } else if hi - l >= min_swing {
                    pivots.push(pivot(hi_idx, hi, PivotType::High));
                    direction = -1;
                    (lo_idx, lo) = (i, l);
                } else {
                    if h > hi {
                        (hi_idx, hi) = (i, h);
                    }
                    if l < lo {
                        (lo_idx, lo) = (i, l);
                    }
                }
            }
            1 => {
                if h > hi {
                    (hi_idx, hi) = (i, h);
                } else if hi - l >= min_swing {
                    pivots.push(pivot(hi_idx, hi, PivotType::High));
                    direction = -1;
                    (lo_idx, lo) = (i, l);
                }
            }
            _ => {
                if l < lo {
                    (lo_idx, lo) = (i, l);
                } else if h - lo >= min_swing {
                    pivots.push(pivot(lo_idx, lo, PivotType::Low));
                    direction = 1;
                    (hi_idx, hi) = (i, h);
                }
            }
        }
    }

    match direction {
        1 => pivots.push(pivot(hi_idx, hi, PivotType::High)),
        -1 => pivots.push(pivot(lo_idx, lo, PivotType::Low)),
        _ => {}
    }
    pivots
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(f64::total_cmp);
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        Some((values[mid - 1] + values[mid]) / 2.0)
    } else {
        Some(values[mid])
    }
}

// --- Fibonacci validation ---

/// 1.0 inside `[low, high]`, decaying linearly by range widths outside it.
pub fn ratio_score(actual: f64, low: f64, high: f64) -> f64 {
    if (low..=high).contains(&actual) {
        return 1.0;
    }
    let width = high - low;
    if width <= 0.0 {
        return 0.0;
    }
    let miss = if actual < low {
        (low - actual) / width
    } else {
        (actual - high) / width
    };
    (1.0 - miss).max(0.0)
}

/// One checked wave ratio.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioCheck {
    pub name: String,
    pub actual: f64,
    pub score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FibValidation {
    /// Mean ratio score, 0–1.
    pub confidence: f64,
    pub details: Vec<RatioCheck>,
}

/// Grade six impulse pivots (start plus ends of waves 1–5).
pub fn validate_fibonacci_ratios(pivots: &[Pivot]) -> FibValidation {
    if pivots.len() < 6 {
        return FibValidation::default();
    }
    let p: Vec<f64> = pivots.iter().map(|pv| pv.price).collect();
    let wave1 = (p[1] - p[0]).abs();
    let wave2 = (p[2] - p[1]).abs();
    let wave3 = (p[3] - p[2]).abs();
    let wave4 = (p[4] - p[3]).abs();
    let wave5 = (p[5] - p[4]).abs();

    let mut details = Vec::new();
    let mut check = |name: &str, num: f64, den: f64, (lo, hi): (f64, f64)| {
        if den != 0.0 {
            let actual = num / den;
            details.push(RatioCheck {
                name: name.to_string(),
                actual,
                score: ratio_score(actual, lo, hi),
            });
        }
    };
    check("wave2_retrace", wave2, wave1, WAVE2_RETRACE);
    check("wave3_extension", wave3, wave1, WAVE3_EXTENSION);
    check("wave4_retrace", wave4, wave3, WAVE4_RETRACE);
    check("wave5_extension", wave5, wave1, WAVE5_EXTENSION);

    let confidence = if details.is_empty() {
        0.0
    } else {
        details.iter().map(|d| d.score).sum::<f64>() / details.len() as f64
    };
    FibValidation {
        confidence,
        details,
    }
}

// --- Pattern matching ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WavePattern {
    ImpulseUp,
    ImpulseDown,
    CorrectiveUp,
    CorrectiveDown,
    Unclear,
}

impl WavePattern {
    pub fn is_impulse(self) -> bool {
        matches!(self, Self::ImpulseUp | Self::ImpulseDown)
    }

    pub fn is_corrective(self) -> bool {
        matches!(self, Self::CorrectiveUp | Self::CorrectiveDown)
    }

    pub fn is_up(self) -> bool {
        matches!(self, Self::ImpulseUp | Self::CorrectiveUp)
    }
}

impl fmt::Display for WavePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ImpulseUp => "impulse_up",
            Self::ImpulseDown => "impulse_down",
            Self::CorrectiveUp => "corrective_up",
            Self::CorrectiveDown => "corrective_down",
            Self::Unclear => "unclear",
        };
        f.write_str(s)
    }
}

fn types_match(pivots: &[Pivot], first: PivotType) -> bool {
    pivots.iter().enumerate().all(|(i, p)| {
        let expected_first = i % 2 == 0;
        (p.pivot_type == first) == expected_first
    })
}

/// Low-high-low-high-low-high, wave 3 not the shortest, wave 4 above wave 1's top.
fn is_impulse_up(seg: &[Pivot]) -> bool {
    if seg.len() < 6 || !types_match(&seg[..6], PivotType::Low) {
        return false;
    }
    let w1 = seg[1].price - seg[0].price;
    let w3 = seg[3].price - seg[2].price;
    let w5 = seg[5].price - seg[4].price;
    !(w3 < w1 && w3 < w5) && seg[4].price >= seg[1].price
}

fn is_impulse_down(seg: &[Pivot]) -> bool {
    if seg.len() < 6 || !types_match(&seg[..6], PivotType::High) {
        return false;
    }
    let w1 = seg[0].price - seg[1].price;
    let w3 = seg[2].price - seg[3].price;
    let w5 = seg[4].price - seg[5].price;
    !(w3 < w1 && w3 < w5) && seg[4].price <= seg[1].price
}

fn is_corrective(seg: &[Pivot], first: PivotType) -> bool {
    seg.len() >= 4 && types_match(&seg[..4], first)
}

/// A pivot labelled with its wave and dated from the bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WavePivot {
    /// Index into the full bar sequence.
    pub index: usize,
    pub date: NaiveDate,
    pub price: f64,
    #[serde(rename = "type")]
    pub pivot_type: PivotType,
    pub wave_label: String,
}

/// Projected support/resistance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FibLevel {
    pub level: f64,
    pub ratio: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveAnalysis {
    pub pattern: WavePattern,
    /// "1"–"5" or "A"–"C".
    pub current_wave: String,
    /// 0–1.
    pub confidence: f64,
    pub wave_pivots: Vec<WavePivot>,
    pub fib_levels: Vec<FibLevel>,
}

impl WaveAnalysis {
    fn unclear() -> Self {
        Self {
            pattern: WavePattern::Unclear,
            current_wave: "1".into(),
            confidence: 0.0,
            wave_pivots: Vec::new(),
            fib_levels: Vec::new(),
        }
    }
}

fn current_wave(pattern: WavePattern, n_pivots: usize) -> &'static str {
    if pattern.is_impulse() {
        match n_pivots.min(6) {
            2 => "2",
            3 => "3",
            4 => "4",
            5 | 6 => "5",
            _ => "1",
        }
    } else if pattern.is_corrective() {
        match n_pivots.min(4) {
            2 => "B",
            3 | 4 => "C",
            _ => "A",
        }
    } else {
        "1"
    }
}

fn fib_levels(pivots: &[Pivot], pattern: WavePattern) -> Vec<FibLevel> {
    if pivots.len() < 2 {
        return Vec::new();
    }
    let hi = pivots.iter().map(|p| p.price).fold(f64::NEG_INFINITY, f64::max);
    let lo = pivots.iter().map(|p| p.price).fold(f64::INFINITY, f64::min);
    let range = hi - lo;
    if range <= 0.0 {
        return Vec::new();
    }
    FIB_RATIOS
        .iter()
        .map(|&ratio| {
            let (level, kind) = match (pattern.is_up(), ratio > 1.0) {
                (true, false) => (hi - ratio * range, "Retracement"),
                (true, true) => (hi + (ratio - 1.0) * range, "Extension"),
                (false, false) => (lo + ratio * range, "Retracement"),
                (false, true) => (lo - (ratio - 1.0) * range, "Extension"),
            };
            FibLevel {
                level,
                ratio,
                label: format!("{kind} {ratio:.3}"),
            }
        })
        .collect()
}

/// Detect the best-matching wave pattern over the last `lookback` bars.
///
/// Impulse templates are tried on the most recent six-pivot windows and
/// scored by Fibonacci adherence; corrective templates carry a flat 0.4
/// confidence and only win when no impulse grades higher. Fewer than 50
/// bars, or fewer than 4 pivots, is `Unclear`.
pub fn detect_waves(bars: &Ohlcv, lookback: usize) -> WaveAnalysis {
    let n = bars.len();
    if n < MIN_WAVE_BARS {
        return WaveAnalysis::unclear();
    }
    let start = n.saturating_sub(lookback);
    let window = bars.tail(lookback);
    let pivots = zigzag_pivots(&window, ZIGZAG_ATR_MULTIPLE);
    if pivots.len() < 4 {
        return WaveAnalysis::unclear();
    }

    let mut best = (WavePattern::Unclear, 0.0, &pivots[..0]);

    let np = pivots.len();
    for offset in np.saturating_sub(8)..np.saturating_sub(5) {
        let seg = &pivots[offset..offset + 6];
        let pattern = if is_impulse_up(seg) {
            WavePattern::ImpulseUp
        } else if is_impulse_down(seg) {
            WavePattern::ImpulseDown
        } else {
            continue;
        };
        let confidence = validate_fibonacci_ratios(seg).confidence;
        if confidence > best.1 {
            best = (pattern, confidence, seg);
        }
    }
    for offset in np.saturating_sub(6)..np.saturating_sub(3) {
        let seg = &pivots[offset..offset + 4];
        let pattern = if is_corrective(seg, PivotType::Low) {
            WavePattern::CorrectiveUp
        } else if is_corrective(seg, PivotType::High) {
            WavePattern::CorrectiveDown
        } else {
            continue;
        };
        if CORRECTIVE_CONFIDENCE > best.1 {
            best = (pattern, CORRECTIVE_CONFIDENCE, seg);
        }
    }

    let (pattern, confidence, seg) = best;
    let labels: &[&str] = if pattern.is_impulse() {
        &["start", "1", "2", "3", "4", "5"]
    } else {
        &["start", "A", "B", "C"]
    };
    let wave_pivots = seg
        .iter()
        .zip(labels)
        .map(|(p, label)| WavePivot {
            index: p.index + start,
            date: bars.dates[p.index + start],
            price: p.price,
            pivot_type: p.pivot_type,
            wave_label: (*label).to_string(),
        })
        .collect();

    debug!(
        "elliott: {} pivots, best pattern {pattern} at confidence {confidence:.3}",
        pivots.len()
    );

    WaveAnalysis {
        pattern,
        current_wave: current_wave(pattern, seg.len()).to_string(),
        confidence: confidence.min(1.0),
        wave_pivots,
        fib_levels: fib_levels(seg, pattern),
    }
}

/// Wave structure as a score in [-1, 1].
///
/// Impulses in waves 1/3 score 0.5–1.0 by confidence, waves 2/4 `0.3·c`,
/// wave 5 `0.2·c`; correctives `0.3·c`. Negated for downward patterns.
/// Confidence under 0.15 is neutral.
pub fn score_elliott_wave(analysis: &WaveAnalysis) -> f64 {
    let c = analysis.confidence;
    if analysis.pattern == WavePattern::Unclear || c < MIN_SCORING_CONFIDENCE {
        return 0.0;
    }
    let magnitude = if analysis.pattern.is_impulse() {
        match analysis.current_wave.as_str() {
            "1" | "3" => 0.5 + 0.5 * c,
            "2" | "4" => 0.3 * c,
            "5" => 0.2 * c,
            _ => 0.0,
        }
    } else {
        0.3 * c
    };
    let signed = if analysis.pattern.is_up() {
        magnitude
    } else {
        -magnitude
    };
    clamp_score(signed)
}

fn describe_wave(analysis: &WaveAnalysis) -> String {
    if analysis.pattern == WavePattern::Unclear {
        return "No clear wave structure detected".into();
    }
    let kind = if analysis.pattern.is_impulse() {
        "Impulse"
    } else {
        "Corrective"
    };
    let tone = if analysis.pattern.is_up() {
        "bullish"
    } else {
        "bearish"
    };
    format!(
        "{kind} {tone} pattern, currently in wave {}",
        analysis.current_wave
    )
}

/// Wave analysis combined with independent RSI and MACD signals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElliottResult {
    pub symbol: String,
    pub current_price: f64,
    pub wave_analysis: WaveAnalysis,
    pub signals: Vec<SignalScore>,
    /// Simple average of the three signal scores.
    pub composite_score: f64,
    pub direction: Direction,
    pub conviction: Conviction,
    pub risk: RiskContext,
}

/// Build the 3-signal Elliott composite for the latest bar.
/// Returns `None` for an empty bar sequence.
pub fn elliott_composite(
    symbol: &str,
    bars: &Ohlcv,
    signals_config: &SignalsConfig,
    risk_config: &RiskConfig,
) -> Option<ElliottResult> {
    let current_price = bars.last_close()?;
    let wave_analysis = detect_waves(bars, DEFAULT_LOOKBACK);
    let wave = score_elliott_wave(&wave_analysis);
    let rsi = score_rsi(&bars.close);
    let macd = score_macd(&bars.close);

    let signal = |name: &str, score: f64, description: String| SignalScore {
        name: name.to_string(),
        score,
        weight: 1.0 / 3.0,
        description,
    };
    let signals = vec![
        signal("elliott_wave", wave, describe_wave(&wave_analysis)),
        signal("rsi", rsi.value, rsi.note),
        signal("macd", macd.value, macd.note),
    ];

    let composite_score = clamp_score((wave + rsi.value + macd.value) / 3.0);
    let direction = Direction::from_score(
        composite_score,
        signals_config.buy_threshold,
        signals_config.sell_threshold,
    );
    let risk = compute_risk_context(bars, direction, composite_score, risk_config);

    Some(ElliottResult {
        symbol: symbol.to_string(),
        current_price,
        wave_analysis,
        signals,
        composite_score,
        direction,
        conviction: Conviction::from_score(composite_score),
        risk,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pat_core::market::PriceBar;

    const LEG: usize = 12;

    /// Piecewise-linear closes through `turns`, each leg `LEG` bars, range ±0.5.
    fn path(turns: &[f64]) -> Ohlcv {
        let mut closes = vec![turns[0]];
        for pair in turns.windows(2) {
            let step = (pair[1] - pair[0]) / LEG as f64;
            for k in 1..=LEG {
                closes.push(pair[0] + step * k as f64);
            }
        }
        let start = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        let bars: Vec<PriceBar> = closes
            .iter()
            .enumerate()
            .map(|(i, &c)| PriceBar {
                date: start + Duration::days(i as i64),
                open: c,
                high: c + 0.5,
                low: c - 0.5,
                close: c,
                volume: 10_000.0,
            })
            .collect();
        Ohlcv::from_bars(&bars).unwrap()
    }

    const IMPULSE: [f64; 6] = [100.0, 120.0, 110.0, 140.0, 131.0, 147.0];

    #[test]
    fn test_zigzag_alternates_and_finds_turns() {
        let bars = path(&IMPULSE);
        let pivots = zigzag_pivots(&bars, ZIGZAG_ATR_MULTIPLE);
        assert_eq!(pivots.len(), 6);
        for pair in pivots.windows(2) {
            assert_ne!(pair[0].pivot_type, pair[1].pivot_type);
        }
        let idx: Vec<usize> = pivots.iter().map(|p| p.index).collect();
        assert_eq!(idx, vec![0, 12, 24, 36, 48, 60]);
        assert!((pivots[1].price - 120.5).abs() < 1e-9);
        assert!((pivots[2].price - 109.5).abs() < 1e-9);
    }

    #[test]
    fn test_zigzag_short_series_empty() {
        let bars = path(&[100.0, 101.0]);
        assert!(zigzag_pivots(&bars, 1.5).is_empty());
    }

    #[test]
    fn test_ratio_score_decay() {
        assert_eq!(ratio_score(0.5, 0.382, 0.618), 1.0);
        let width = 0.618 - 0.382;
        assert!((ratio_score(0.618 + width / 2.0, 0.382, 0.618) - 0.5).abs() < 1e-9);
        assert_eq!(ratio_score(5.0, 0.382, 0.618), 0.0);
    }

    #[test]
    fn test_impulse_up_detected_with_full_confidence() {
        let bars = path(&IMPULSE);
        let analysis = detect_waves(&bars, DEFAULT_LOOKBACK);
        assert_eq!(analysis.pattern, WavePattern::ImpulseUp);
        assert_eq!(analysis.current_wave, "5");
        assert!((analysis.confidence - 1.0).abs() < 1e-12);
        let labels: Vec<&str> = analysis
            .wave_pivots
            .iter()
            .map(|p| p.wave_label.as_str())
            .collect();
        assert_eq!(labels, ["start", "1", "2", "3", "4", "5"]);
        assert_eq!(analysis.wave_pivots[3].date, bars.dates[36]);
        assert_eq!(analysis.fib_levels.len(), 7);

        let score = score_elliott_wave(&analysis);
        assert!((score - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_impulse_down_mirrors() {
        let mirrored: Vec<f64> = IMPULSE.iter().map(|p| 300.0 - p).collect();
        let analysis = detect_waves(&path(&mirrored), DEFAULT_LOOKBACK);
        assert_eq!(analysis.pattern, WavePattern::ImpulseDown);
        assert!(score_elliott_wave(&analysis) < 0.0);
    }

    #[test]
    fn test_overlapping_wave_four_is_corrective() {
        // Wave 4 dips below wave 1's top, so only A-B-C templates match.
        let turns = [100.0, 120.0, 110.0, 140.0, 115.0, 150.0];
        let analysis = detect_waves(&path(&turns), DEFAULT_LOOKBACK);
        assert!(analysis.pattern.is_corrective());
        assert_eq!(analysis.confidence, CORRECTIVE_CONFIDENCE);
        assert_eq!(analysis.wave_pivots.len(), 4);
        assert_eq!(analysis.wave_pivots[0].wave_label, "start");
    }

    #[test]
    fn test_short_history_unclear() {
        let analysis = detect_waves(&path(&[100.0, 110.0, 105.0]), DEFAULT_LOOKBACK);
        assert_eq!(analysis.pattern, WavePattern::Unclear);
        assert_eq!(score_elliott_wave(&analysis), 0.0);
    }

    #[test]
    fn test_fib_levels_up_pattern() {
        let pivots = [
            Pivot {
                index: 0,
                price: 100.0,
                pivot_type: PivotType::Low,
            },
            Pivot {
                index: 5,
                price: 200.0,
                pivot_type: PivotType::High,
            },
        ];
        let levels = fib_levels(&pivots, WavePattern::CorrectiveUp);
        assert!((levels[3].level - 138.2).abs() < 1e-9);
        assert!((levels[6].level - 261.8).abs() < 1e-9);
        assert!(levels[6].label.starts_with("Extension"));
    }

    #[test]
    fn test_composite_averages_three_signals() {
        let bars = path(&IMPULSE);
        let result =
            elliott_composite("TEST", &bars, &SignalsConfig::default(), &RiskConfig::default())
                .unwrap();
        assert_eq!(result.signals.len(), 3);
        let mean = result.signals.iter().map(|s| s.score).sum::<f64>() / 3.0;
        assert!((result.composite_score - mean).abs() < 1e-12);
        assert!((result.current_price - 147.0).abs() < 1e-9);
        let empty = elliott_composite(
            "X",
            &Ohlcv::default(),
            &SignalsConfig::default(),
            &RiskConfig::default(),
        );
        assert!(empty.is_none());
    }
}
