//! Weighted aggregation of evaluator scores.

use pat_core::config::SignalsConfig;
use tracing::debug;

use crate::scoring::{clamp_score, Evaluator, ScoringInput};
use crate::signal::{Conviction, Direction, SignalScore};

/// One evaluator's raw output before aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSignal {
    pub name: String,
    pub score: f64,
    /// Pre-redistribution weight from the weight table.
    pub weight: f64,
    pub available: bool,
    pub description: String,
}

/// Aggregated score plus the signals with their effective weights.
#[derive(Debug, Clone)]
pub struct Aggregate {
    pub composite_score: f64,
    pub direction: Direction,
    pub conviction: Conviction,
    pub confidence: u8,
    pub signals: Vec<SignalScore>,
}

/// Run every evaluator against the input, in canonical order.
pub fn evaluate_all(input: &ScoringInput<'_>, config: &SignalsConfig) -> Vec<RawSignal> {
    Evaluator::ALL
        .iter()
        .map(|&ev| {
            let available = ev.is_available(input);
            let (score, description) = if available {
                let s = ev.score(input);
                (s.value, s.note)
            } else {
                (0.0, "unavailable".to_string())
            };
            RawSignal {
                name: ev.name().to_string(),
                score,
                weight: ev.weight(&config.weights),
                available,
                description,
            }
        })
        .collect()
}

/// Combine raw signals into a composite.
///
/// Unavailable signals keep their slot with weight 0; the remaining weights
/// are renormalized to sum to 1. With nothing available (or zero total
/// weight) the composite is a neutral HOLD with confidence 0.
pub fn aggregate(raw: &[RawSignal], config: &SignalsConfig) -> Aggregate {
    let available_total: f64 = raw
        .iter()
        .filter(|s| s.available)
        .map(|s| s.weight.max(0.0))
        .sum();
    let dropped: Vec<&str> = raw
        .iter()
        .filter(|s| !s.available)
        .map(|s| s.name.as_str())
        .collect();
    if !dropped.is_empty() {
        debug!(
            "composite: redistributing weight of {dropped:?} across {} signals",
            raw.len() - dropped.len()
        );
    }

    let signals: Vec<SignalScore> = raw
        .iter()
        .map(|s| {
            let weight = if s.available && available_total > 0.0 {
                s.weight.max(0.0) / available_total
            } else {
                0.0
            };
            SignalScore {
                name: s.name.clone(),
                score: clamp_score(s.score),
                weight,
                description: s.description.clone(),
            }
        })
        .collect();

    let composite_score = clamp_score(signals.iter().map(|s| s.score * s.weight).sum());
    let direction =
        Direction::from_score(composite_score, config.buy_threshold, config.sell_threshold);
    let conviction = Conviction::from_score(composite_score);

    let available_count = raw.iter().filter(|s| s.available).count();
    let confidence = confidence(
        composite_score,
        raw.iter()
            .filter(|s| s.available)
            .map(|s| clamp_score(s.score)),
        available_count,
        config.neutral_band,
    );

    Aggregate {
        composite_score,
        direction,
        conviction,
        confidence,
        signals,
    }
}

/// `70 · alignment + 30 · quality`, floored and capped at 100.
///
/// A signal is neutral when `|score| <= neutral_band`. Alignment is the share
/// of non-neutral signals whose sign matches the composite (0 for a zero
/// composite). Quality is the share of available signals that are non-neutral.
pub fn confidence(
    composite_score: f64,
    scores: impl Iterator<Item = f64>,
    available_count: usize,
    neutral_band: f64,
) -> u8 {
    if available_count == 0 {
        return 0;
    }
    let active: Vec<f64> = scores.filter(|s| s.abs() > neutral_band).collect();
    if active.is_empty() {
        return 0;
    }
    let agreeing = if composite_score > 0.0 {
        active.iter().filter(|s| **s > 0.0).count()
    } else if composite_score < 0.0 {
        active.iter().filter(|s| **s < 0.0).count()
    } else {
        0
    };
    let alignment = agreeing as f64 / active.len() as f64;
    let quality = active.len() as f64 / available_count as f64;
    (70.0 * alignment + 30.0 * quality).floor().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn raw(name: &str, score: f64, weight: f64, available: bool) -> RawSignal {
        RawSignal {
            name: name.into(),
            score,
            weight,
            available,
            description: String::new(),
        }
    }

    fn canonical(scores: [f64; 12], put_call_available: bool) -> Vec<RawSignal> {
        let config = SignalsConfig::default();
        Evaluator::ALL
            .iter()
            .zip(scores)
            .map(|(ev, score)| {
                let available = *ev != Evaluator::PutCallRatio || put_call_available;
                raw(ev.name(), score, ev.weight(&config.weights), available)
            })
            .collect()
    }

    #[test]
    fn test_all_neutral_is_hold_with_zero_confidence() {
        let agg = aggregate(&canonical([0.0; 12], true), &SignalsConfig::default());
        assert_eq!(agg.composite_score, 0.0);
        assert_eq!(agg.direction, Direction::Hold);
        assert_eq!(agg.conviction, Conviction::Low);
        assert_eq!(agg.confidence, 0);
    }

    #[test]
    fn test_unavailable_put_call_redistributes_weight() {
        let scores = [0.5, -0.2, 0.8, 0.1, 0.0, 1.0, 0.3, 0.6, -0.4, 0.5, 0.2, 1.0];
        let config = SignalsConfig::default();
        let agg = aggregate(&canonical(scores, false), &config);

        let total: f64 = agg.signals.iter().map(|s| s.weight).sum();
        assert!((total - 1.0).abs() < 1e-12, "weights sum to {total}");
        assert_eq!(agg.signals.len(), 12);
        assert_eq!(agg.signals[11].weight, 0.0);

        let remaining = 1.0 - config.weights.put_call_ratio;
        let expected: f64 = Evaluator::ALL[..11]
            .iter()
            .zip(scores)
            .map(|(ev, s)| s * ev.weight(&config.weights) / remaining)
            .sum();
        assert!((agg.composite_score - expected).abs() < 1e-12);
    }

    #[test]
    fn test_strong_agreement_gives_buy_high() {
        let agg = aggregate(&canonical([0.9; 12], true), &SignalsConfig::default());
        assert!((agg.composite_score - 0.9).abs() < 1e-12);
        assert_eq!(agg.direction, Direction::Buy);
        assert_eq!(agg.conviction, Conviction::High);
        assert_eq!(agg.confidence, 100);
    }

    #[test]
    fn test_confidence_counts_only_non_neutral() {
        // Six agree (+0.5), two disagree (-0.5), four neutral.
        let scores = [0.5, 0.5, 0.5, 0.5, 0.5, 0.5, -0.5, -0.5, 0.0, 0.05, -0.1, 0.0];
        let c = confidence(0.3, scores.into_iter(), 12, 0.1);
        // 70 * 6/8 + 30 * 8/12 = 52.5 + 20 = 72.5
        assert_eq!(c, 72);
    }

    #[test]
    fn test_nothing_available_is_neutral() {
        let signals = vec![raw("put_call_ratio", 0.0, 0.05, false)];
        let agg = aggregate(&signals, &SignalsConfig::default());
        assert_eq!(agg.composite_score, 0.0);
        assert_eq!(agg.confidence, 0);
        assert_eq!(agg.signals[0].weight, 0.0);
    }

    #[test]
    fn test_random_signal_sets_respect_bounds_and_thresholds() {
        let config = SignalsConfig::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..500 {
            let mut scores = [0.0; 12];
            for s in scores.iter_mut() {
                *s = rng.gen_range(-1.0..=1.0);
            }
            let agg = aggregate(&canonical(scores, rng.gen_bool(0.5)), &config);
            assert!(agg.composite_score.abs() <= 1.0);
            assert!(agg.confidence <= 100);
            let expected = if agg.composite_score >= 0.2 {
                Direction::Buy
            } else if agg.composite_score <= -0.2 {
                Direction::Sell
            } else {
                Direction::Hold
            };
            assert_eq!(agg.direction, expected);
        }
    }

    #[test]
    fn test_alternate_weight_scheme() {
        let mut config = SignalsConfig::default();
        config.weights = pat_core::config::SignalWeights {
            ma_crossover: 1.0,
            rsi: 0.0,
            macd: 0.0,
            bollinger: 0.0,
            mean_reversion: 0.0,
            trend: 0.0,
            volume: 0.0,
            adx: 0.0,
            stochastic: 0.0,
            ad_line: 0.0,
            cmf: 0.0,
            put_call_ratio: 0.0,
        };
        let mut scores = [-1.0; 12];
        scores[0] = 0.4;
        let signals: Vec<RawSignal> = Evaluator::ALL
            .iter()
            .zip(scores)
            .map(|(ev, s)| raw(ev.name(), s, ev.weight(&config.weights), true))
            .collect();
        let agg = aggregate(&signals, &config);
        assert!((agg.composite_score - 0.4).abs() < 1e-12);
        assert_eq!(agg.direction, Direction::Buy);
    }
}
