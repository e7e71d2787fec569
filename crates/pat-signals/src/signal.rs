//! Composite signal output types.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Trade direction derived from the composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Buy,
    Sell,
    Hold,
}

impl Direction {
    /// Map a score onto a direction using inclusive thresholds.
    pub fn from_score(score: f64, buy_threshold: f64, sell_threshold: f64) -> Self {
        if score >= buy_threshold {
            Self::Buy
        } else if score <= sell_threshold {
            Self::Sell
        } else {
            Self::Hold
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Hold => write!(f, "HOLD"),
        }
    }
}

/// Strength label derived from `|composite_score|`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Conviction {
    Low,
    Medium,
    High,
}

impl Conviction {
    pub const ALL: [Conviction; 3] = [Conviction::Low, Conviction::Medium, Conviction::High];

    pub fn from_score(score: f64) -> Self {
        let magnitude = score.abs();
        if magnitude >= 0.6 {
            Self::High
        } else if magnitude >= 0.3 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for Conviction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// One evaluator's contribution to a composite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalScore {
    pub name: String,
    /// Always within [-1, 1].
    pub score: f64,
    /// Effective weight after redistribution; 0 for unavailable signals.
    pub weight: f64,
    pub description: String,
}

/// Stop, target, and sizing for a signal. Every field is `None` when its
/// prerequisite (ATR, win-rate estimate, a tradable direction) is missing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskContext {
    pub stop_loss: Option<f64>,
    pub target_price: Option<f64>,
    pub risk_reward: Option<f64>,
    /// Whole shares.
    pub position_size: Option<f64>,
    /// Position value as a fraction of the portfolio.
    pub position_pct: Option<f64>,
}

/// Complete composite scan result for one symbol.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositeResult {
    pub symbol: String,
    pub current_price: f64,
    pub direction: Direction,
    pub conviction: Conviction,
    pub composite_score: f64,
    /// 0–100.
    pub confidence: u8,
    pub signals: Vec<SignalScore>,
    pub risk: RiskContext,
}

impl fmt::Display for CompositeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ${:.2} | {} ({}) | score: {:+.3} | conf: {}%",
            self.symbol,
            self.current_price,
            self.direction,
            self.conviction,
            self.composite_score,
            self.confidence,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_thresholds_inclusive() {
        assert_eq!(Direction::from_score(0.2, 0.2, -0.2), Direction::Buy);
        assert_eq!(Direction::from_score(0.1999, 0.2, -0.2), Direction::Hold);
        assert_eq!(Direction::from_score(-0.2, 0.2, -0.2), Direction::Sell);
        assert_eq!(Direction::from_score(0.0, 0.2, -0.2), Direction::Hold);
    }

    #[test]
    fn test_conviction_bands() {
        assert_eq!(Conviction::from_score(0.61), Conviction::High);
        assert_eq!(Conviction::from_score(-0.6), Conviction::High);
        assert_eq!(Conviction::from_score(0.3), Conviction::Medium);
        assert_eq!(Conviction::from_score(-0.29), Conviction::Low);
    }

    #[test]
    fn test_serde_roundtrip_lowercase_enums() {
        let result = CompositeResult {
            symbol: "AAPL".into(),
            current_price: 190.5,
            direction: Direction::Buy,
            conviction: Conviction::Medium,
            composite_score: 0.42,
            confidence: 71,
            signals: vec![SignalScore {
                name: "rsi".into(),
                score: 0.5,
                weight: 0.1,
                description: "RSI 15.0 oversold".into(),
            }],
            risk: RiskContext::default(),
        };
        let json = serde_json::to_string(&result).unwrap();
        assert!(json.contains("\"direction\":\"buy\""));
        assert!(json.contains("\"conviction\":\"medium\""));
        assert!(json.contains("\"stop_loss\":null"));
        let back: CompositeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.symbol, "AAPL");
        assert_eq!(back.signals.len(), 1);
    }

    #[test]
    fn test_display_formatting() {
        let result = CompositeResult {
            symbol: "MSFT".into(),
            current_price: 410.0,
            direction: Direction::Sell,
            conviction: Conviction::High,
            composite_score: -0.65,
            confidence: 80,
            signals: vec![],
            risk: RiskContext::default(),
        };
        let display = format!("{result}");
        assert!(display.contains("MSFT"));
        assert!(display.contains("SELL"));
        assert!(display.contains("high"));
        assert!(display.contains("-0.650"));
    }
}
