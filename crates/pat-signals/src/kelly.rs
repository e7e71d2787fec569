//! Fractional Kelly criterion with a hard portfolio cap.

use serde::{Deserialize, Serialize};

/// No position may exceed this share of the portfolio, whatever the inputs.
pub const KELLY_HARD_CAP: f64 = 0.25;

/// Kelly calculator: `fraction` of full Kelly, capped at `max_allocation`.
#[derive(Debug, Clone, Copy)]
pub struct KellyCriterion {
    /// Fraction of full Kelly to use (0.1 to 1.0).
    fraction: f64,
    /// Maximum allocation as a fraction of portfolio, never above [`KELLY_HARD_CAP`].
    max_allocation: f64,
}

/// Output of a Kelly calculation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KellyOutput {
    /// Full Kelly fraction (unscaled, may be negative).
    pub full_kelly: f64,
    /// Scaled and capped allocation; 0 when there is no edge.
    pub fractional_kelly: f64,
    /// Dollar allocation for the supplied portfolio value.
    pub position_size_usd: f64,
    pub should_trade: bool,
    pub reason: String,
}

impl KellyCriterion {
    /// Create a calculator; parameters are clamped into their safe ranges.
    pub fn new(fraction: f64, max_allocation: f64) -> Self {
        Self {
            fraction: fraction.clamp(0.1, 1.0),
            max_allocation: max_allocation.clamp(0.01, KELLY_HARD_CAP),
        }
    }

    /// Half Kelly capped at 25%.
    pub fn half_kelly() -> Self {
        Self::new(0.5, KELLY_HARD_CAP)
    }

    pub fn max_allocation(&self) -> f64 {
        self.max_allocation
    }

    /// Allocation for a strategy with the given win rate and payoff ratio
    /// (average win / average loss).
    pub fn calculate(&self, win_rate: f64, payoff_ratio: f64, portfolio_value: f64) -> KellyOutput {
        let no_trade = |full_kelly: f64, reason: String| KellyOutput {
            full_kelly,
            fractional_kelly: 0.0,
            position_size_usd: 0.0,
            should_trade: false,
            reason,
        };

        if !(0.0..=1.0).contains(&win_rate) || !payoff_ratio.is_finite() || payoff_ratio <= 0.0 {
            return no_trade(
                0.0,
                format!("Invalid inputs: win rate {win_rate:.3}, payoff {payoff_ratio:.3}"),
            );
        }

        // f* = p - (1 - p) / b
        let full_kelly = win_rate - (1.0 - win_rate) / payoff_ratio;
        if full_kelly <= 0.0 {
            return no_trade(full_kelly, "No edge detected (Kelly <= 0)".into());
        }

        let capped = (full_kelly * self.fraction).min(self.max_allocation);
        KellyOutput {
            full_kelly,
            fractional_kelly: capped,
            position_size_usd: capped * portfolio_value.max(0.0),
            should_trade: true,
            reason: format!(
                "Edge detected: full Kelly {:.1}%, using {:.1}% (capped at {:.1}%)",
                full_kelly * 100.0,
                capped * 100.0,
                self.max_allocation * 100.0,
            ),
        }
    }
}
