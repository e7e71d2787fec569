//! LEAPS (long-dated, deep in-the-money) contract screening and roll advice.

use std::fmt;

use chrono::NaiveDate;
use pat_core::config::OptionsConfig;
use pat_core::market::{OptionChain, OptionType};
use pat_core::PatError;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::greeks::{intrinsic_value, Greeks};
use crate::options::snapshot;

/// Contracts must expire more than this many days out.
pub const LEAPS_MIN_DTE: i64 = 365;
/// Minimum |delta| for a stock-replacement candidate.
pub const MIN_ABS_DELTA: f64 = 0.5;
const ROLL_NOW_DTE: i64 = 90;
const MONITOR_DTE: i64 = 180;
const MONITOR_EXTRINSIC_PCT: f64 = 0.15;

/// What to do with a held long-dated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RollRecommendation {
    Hold,
    Monitor,
    RollNow,
}

impl fmt::Display for RollRecommendation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hold => write!(f, "HOLD"),
            Self::Monitor => write!(f, "MONITOR"),
            Self::RollNow => write!(f, "ROLL_NOW"),
        }
    }
}

/// Inside 90 days always roll; inside 180 days with little time value left,
/// watch it. The DTE rule wins when both apply.
pub fn roll_recommendation(days_to_expiry: i64, extrinsic_pct: f64) -> RollRecommendation {
    if days_to_expiry < ROLL_NOW_DTE {
        RollRecommendation::RollNow
    } else if days_to_expiry < MONITOR_DTE && extrinsic_pct < MONITOR_EXTRINSIC_PCT {
        RollRecommendation::Monitor
    } else {
        RollRecommendation::Hold
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeapsCandidate {
    pub strike: f64,
    pub expiration: NaiveDate,
    pub option_type: OptionType,
    pub days_to_expiry: i64,
    pub market_price: f64,
    pub implied_vol: f64,
    pub greeks: Greeks,
    pub intrinsic: f64,
    pub extrinsic: f64,
    /// Extrinsic as a fraction of the premium.
    pub extrinsic_pct: f64,
    /// Daily decay as a fraction of the premium; lower is better.
    pub theta_efficiency: f64,
    pub delta_per_dollar: f64,
    pub theta_per_delta: f64,
    /// Premium as a fraction of the share price.
    pub stock_replacement_cost: f64,
    pub roll: RollRecommendation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeapsAnalysis {
    pub symbol: String,
    pub spot_price: f64,
    /// Ordered by theta efficiency, best first.
    pub candidates: Vec<LeapsCandidate>,
}

/// Screen every chain expiring beyond a year for deep ITM contracts.
///
/// Contracts whose IV cannot be recovered are skipped.
pub fn analyze_leaps(
    symbol: &str,
    spot: f64,
    chains: &[OptionChain],
    today: NaiveDate,
    config: &OptionsConfig,
) -> Result<LeapsAnalysis, PatError> {
    if !(spot.is_finite() && spot > 0.0) {
        return Err(PatError::invalid(format!("spot must be positive, got {spot}")));
    }

    let mut candidates = Vec::new();
    for chain in chains
        .iter()
        .filter(|c| c.days_to_expiry(today) > LEAPS_MIN_DTE)
    {
        for quote in &chain.quotes {
            let Some(snap) = snapshot(quote, chain.expiration, spot, today, config)? else {
                continue;
            };
            let delta = snap.greeks.delta;
            let deep = match snap.option_type {
                OptionType::Call => delta >= MIN_ABS_DELTA,
                OptionType::Put => delta <= -MIN_ABS_DELTA,
            };
            if !deep {
                debug!("leaps {symbol}: K={} {} delta {delta:.2} too shallow", snap.strike, snap.option_type);
                continue;
            }

            let price = snap.market_price;
            let intrinsic = intrinsic_value(spot, snap.strike, snap.option_type);
            let extrinsic = (price - intrinsic).max(0.0);
            let extrinsic_pct = extrinsic / price;
            candidates.push(LeapsCandidate {
                strike: snap.strike,
                expiration: snap.expiration,
                option_type: snap.option_type,
                days_to_expiry: snap.days_to_expiry,
                market_price: price,
                implied_vol: snap.implied_vol,
                greeks: snap.greeks,
                intrinsic,
                extrinsic,
                extrinsic_pct,
                theta_efficiency: snap.greeks.theta.abs() / price,
                delta_per_dollar: delta.abs() / price,
                theta_per_delta: snap.greeks.theta.abs() / delta.abs(),
                stock_replacement_cost: price / spot,
                roll: roll_recommendation(snap.days_to_expiry, extrinsic_pct),
            });
        }
    }
    candidates.sort_by(|a, b| a.theta_efficiency.total_cmp(&b.theta_efficiency));
    info!("leaps {symbol}: {} candidates", candidates.len());

    Ok(LeapsAnalysis {
        symbol: symbol.to_string(),
        spot_price: spot,
        candidates,
    })
}
