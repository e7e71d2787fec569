//! Risk context: ATR stop, reward target, and Kelly-capped position size.

use pat_core::config::RiskConfig;
use pat_core::market::Ohlcv;
use tracing::debug;

use crate::indicators::{self, latest};
use crate::kelly::KellyCriterion;
use crate::signal::{Direction, RiskContext};

const ATR_PERIOD: usize = 14;

/// Stop `multiplier · ATR` away from `price`, against the trade.
/// `None` for HOLD.
pub fn atr_stop_loss(price: f64, atr: f64, direction: Direction, multiplier: f64) -> Option<f64> {
    match direction {
        Direction::Buy => Some(price - multiplier * atr),
        Direction::Sell => Some(price + multiplier * atr),
        Direction::Hold => None,
    }
}

/// Whole shares such that hitting the stop loses `risk_pct` of the portfolio.
/// `None` when the stop sits on the entry.
pub fn position_size_from_risk(
    portfolio_value: f64,
    entry: f64,
    stop: f64,
    risk_pct: f64,
) -> Option<f64> {
    let risk_per_share = (entry - stop).abs();
    if risk_per_share == 0.0 {
        return None;
    }
    Some((portfolio_value * risk_pct / risk_per_share).floor().max(0.0))
}

/// `|target - entry| / |entry - stop|`, `None` for zero risk.
pub fn risk_reward_ratio(entry: f64, stop: f64, target: f64) -> Option<f64> {
    let risk = (entry - stop).abs();
    if risk == 0.0 {
        return None;
    }
    Some((target - entry).abs() / risk)
}

/// Full risk context for the latest bar of `bars`.
///
/// Risk per trade scales linearly with `|composite_score|` between the
/// configured min and max. The risk-based share count is then capped by the
/// fractional Kelly allocation; with no edge the size is 0. Sizing is `None`
/// when no win-rate/payoff estimate is configured.
pub fn compute_risk_context(
    bars: &Ohlcv,
    direction: Direction,
    composite_score: f64,
    config: &RiskConfig,
) -> RiskContext {
    let (Some(price), Some(atr)) = (bars.last_close(), latest(&indicators::atr(bars, ATR_PERIOD)))
    else {
        debug!("risk: ATR({ATR_PERIOD}) unavailable, no risk context");
        return RiskContext::default();
    };
    let Some(stop) = atr_stop_loss(price, atr, direction, config.atr_multiplier) else {
        return RiskContext::default();
    };

    let distance = (price - stop).abs();
    let target = match direction {
        Direction::Sell => price - config.reward_multiple * distance,
        _ => price + config.reward_multiple * distance,
    };

    let mut ctx = RiskContext {
        stop_loss: Some(stop),
        target_price: Some(target),
        risk_reward: risk_reward_ratio(price, stop, target),
        position_size: None,
        position_pct: None,
    };

    let (Some(win_rate), Some(payoff)) = (config.win_rate, config.payoff_ratio) else {
        return ctx;
    };
    if config.portfolio_value <= 0.0 || price <= 0.0 {
        return ctx;
    }

    let conviction = composite_score.abs().min(1.0);
    let risk_pct = config.min_risk_pct + conviction * (config.max_risk_pct - config.min_risk_pct);
    let Some(risk_shares) = position_size_from_risk(config.portfolio_value, price, stop, risk_pct)
    else {
        return ctx;
    };

    let kelly = KellyCriterion::new(config.kelly_fraction, config.kelly_cap).calculate(
        win_rate,
        payoff,
        config.portfolio_value,
    );
    let kelly_shares = (kelly.position_size_usd / price).floor();
    let shares = risk_shares.min(kelly_shares).max(0.0);
    debug!(
        "risk: {risk_shares} shares at {:.2}% risk, Kelly allows {kelly_shares} ({})",
        risk_pct * 100.0,
        kelly.reason
    );

    ctx.position_size = Some(shares);
    ctx.position_pct = Some(shares * price / config.portfolio_value);
    ctx
}
