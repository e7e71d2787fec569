//! Options chain analytics: contract snapshots, IV rank/percentile, skew,
//! term structure, and put/call ratio.

use chrono::NaiveDate;
use pat_core::config::OptionsConfig;
use pat_core::market::{OptionChain, OptionQuote, OptionType};
use pat_core::PatError;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::greeks::{implied_volatility, BlackScholes, Greeks};

/// A priced contract with its Greeks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractSnapshot {
    pub strike: f64,
    pub expiration: NaiveDate,
    pub option_type: OptionType,
    pub days_to_expiry: i64,
    pub market_price: f64,
    pub implied_vol: f64,
    pub greeks: Greeks,
}

/// Price one quote against `spot`.
///
/// Uses the quoted IV when present, otherwise inverts the market price.
/// Returns `Ok(None)` when the contract has no usable price or its IV cannot
/// be recovered; an expired contract is an error.
pub fn snapshot(
    quote: &OptionQuote,
    expiration: NaiveDate,
    spot: f64,
    today: NaiveDate,
    config: &OptionsConfig,
) -> Result<Option<ContractSnapshot>, PatError> {
    let dte = (expiration - today).num_days();
    if dte < 0 {
        return Err(PatError::invalid(format!("contract expired on {expiration}")));
    }
    let Some(market_price) = quote.market_price() else {
        return Ok(None);
    };
    let t = dte as f64 / 365.0;
    let iv = match quote.iv() {
        Some(iv) => iv,
        None => match implied_volatility(
            market_price,
            spot,
            quote.strike,
            t,
            config.risk_free_rate,
            config.dividend_yield,
            quote.option_type,
        ) {
            Ok(iv) => iv,
            Err(PatError::NoConvergence(reason)) => {
                debug!("snapshot: K={} {} IV unavailable: {reason}", quote.strike, quote.option_type);
                return Ok(None);
            }
            Err(e) => return Err(e),
        },
    };
    let model = BlackScholes::new(
        spot,
        quote.strike,
        t,
        config.risk_free_rate,
        config.dividend_yield,
        iv,
    )?;
    Ok(Some(ContractSnapshot {
        strike: quote.strike,
        expiration,
        option_type: quote.option_type,
        days_to_expiry: dte,
        market_price,
        implied_vol: iv,
        greeks: model.greeks(quote.option_type),
    }))
}

// --- IV rank / percentile ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IvMetrics {
    pub current_iv: f64,
    /// 0–100 position of the current IV within the window's range.
    /// `None` for an empty history or a flat one.
    pub iv_rank: Option<f64>,
    /// Percentage of days in the window with IV below the current value.
    pub iv_percentile: Option<f64>,
    pub iv_high: Option<f64>,
    pub iv_low: Option<f64>,
}

/// Rank and percentile of `current_iv` within the last `window` history values.
pub fn compute_iv_metrics(history: &[f64], current_iv: f64, window: usize) -> IvMetrics {
    let recent: Vec<f64> = history[history.len().saturating_sub(window)..]
        .iter()
        .copied()
        .filter(|v| v.is_finite() && *v > 0.0)
        .collect();
    if recent.is_empty() {
        return IvMetrics {
            current_iv,
            iv_rank: None,
            iv_percentile: None,
            iv_high: None,
            iv_low: None,
        };
    }
    let high = recent.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let low = recent.iter().copied().fold(f64::INFINITY, f64::min);
    let range = high - low;
    let iv_rank = (range > 0.0).then(|| ((current_iv - low) / range * 100.0).clamp(0.0, 100.0));
    let below = recent.iter().filter(|v| **v < current_iv).count();
    IvMetrics {
        current_iv,
        iv_rank,
        iv_percentile: Some(below as f64 / recent.len() as f64 * 100.0),
        iv_high: Some(high),
        iv_low: Some(low),
    }
}

/// IV of the call whose strike is closest to spot.
///
/// Uses the quoted IV, otherwise inverts the call's market price.
pub fn find_atm_iv(
    chain: &OptionChain,
    spot: f64,
    today: NaiveDate,
    config: &OptionsConfig,
) -> Option<f64> {
    let atm = chain
        .calls()
        .min_by(|a, b| (a.strike - spot).abs().total_cmp(&(b.strike - spot).abs()))?;
    atm.iv().or_else(|| {
        snapshot(atm, chain.expiration, spot, today, config)
            .ok()
            .flatten()
            .map(|snap| snap.implied_vol)
    })
}

// --- Skew ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewPoint {
    pub strike: f64,
    pub call_iv: Option<f64>,
    pub put_iv: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkewMetrics {
    /// Mean OTM put IV / mean OTM call IV; above 1 means puts carry a premium.
    /// `None` when either side has no quotes in the band.
    pub skew_ratio: Option<f64>,
    pub points: Vec<SkewPoint>,
}

/// Put/call IV skew over strikes within `±band` of spot.
pub fn compute_skew(chain: &OptionChain, spot: f64, band: f64) -> SkewMetrics {
    let (lower, upper) = (spot * (1.0 - band), spot * (1.0 + band));
    let in_band = |q: &&OptionQuote| q.strike >= lower && q.strike <= upper;

    let mut points: Vec<SkewPoint> = Vec::new();
    for q in chain.quotes.iter().filter(in_band) {
        let idx = match points.iter().position(|p| p.strike == q.strike) {
            Some(i) => i,
            None => {
                points.push(SkewPoint {
                    strike: q.strike,
                    call_iv: None,
                    put_iv: None,
                });
                points.len() - 1
            }
        };
        match q.option_type {
            OptionType::Call => points[idx].call_iv = q.iv(),
            OptionType::Put => points[idx].put_iv = q.iv(),
        }
    }
    points.sort_by(|a, b| a.strike.total_cmp(&b.strike));

    let mean = |v: Vec<f64>| (!v.is_empty()).then(|| v.iter().sum::<f64>() / v.len() as f64);
    let otm_puts = mean(
        chain
            .puts()
            .filter(in_band)
            .filter(|q| q.strike < spot)
            .filter_map(OptionQuote::iv)
            .collect(),
    );
    let otm_calls = mean(
        chain
            .calls()
            .filter(in_band)
            .filter(|q| q.strike > spot)
            .filter_map(OptionQuote::iv)
            .collect(),
    );
    let skew_ratio = match (otm_puts, otm_calls) {
        (Some(p), Some(c)) if c > 0.0 => Some(p / c),
        _ => None,
    };
    SkewMetrics { skew_ratio, points }
}

// --- Term structure ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermStructurePoint {
    pub expiration: NaiveDate,
    pub days_to_expiry: i64,
    pub atm_iv: f64,
}

/// ATM IV per unexpired expiration, ordered by days to expiry.
pub fn compute_term_structure(
    chains: &[OptionChain],
    spot: f64,
    today: NaiveDate,
    config: &OptionsConfig,
) -> Vec<TermStructurePoint> {
    let mut points: Vec<TermStructurePoint> = chains
        .iter()
        .filter_map(|chain| {
            let dte = chain.days_to_expiry(today);
            if dte <= 0 {
                return None;
            }
            Some(TermStructurePoint {
                expiration: chain.expiration,
                days_to_expiry: dte,
                atm_iv: find_atm_iv(chain, spot, today, config)?,
            })
        })
        .collect();
    points.sort_by_key(|p| p.days_to_expiry);
    points
}

// --- Sentiment ---

/// Total put volume over total call volume across `chains`.
///
/// Falls back to open interest when no volume is reported. `None` when the
/// call side of the chosen measure is zero.
pub fn put_call_ratio(chains: &[OptionChain]) -> Option<f64> {
    let totals = |field: fn(&OptionQuote) -> Option<f64>| {
        let mut calls = 0.0;
        let mut puts = 0.0;
        for q in chains.iter().flat_map(|c| &c.quotes) {
            let v = field(q).filter(|v| v.is_finite() && *v >= 0.0).unwrap_or(0.0);
            match q.option_type {
                OptionType::Call => calls += v,
                OptionType::Put => puts += v,
            }
        }
        (puts, calls)
    };
    let ratio = |(puts, calls): (f64, f64)| (calls > 0.0).then(|| puts / calls);

    let (puts, calls) = totals(|q| q.volume);
    if puts + calls > 0.0 {
        return ratio((puts, calls));
    }
    ratio(totals(|q| q.open_interest))
}

// --- Bundle ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsAnalysis {
    pub symbol: String,
    pub spot_price: f64,
    /// Nearest unexpired expiration, used for ATM IV and skew.
    pub nearest_expiration: Option<NaiveDate>,
    pub iv_metrics: Option<IvMetrics>,
    pub skew: Option<SkewMetrics>,
    pub term_structure: Vec<TermStructurePoint>,
    pub put_call_ratio: Option<f64>,
}

/// IV metrics, nearest-expiry skew, term structure, and put/call ratio.
///
/// Missing pieces degrade to `None` rather than failing the whole analysis.
pub fn analyze_options(
    symbol: &str,
    spot: f64,
    chains: &[OptionChain],
    iv_history: &[f64],
    today: NaiveDate,
    config: &OptionsConfig,
) -> Result<OptionsAnalysis, PatError> {
    if !(spot.is_finite() && spot > 0.0) {
        return Err(PatError::invalid(format!("spot must be positive, got {spot}")));
    }
    let nearest = chains
        .iter()
        .filter(|c| c.days_to_expiry(today) > 0)
        .min_by_key(|c| c.expiration);
    if nearest.is_none() {
        warn!("options {symbol}: no unexpired option chains");
    }

    let iv_metrics = nearest
        .and_then(|c| find_atm_iv(c, spot, today, config))
        .map(|iv| compute_iv_metrics(iv_history, iv, config.iv_history_days));
    let skew = nearest.map(|c| compute_skew(c, spot, config.skew_band));

    Ok(OptionsAnalysis {
        symbol: symbol.to_string(),
        spot_price: spot,
        nearest_expiration: nearest.map(|c| c.expiration),
        iv_metrics,
        skew,
        term_structure: compute_term_structure(chains, spot, today, config),
        put_call_ratio: put_call_ratio(chains),
    })
}
