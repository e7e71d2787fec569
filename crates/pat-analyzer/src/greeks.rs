//! Black-Scholes pricing, Greeks, and implied volatility inversion.
//!
//! Prices are European with a continuous dividend yield `q`:
//!
//! ```text
//! d1   = [ln(S/K) + (r - q + σ²/2)T] / (σ√T),   d2 = d1 - σ√T
//! call = S·e^(-qT)·N(d1) - K·e^(-rT)·N(d2)
//! put  = K·e^(-rT)·N(-d2) - S·e^(-qT)·N(-d1)
//! ```

use pat_core::market::OptionType;
use pat_core::PatError;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use tracing::debug;

/// Time to expiry is clamped up to this many years (about 30 seconds).
pub const MIN_TIME: f64 = 1e-6;
/// IV search bracket.
pub const IV_LOWER: f64 = 0.01;
pub const IV_UPPER: f64 = 5.0;
pub const IV_MAX_ITERATIONS: usize = 100;
/// Relative to the market price, so sub-cent OTM quotes are matched as
/// tightly as ATM ones.
const IV_PRICE_TOLERANCE: f64 = 1e-10;
/// The search stops once the bracket is narrower than this.
const IV_VOL_TOLERANCE: f64 = 1e-10;

/// Price and Greeks of one contract.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub price: f64,
    pub delta: f64,
    pub gamma: f64,
    /// Per calendar day.
    pub theta: f64,
    /// Per 1 vol point.
    pub vega: f64,
    /// Per 1% rate change.
    pub rho: f64,
}

/// Black-Scholes model for one underlying/strike/expiry.
#[derive(Debug, Clone)]
pub struct BlackScholes {
    pub spot: f64,
    pub strike: f64,
    /// Years, already clamped to at least [`MIN_TIME`].
    pub time_to_expiry: f64,
    pub risk_free_rate: f64,
    pub dividend_yield: f64,
    pub volatility: f64,
    normal: Normal,
}

impl BlackScholes {
    /// Validate inputs and build the model.
    ///
    /// Non-positive spot, strike, or volatility and a negative time to expiry
    /// (an expiry in the past) are rejected. A zero time is clamped to
    /// [`MIN_TIME`].
    pub fn new(
        spot: f64,
        strike: f64,
        time_to_expiry: f64,
        risk_free_rate: f64,
        dividend_yield: f64,
        volatility: f64,
    ) -> Result<Self, PatError> {
        if !(spot.is_finite() && spot > 0.0) {
            return Err(PatError::invalid(format!("spot must be positive, got {spot}")));
        }
        if !(strike.is_finite() && strike > 0.0) {
            return Err(PatError::invalid(format!("strike must be positive, got {strike}")));
        }
        if !time_to_expiry.is_finite() || time_to_expiry < 0.0 {
            return Err(PatError::invalid(format!(
                "expiry is in the past (T = {time_to_expiry})"
            )));
        }
        if !(volatility.is_finite() && volatility > 0.0) {
            return Err(PatError::invalid(format!(
                "volatility must be positive, got {volatility}"
            )));
        }
        if !risk_free_rate.is_finite() || !dividend_yield.is_finite() {
            return Err(PatError::invalid("rate and dividend yield must be finite"));
        }
        Ok(Self {
            spot,
            strike,
            time_to_expiry: time_to_expiry.max(MIN_TIME),
            risk_free_rate,
            dividend_yield,
            volatility,
            normal: Normal::standard(),
        })
    }

    /// Same contract at another volatility.
    pub fn with_volatility(&self, volatility: f64) -> Self {
        Self {
            volatility,
            ..self.clone()
        }
    }

    fn sqrt_t(&self) -> f64 {
        self.time_to_expiry.sqrt()
    }

    fn d1(&self) -> f64 {
        let t = self.time_to_expiry;
        ((self.spot / self.strike).ln()
            + (self.risk_free_rate - self.dividend_yield + self.volatility.powi(2) / 2.0) * t)
            / (self.volatility * self.sqrt_t())
    }

    fn d2(&self) -> f64 {
        self.d1() - self.volatility * self.sqrt_t()
    }

    fn n(&self, x: f64) -> f64 {
        self.normal.cdf(x)
    }

    fn pdf(&self, x: f64) -> f64 {
        self.normal.pdf(x)
    }

    fn carry(&self) -> f64 {
        (-self.dividend_yield * self.time_to_expiry).exp()
    }

    fn discount(&self) -> f64 {
        (-self.risk_free_rate * self.time_to_expiry).exp()
    }

    pub fn call_price(&self) -> f64 {
        self.spot * self.carry() * self.n(self.d1())
            - self.strike * self.discount() * self.n(self.d2())
    }

    pub fn put_price(&self) -> f64 {
        self.strike * self.discount() * self.n(-self.d2())
            - self.spot * self.carry() * self.n(-self.d1())
    }

    pub fn price(&self, option_type: OptionType) -> f64 {
        match option_type {
            OptionType::Call => self.call_price(),
            OptionType::Put => self.put_price(),
        }
    }

    /// Raw vega: ∂price/∂σ per unit of volatility.
    pub fn raw_vega(&self) -> f64 {
        self.spot * self.carry() * self.pdf(self.d1()) * self.sqrt_t()
    }

    pub fn greeks(&self, option_type: OptionType) -> Greeks {
        let (d1, d2) = (self.d1(), self.d2());
        let (s, k, t) = (self.spot, self.strike, self.time_to_expiry);
        let (r, q) = (self.risk_free_rate, self.dividend_yield);
        let (carry, discount) = (self.carry(), self.discount());

        let gamma = carry * self.pdf(d1) / (s * self.volatility * self.sqrt_t());
        let decay = -s * carry * self.pdf(d1) * self.volatility / (2.0 * self.sqrt_t());

        let (delta, theta_annual, rho) = match option_type {
            OptionType::Call => (
                carry * self.n(d1),
                decay - r * k * discount * self.n(d2) + q * s * carry * self.n(d1),
                k * t * discount * self.n(d2),
            ),
            OptionType::Put => (
                carry * (self.n(d1) - 1.0),
                decay + r * k * discount * self.n(-d2) - q * s * carry * self.n(-d1),
                -k * t * discount * self.n(-d2),
            ),
        };

        Greeks {
            price: self.price(option_type),
            delta,
            gamma,
            theta: theta_annual / 365.0,
            vega: self.raw_vega() / 100.0,
            rho: rho / 100.0,
        }
    }
}

/// Intrinsic value at `spot`.
pub fn intrinsic_value(spot: f64, strike: f64, option_type: OptionType) -> f64 {
    match option_type {
        OptionType::Call => (spot - strike).max(0.0),
        OptionType::Put => (strike - spot).max(0.0),
    }
}

/// Solve for the volatility that reproduces `market_price`.
///
/// Newton steps are taken inside a shrinking `[IV_LOWER, IV_UPPER]` bracket
/// and replaced by bisection whenever they leave it or vega vanishes. Prices
/// outside the range spanned by the bracket end-points (e.g. below intrinsic)
/// fail immediately. Iterations are capped at [`IV_MAX_ITERATIONS`].
pub fn implied_volatility(
    market_price: f64,
    spot: f64,
    strike: f64,
    time_to_expiry: f64,
    risk_free_rate: f64,
    dividend_yield: f64,
    option_type: OptionType,
) -> Result<f64, PatError> {
    if !(market_price.is_finite() && market_price > 0.0) {
        return Err(PatError::invalid(format!(
            "market price must be positive, got {market_price}"
        )));
    }
    let model = BlackScholes::new(
        spot,
        strike,
        time_to_expiry,
        risk_free_rate,
        dividend_yield,
        0.3,
    )?;

    let price_at = |sigma: f64| model.with_volatility(sigma).price(option_type);
    let (p_lo, p_hi) = (price_at(IV_LOWER), price_at(IV_UPPER));
    let slack = |p: f64| IV_PRICE_TOLERANCE * p.max(market_price);
    if market_price < p_lo - slack(p_lo) || market_price > p_hi + slack(p_hi) {
        debug!(
            "iv: price {market_price:.4} outside feasible range [{p_lo:.4}, {p_hi:.4}] for K={strike}"
        );
        return Err(PatError::NoConvergence(format!(
            "price {market_price:.4} outside [{p_lo:.4}, {p_hi:.4}] for vol in [{IV_LOWER}, {IV_UPPER}]"
        )));
    }

    // Newton runs on ln(price): deep OTM prices fall off like exp(-c/σ²),
    // which is close to linear in log space.
    let target = market_price.ln();
    let (mut lo, mut hi) = (IV_LOWER, IV_UPPER);
    let mut sigma = 0.3;
    for _ in 0..IV_MAX_ITERATIONS {
        let m = model.with_volatility(sigma);
        let price = m.price(option_type);
        let diff = price - market_price;
        if diff.abs() <= IV_PRICE_TOLERANCE * market_price {
            return Ok(sigma);
        }
        // Price is increasing in σ.
        if diff > 0.0 {
            hi = sigma;
        } else {
            lo = sigma;
        }
        if hi - lo < IV_VOL_TOLERANCE {
            return Ok((lo + hi) / 2.0);
        }
        let vega = m.raw_vega();
        let newton = if price > 0.0 && vega > 0.0 {
            sigma - (price.ln() - target) * price / vega
        } else {
            f64::NAN
        };
        sigma = if newton > lo && newton < hi {
            newton
        } else {
            (lo + hi) / 2.0
        };
    }

    debug!("iv: no convergence after {IV_MAX_ITERATIONS} iterations for K={strike}");
    Err(PatError::NoConvergence(format!(
        "implied volatility did not converge in {IV_MAX_ITERATIONS} iterations"
    )))
}
