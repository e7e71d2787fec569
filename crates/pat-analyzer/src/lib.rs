//! # pat-analyzer
//!
//! Options and portfolio side of PAT: Black-Scholes pricing with Greeks and
//! implied-volatility inversion, chain analytics (IV rank/percentile, skew,
//! term structure, put/call ratio), LEAPS screening, performance metrics, and
//! the Monte Carlo portfolio optimizer.
//!
//! Like `pat-signals`, every entry point is a pure function of its inputs.

pub mod greeks;
pub mod leaps;
pub mod metrics;
pub mod optimizer;
pub mod options;

pub use greeks::{implied_volatility, BlackScholes, Greeks};
pub use leaps::{analyze_leaps, LeapsAnalysis, RollRecommendation};
pub use optimizer::{optimize_portfolio, OptimizationResult};
pub use options::{analyze_options, put_call_ratio, OptionsAnalysis};
