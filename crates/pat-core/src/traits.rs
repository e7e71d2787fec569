use crate::{
    error::PatError,
    market::{OptionChain, PriceBar},
};
use async_trait::async_trait;

/// Market data source trait. The only door to the outside world.
///
/// The core never fetches anything itself. Callers obtain bars and chains
/// through an implementation of this trait and hand the slices to the
/// pure computations in `pat-signals` and `pat-analyzer`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Human-readable source name.
    fn name(&self) -> &str;

    /// Chronological daily bars for a symbol.
    async fn price_history(&self, symbol: &str) -> Result<Vec<PriceBar>, PatError>;

    /// Option chain snapshots, one per expiration. Empty when the symbol
    /// has no listed options.
    async fn option_chains(&self, _symbol: &str) -> Result<Vec<OptionChain>, PatError> {
        Ok(Vec::new())
    }

    /// Daily at-the-money implied volatility history, oldest first.
    async fn iv_history(&self, _symbol: &str) -> Result<Vec<f64>, PatError> {
        Ok(Vec::new())
    }
}
