//! File-backed market data: JSON snapshots under the configured data directory.
//!
//! Layout per symbol:
//! - `<SYMBOL>.bars.json`: array of price bars, oldest first
//! - `<SYMBOL>.chain.json`: array of option chains (optional)
//! - `<SYMBOL>.iv_history.json`: array of daily ATM IVs (optional)

use async_trait::async_trait;
use pat_core::market::{normalize_symbol, OptionChain, PriceBar};
use pat_core::traits::MarketDataSource;
use pat_core::PatError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct FileMarketData {
    root: PathBuf,
}

impl FileMarketData {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path(&self, symbol: &str, kind: &str) -> Result<PathBuf, PatError> {
        let symbol = normalize_symbol(symbol)?;
        Ok(self.root.join(format!("{symbol}.{kind}.json")))
    }

    async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PatError> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| std::io::Error::new(e.kind(), format!("{}: {e}", path.display())))?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Optional files read as empty when absent.
    async fn read_optional<T: DeserializeOwned + Default>(path: &Path) -> Result<T, PatError> {
        match tokio::fs::try_exists(path).await {
            Ok(true) => Self::read_json(path).await,
            _ => {
                debug!("{} not found, treating as empty", path.display());
                Ok(T::default())
            }
        }
    }
}

#[async_trait]
impl MarketDataSource for FileMarketData {
    fn name(&self) -> &str {
        "file"
    }

    async fn price_history(&self, symbol: &str) -> Result<Vec<PriceBar>, PatError> {
        let path = self.path(symbol, "bars")?;
        let mut bars: Vec<PriceBar> = Self::read_json(&path).await?;
        bars.sort_by_key(|b| b.date);
        Ok(bars)
    }

    async fn option_chains(&self, symbol: &str) -> Result<Vec<OptionChain>, PatError> {
        Self::read_optional(&self.path(symbol, "chain")?).await
    }

    async fn iv_history(&self, symbol: &str) -> Result<Vec<f64>, PatError> {
        Self::read_optional(&self.path(symbol, "iv_history")?).await
    }
}
