//! Market data types: daily price bars and option chain snapshots.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PatError;

/// One daily OHLCV bar.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl PriceBar {
    /// Reject bars with negative or non-finite fields, or high < low.
    pub fn validate(&self) -> Result<(), PatError> {
        let fields = [self.open, self.high, self.low, self.close, self.volume];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(PatError::invalid(format!(
                "bar {} has a negative or non-finite field",
                self.date
            )));
        }
        if self.high < self.low {
            return Err(PatError::invalid(format!(
                "bar {} has high {} below low {}",
                self.date, self.high, self.low
            )));
        }
        Ok(())
    }
}

/// Column view over a bar sequence, index-aligned with the bars.
#[derive(Debug, Clone, Default)]
pub struct Ohlcv {
    pub dates: Vec<NaiveDate>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Ohlcv {
    /// Split validated bars into columns.
    pub fn from_bars(bars: &[PriceBar]) -> Result<Self, PatError> {
        let mut out = Self {
            dates: Vec::with_capacity(bars.len()),
            open: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            bar.validate()?;
            out.dates.push(bar.date);
            out.open.push(bar.open);
            out.high.push(bar.high);
            out.low.push(bar.low);
            out.close.push(bar.close);
            out.volume.push(bar.volume);
        }
        Ok(out)
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    /// Typical price `(H + L + C) / 3` of row `i`.
    pub fn typical_price(&self, i: usize) -> f64 {
        (self.high[i] + self.low[i] + self.close[i]) / 3.0
    }

    /// Most recent close, if any.
    pub fn last_close(&self) -> Option<f64> {
        self.close.last().copied()
    }

    /// The first `len` rows, used for no-lookahead replays.
    pub fn head(&self, len: usize) -> Self {
        let n = len.min(self.len());
        Self {
            dates: self.dates[..n].to_vec(),
            open: self.open[..n].to_vec(),
            high: self.high[..n].to_vec(),
            low: self.low[..n].to_vec(),
            close: self.close[..n].to_vec(),
            volume: self.volume[..n].to_vec(),
        }
    }

    /// The last `len` rows.
    pub fn tail(&self, len: usize) -> Self {
        let start = self.len().saturating_sub(len);
        Self {
            dates: self.dates[start..].to_vec(),
            open: self.open[start..].to_vec(),
            high: self.high[start..].to_vec(),
            low: self.low[start..].to_vec(),
            close: self.close[start..].to_vec(),
            volume: self.volume[start..].to_vec(),
        }
    }
}

/// Call or put.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Call => write!(f, "call"),
            Self::Put => write!(f, "put"),
        }
    }
}

impl FromStr for OptionType {
    type Err = PatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "call" | "c" => Ok(Self::Call),
            "put" | "p" => Ok(Self::Put),
            other => Err(PatError::invalid(format!("unknown option type '{other}'"))),
        }
    }
}

/// A single quoted contract in a chain snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionQuote {
    pub strike: f64,
    pub option_type: OptionType,
    #[serde(default)]
    pub last_price: f64,
    #[serde(default)]
    pub bid: Option<f64>,
    #[serde(default)]
    pub ask: Option<f64>,
    #[serde(default)]
    pub implied_volatility: Option<f64>,
    #[serde(default)]
    pub volume: Option<f64>,
    #[serde(default)]
    pub open_interest: Option<f64>,
}

impl OptionQuote {
    /// Mid of a two-sided quote, otherwise the last trade.
    /// `None` when there is no positive price at all.
    pub fn market_price(&self) -> Option<f64> {
        match (self.bid, self.ask) {
            (Some(bid), Some(ask)) if bid > 0.0 && ask >= bid => Some((bid + ask) / 2.0),
            _ if self.last_price > 0.0 => Some(self.last_price),
            _ => None,
        }
    }

    /// Quoted IV if strictly positive.
    pub fn iv(&self) -> Option<f64> {
        self.implied_volatility.filter(|v| v.is_finite() && *v > 0.0)
    }
}

/// All quotes for one expiration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChain {
    pub expiration: NaiveDate,
    pub quotes: Vec<OptionQuote>,
}

impl OptionChain {
    pub fn calls(&self) -> impl Iterator<Item = &OptionQuote> {
        self.quotes
            .iter()
            .filter(|q| q.option_type == OptionType::Call)
    }

    pub fn puts(&self) -> impl Iterator<Item = &OptionQuote> {
        self.quotes.iter().filter(|q| q.option_type == OptionType::Put)
    }

    /// Calendar days from `today` to expiration (negative when expired).
    pub fn days_to_expiry(&self, today: NaiveDate) -> i64 {
        (self.expiration - today).num_days()
    }
}

/// Uppercase and validate a ticker symbol.
///
/// Accepts 1–12 characters from `A-Z0-9.-^=`.
pub fn normalize_symbol(raw: &str) -> Result<String, PatError> {
    let symbol = raw.trim().to_ascii_uppercase();
    let valid_chars = symbol
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '^' | '='));
    if symbol.is_empty() || symbol.len() > 12 || !valid_chars {
        return Err(PatError::invalid(format!("malformed symbol '{raw}'")));
    }
    Ok(symbol)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(day: u32, close: f64) -> PriceBar {
        PriceBar {
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high: close + 1.0,
            low: close - 1.0,
            close,
            volume: 1_000.0,
        }
    }

    #[test]
    fn test_ohlcv_from_bars_aligns_columns() {
        let bars = vec![bar(2, 10.0), bar(3, 11.0), bar(4, 12.0)];
        let ohlcv = Ohlcv::from_bars(&bars).unwrap();
        assert_eq!(ohlcv.len(), 3);
        assert_eq!(ohlcv.close, vec![10.0, 11.0, 12.0]);
        assert_eq!(ohlcv.high[1], 12.0);
        assert_eq!(ohlcv.last_close(), Some(12.0));
        assert_eq!(ohlcv.head(2).close, vec![10.0, 11.0]);
        assert_eq!(ohlcv.tail(2).close, vec![11.0, 12.0]);
    }

    #[test]
    fn test_typical_price_per_row() {
        let mut b = bar(2, 10.0);
        b.high = 14.0;
        b.low = 9.0;
        let ohlcv = Ohlcv::from_bars(&[bar(3, 20.0), b]).unwrap();
        assert!((ohlcv.typical_price(0) - 20.0).abs() < 1e-12);
        assert!((ohlcv.typical_price(1) - 11.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut bad = bar(2, 10.0);
        bad.close = -1.0;
        let err = Ohlcv::from_bars(&[bad]).unwrap_err();
        assert!(matches!(err, PatError::InvalidInput(_)));
    }

    #[test]
    fn test_high_below_low_rejected() {
        let mut bad = bar(2, 10.0);
        bad.high = 5.0;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_market_price_prefers_mid() {
        let mut q = OptionQuote {
            strike: 100.0,
            option_type: OptionType::Call,
            last_price: 5.0,
            bid: Some(4.0),
            ask: Some(4.4),
            implied_volatility: Some(0.3),
            volume: None,
            open_interest: None,
        };
        assert!((q.market_price().unwrap() - 4.2).abs() < 1e-12);
        q.bid = None;
        assert_eq!(q.market_price(), Some(5.0));
        q.last_price = 0.0;
        assert_eq!(q.market_price(), None);
    }

    #[test]
    fn test_option_type_parse() {
        assert_eq!("CALL".parse::<OptionType>().unwrap(), OptionType::Call);
        assert_eq!("p".parse::<OptionType>().unwrap(), OptionType::Put);
        assert!("straddle".parse::<OptionType>().is_err());
    }

    #[test]
    fn test_normalize_symbol() {
        assert_eq!(normalize_symbol(" aapl ").unwrap(), "AAPL");
        assert_eq!(normalize_symbol("brk.b").unwrap(), "BRK.B");
        assert!(normalize_symbol("").is_err());
        assert!(normalize_symbol("AA PL").is_err());
        assert!(normalize_symbol("../etc").is_err());
    }

    #[test]
    fn test_chain_days_to_expiry() {
        let chain = OptionChain {
            expiration: NaiveDate::from_ymd_opt(2025, 1, 17).unwrap(),
            quotes: vec![],
        };
        let today = NaiveDate::from_ymd_opt(2024, 12, 18).unwrap();
        assert_eq!(chain.days_to_expiry(today), 30);
    }
}
