//! Return series and performance statistics for the portfolio optimizer.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use pat_core::market::PriceBar;
use pat_core::PatError;

pub const TRADING_DAYS: f64 = 252.0;

/// Simple period-over-period returns. Periods starting at a zero price are skipped.
pub fn daily_returns(prices: &[f64]) -> Vec<f64> {
    prices
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect()
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation (n − 1).
pub fn std_dev(values: &[f64]) -> Option<f64> {
    if values.len() < 2 {
        return None;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    Some(var.sqrt())
}

/// Annualized Sharpe ratio of per-period `returns` against an annual `risk_free_rate`.
///
/// `None` with fewer than two observations or zero dispersion.
pub fn sharpe_ratio(returns: &[f64], risk_free_rate: f64, periods_per_year: f64) -> Option<f64> {
    let sd = std_dev(returns)?;
    if sd == 0.0 {
        return None;
    }
    let excess = mean(returns) - risk_free_rate / periods_per_year;
    Some(excess / sd * periods_per_year.sqrt())
}

/// Largest peak-to-trough decline as a negative fraction (`-0.2` is 20% down).
pub fn max_drawdown(prices: &[f64]) -> Option<f64> {
    let first = *prices.first()?;
    let mut peak = first;
    let mut worst: f64 = 0.0;
    for &p in prices {
        peak = peak.max(p);
        if peak > 0.0 {
            worst = worst.min(p / peak - 1.0);
        }
    }
    Some(worst)
}

/// Compound annual growth rate over `years`.
pub fn cagr(start_value: f64, end_value: f64, years: f64) -> Option<f64> {
    if start_value <= 0.0 || end_value < 0.0 || years <= 0.0 {
        return None;
    }
    Some((end_value / start_value).powf(1.0 / years) - 1.0)
}

/// Per-symbol daily returns over the dates all symbols share.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsMatrix {
    pub symbols: Vec<String>,
    /// `returns[i]` is the series for `symbols[i]`; all series share one length.
    pub returns: Vec<Vec<f64>>,
}

/// Align closes on common dates, then convert each series to returns.
pub fn align_returns(histories: &[(String, Vec<PriceBar>)]) -> Result<ReturnsMatrix, PatError> {
    if histories.is_empty() {
        return Err(PatError::invalid("no symbols supplied"));
    }
    let by_date: Vec<BTreeMap<NaiveDate, f64>> = histories
        .iter()
        .map(|(_, bars)| bars.iter().map(|b| (b.date, b.close)).collect())
        .collect();

    let mut common: BTreeSet<NaiveDate> = by_date[0].keys().copied().collect();
    for series in &by_date[1..] {
        common.retain(|d| series.contains_key(d));
    }
    if common.len() < 3 {
        return Err(PatError::invalid(format!(
            "only {} overlapping dates across {} symbols",
            common.len(),
            histories.len()
        )));
    }

    let returns = by_date
        .iter()
        .map(|series| {
            let closes: Vec<f64> = common.iter().filter_map(|d| series.get(d).copied()).collect();
            closes.windows(2).map(|w| w[1] / w[0] - 1.0).collect()
        })
        .collect::<Vec<Vec<f64>>>();
    if returns.iter().flatten().any(|r| !r.is_finite()) {
        return Err(PatError::invalid("non-positive close in aligned history"));
    }

    Ok(ReturnsMatrix {
        symbols: histories.iter().map(|(s, _)| s.clone()).collect(),
        returns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_daily_returns() {
        let r = daily_returns(&[100.0, 110.0, 99.0]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.1).abs() < 1e-12);
        assert!((r[1] + 0.1).abs() < 1e-12);
        assert!(daily_returns(&[100.0]).is_empty());
    }

    #[test]
    fn test_sharpe_ratio() {
        let returns = [0.01, -0.005, 0.012, 0.003, -0.002];
        let s = sharpe_ratio(&returns, 0.0, TRADING_DAYS).unwrap();
        let expected = mean(&returns) / std_dev(&returns).unwrap() * TRADING_DAYS.sqrt();
        assert!((s - expected).abs() < 1e-12);
        assert!(sharpe_ratio(&[0.01, 0.01, 0.01], 0.0, TRADING_DAYS).is_none());
        assert!(sharpe_ratio(&[0.01], 0.0, TRADING_DAYS).is_none());
    }

    #[test]
    fn test_max_drawdown() {
        let dd = max_drawdown(&[100.0, 120.0, 90.0, 130.0, 117.0]).unwrap();
        assert!((dd + 0.25).abs() < 1e-12);
        assert_eq!(max_drawdown(&[1.0, 2.0, 3.0]), Some(0.0));
        assert_eq!(max_drawdown(&[]), None);
    }

    #[test]
    fn test_cagr() {
        let g = cagr(100.0, 121.0, 2.0).unwrap();
        assert!((g - 0.1).abs() < 1e-12);
        assert!(cagr(0.0, 10.0, 1.0).is_none());
        assert!(cagr(10.0, 10.0, 0.0).is_none());
    }

    fn bars(days: &[u32], closes: &[f64]) -> Vec<PriceBar> {
        days.iter()
            .zip(closes)
            .map(|(&d, &c)| PriceBar {
                date: NaiveDate::from_ymd_opt(2024, 3, d).unwrap(),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 0.0,
            })
            .collect()
    }

    #[test]
    fn test_align_returns_intersects_dates() {
        let histories = vec![
            ("AAA".to_string(), bars(&[1, 4, 5, 6, 7], &[10.0, 11.0, 12.0, 12.0, 13.0])),
            ("BBB".to_string(), bars(&[4, 5, 6, 7, 8], &[20.0, 22.0, 11.0, 11.0, 50.0])),
        ];
        let m = align_returns(&histories).unwrap();
        assert_eq!(m.symbols, vec!["AAA", "BBB"]);
        // Common dates 4..=7 → three returns each.
        assert_eq!(m.returns[0].len(), 3);
        assert_eq!(m.returns[1].len(), 3);
        assert!((m.returns[1][1] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_align_returns_rejects_sparse_overlap() {
        let histories = vec![
            ("AAA".to_string(), bars(&[1, 2, 3], &[1.0, 2.0, 3.0])),
            ("BBB".to_string(), bars(&[3, 4, 5], &[1.0, 2.0, 3.0])),
        ];
        assert!(align_returns(&histories).is_err());
        assert!(align_returns(&[]).is_err());
    }
}
