//! Monte Carlo portfolio optimization over the long-only weight simplex.
//!
//! Weight vectors are drawn uniformly from the simplex (normalized unit
//! exponentials, i.e. Dirichlet(1, …, 1)) on a seeded RNG, then evaluated in
//! parallel against the sample mean/covariance of daily returns. From the
//! cloud we pick the max-Sharpe and min-variance portfolios and an efficient
//! frontier envelope. Risk parity is computed directly as inverse-volatility
//! weights rather than sampled.

use std::collections::BTreeMap;

use pat_core::config::OptimizerConfig;
use pat_core::PatError;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Exp1;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::metrics::{ReturnsMatrix, TRADING_DAYS};

/// Minimum daily observations per asset for a covariance estimate.
pub const MIN_OBSERVATIONS: usize = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioPoint {
    pub weights: BTreeMap<String, f64>,
    /// Annualized.
    pub expected_return: f64,
    /// Annualized.
    pub volatility: f64,
    pub sharpe_ratio: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub symbols: Vec<String>,
    pub n_portfolios: usize,
    /// Seed actually used, so any run can be replayed.
    pub seed: u64,
    pub max_sharpe: PortfolioPoint,
    pub min_variance: PortfolioPoint,
    /// `None` when an asset has zero volatility.
    pub risk_parity: Option<PortfolioPoint>,
    /// Ascending in volatility and in return.
    pub frontier: Vec<PortfolioPoint>,
}

/// Daily mean vector and sample covariance matrix.
#[derive(Debug, Clone)]
pub struct ReturnModel {
    pub symbols: Vec<String>,
    pub mean: Vec<f64>,
    pub covariance: Vec<Vec<f64>>,
}

impl ReturnModel {
    pub fn from_returns(matrix: &ReturnsMatrix) -> Result<Self, PatError> {
        let n_assets = matrix.returns.len();
        if n_assets == 0 || matrix.symbols.len() != n_assets {
            return Err(PatError::invalid("portfolio has no assets"));
        }
        let len = matrix.returns[0].len();
        if matrix.returns.iter().any(|r| r.len() != len) {
            return Err(PatError::invalid("return series have mismatched lengths"));
        }
        if len < MIN_OBSERVATIONS {
            return Err(PatError::invalid(format!(
                "need at least {MIN_OBSERVATIONS} return observations, got {len}"
            )));
        }

        let mean: Vec<f64> = matrix
            .returns
            .iter()
            .map(|r| r.iter().sum::<f64>() / len as f64)
            .collect();
        let mut covariance = vec![vec![0.0; n_assets]; n_assets];
        for i in 0..n_assets {
            for j in i..n_assets {
                let c = (0..len)
                    .map(|t| (matrix.returns[i][t] - mean[i]) * (matrix.returns[j][t] - mean[j]))
                    .sum::<f64>()
                    / (len - 1) as f64;
                covariance[i][j] = c;
                covariance[j][i] = c;
            }
        }
        Ok(Self {
            symbols: matrix.symbols.clone(),
            mean,
            covariance,
        })
    }

    pub fn n_assets(&self) -> usize {
        self.mean.len()
    }

    /// Annualized (return, volatility) of a weight vector.
    pub fn evaluate(&self, weights: &[f64]) -> (f64, f64) {
        let ret = TRADING_DAYS * weights.iter().zip(&self.mean).map(|(w, m)| w * m).sum::<f64>();
        let mut var = 0.0;
        for (i, wi) in weights.iter().enumerate() {
            for (j, wj) in weights.iter().enumerate() {
                var += wi * wj * self.covariance[i][j];
            }
        }
        (ret, (TRADING_DAYS * var.max(0.0)).sqrt())
    }

    fn point(&self, weights: &[f64], risk_free_rate: f64) -> PortfolioPoint {
        let (expected_return, volatility) = self.evaluate(weights);
        PortfolioPoint {
            weights: self
                .symbols
                .iter()
                .cloned()
                .zip(weights.iter().copied())
                .collect(),
            expected_return,
            volatility,
            sharpe_ratio: sharpe(expected_return, volatility, risk_free_rate),
        }
    }
}

fn sharpe(ret: f64, vol: f64, risk_free_rate: f64) -> f64 {
    if vol > 0.0 {
        (ret - risk_free_rate) / vol
    } else {
        0.0
    }
}

/// Draw `count` weight vectors uniformly from the `n_assets`-simplex.
pub fn sample_portfolios<R: Rng>(n_assets: usize, count: usize, rng: &mut R) -> Vec<Vec<f64>> {
    (0..count)
        .map(|_| {
            let draws: Vec<f64> = (0..n_assets).map(|_| rng.sample::<f64, _>(Exp1)).collect();
            let total: f64 = draws.iter().sum();
            if total > 0.0 {
                draws.iter().map(|d| d / total).collect()
            } else {
                vec![1.0 / n_assets as f64; n_assets]
            }
        })
        .collect()
}

/// Inverse-volatility weights. `None` if any asset has zero variance.
pub fn risk_parity(model: &ReturnModel, risk_free_rate: f64) -> Option<PortfolioPoint> {
    let inverse: Vec<f64> = (0..model.n_assets())
        .map(|i| model.covariance[i][i].sqrt())
        .map(|sd| if sd > 0.0 { 1.0 / sd } else { f64::NAN })
        .collect();
    if inverse.iter().any(|v| !v.is_finite()) {
        warn!("optimizer: zero-volatility asset, risk parity undefined");
        return None;
    }
    let total: f64 = inverse.iter().sum();
    let weights: Vec<f64> = inverse.iter().map(|v| v / total).collect();
    Some(model.point(&weights, risk_free_rate))
}

/// Upper-left envelope of the cloud: the best return in each of `buckets`
/// equal-width volatility bins, then only points that improve on every
/// lower-volatility point.
pub fn efficient_frontier(points: &[PortfolioPoint], buckets: usize) -> Vec<PortfolioPoint> {
    let buckets = buckets.max(1);
    let (Some(min_vol), Some(max_vol)) = (
        points.iter().map(|p| p.volatility).min_by(f64::total_cmp),
        points.iter().map(|p| p.volatility).max_by(f64::total_cmp),
    ) else {
        return Vec::new();
    };
    let width = (max_vol - min_vol) / buckets as f64;

    let mut best: Vec<Option<&PortfolioPoint>> = vec![None; buckets];
    for p in points {
        let idx = if width > 0.0 {
            (((p.volatility - min_vol) / width) as usize).min(buckets - 1)
        } else {
            0
        };
        if best[idx].map_or(true, |b| p.expected_return > b.expected_return) {
            best[idx] = Some(p);
        }
    }

    let mut frontier = Vec::new();
    let mut top = f64::NEG_INFINITY;
    for p in best.into_iter().flatten() {
        if p.expected_return > top {
            top = p.expected_return;
            frontier.push(p.clone());
        }
    }
    frontier
}

/// Run the full optimization over aligned daily returns.
pub fn optimize_portfolio(
    matrix: &ReturnsMatrix,
    config: &OptimizerConfig,
) -> Result<OptimizationResult, PatError> {
    let model = ReturnModel::from_returns(matrix)?;
    if config.n_portfolios == 0 {
        return Err(PatError::invalid("n_portfolios must be at least 1"));
    }
    let seed = config.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);

    let weights = sample_portfolios(model.n_assets(), config.n_portfolios, &mut rng);
    let points: Vec<PortfolioPoint> = weights
        .par_iter()
        .map(|w| model.point(w, config.risk_free_rate))
        .collect();

    let max_sharpe = points
        .iter()
        .max_by(|a, b| a.sharpe_ratio.total_cmp(&b.sharpe_ratio))
        .cloned()
        .ok_or_else(|| PatError::invalid("no portfolios sampled"))?;
    let min_variance = points
        .iter()
        .min_by(|a, b| a.volatility.total_cmp(&b.volatility))
        .cloned()
        .ok_or_else(|| PatError::invalid("no portfolios sampled"))?;
    let frontier = efficient_frontier(&points, config.frontier_points);

    info!(
        "optimizer: {} assets, {} samples, seed {seed}, max sharpe {:.3}, min vol {:.4}",
        model.n_assets(),
        points.len(),
        max_sharpe.sharpe_ratio,
        min_variance.volatility
    );

    Ok(OptimizationResult {
        symbols: model.symbols.clone(),
        n_portfolios: points.len(),
        seed,
        max_sharpe,
        min_variance,
        risk_parity: risk_parity(&model, config.risk_free_rate),
        frontier,
    })
}
