
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use crate::error::PatError;

/// Top-level PAT configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub pat: PatConfig,
    #[serde(default)]
    pub signals: SignalsConfig,
    #[serde(default)]
    pub risk: RiskConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatConfig {
    /// Directory holding `<SYMBOL>.bars.json` and friends.
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for PatConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            log_level: default_log_level(),
        }
    }
}

/// Composite weights, one per evaluator.
///
/// Passed explicitly into the aggregator so alternate schemes can be
/// tested without touching shared state. Canonical weights sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalWeights {
    pub ma_crossover: f64,
    pub rsi: f64,
    pub macd: f64,
    pub bollinger: f64,
    pub mean_reversion: f64,
    pub trend: f64,
    pub volume: f64,
    pub adx: f64,
    pub stochastic: f64,
    pub ad_line: f64,
    pub cmf: f64,
    pub put_call_ratio: f64,
}

impl Default for SignalWeights {
    fn default() -> Self {
        Self {
            ma_crossover: 0.10,
            rsi: 0.10,
            macd: 0.10,
            bollinger: 0.07,
            mean_reversion: 0.07,
            trend: 0.12,
            volume: 0.08,
            adx: 0.10,
            stochastic: 0.08,
            ad_line: 0.06,
            cmf: 0.07,
            put_call_ratio: 0.05,
        }
    }
}

impl SignalWeights {
    /// Sum of all weights.
    pub fn total(&self) -> f64 {
        self.ma_crossover
            + self.rsi
            + self.macd
            + self.bollinger
            + self.mean_reversion
            + self.trend
            + self.volume
            + self.adx
            + self.stochastic
            + self.ad_line
            + self.cmf
            + self.put_call_ratio
    }

    /// Reject negative or all-zero weight tables.
    pub fn validate(&self) -> Result<(), PatError> {
        let total = self.total();
        if !total.is_finite() || total <= 0.0 {
            return Err(PatError::Config(format!(
                "signal weights must sum to a positive value, got {total}"
            )));
        }
        if [
            self.ma_crossover,
            self.rsi,
            self.macd,
            self.bollinger,
            self.mean_reversion,
            self.trend,
            self.volume,
            self.adx,
            self.stochastic,
            self.ad_line,
            self.cmf,
            self.put_call_ratio,
        ]
        .iter()
        .any(|w| *w < 0.0)
        {
            return Err(PatError::Config("signal weights must be >= 0".into()));
        }
        Ok(())
    }
}

/// Composite signal thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsConfig {
    #[serde(default)]
    pub weights: SignalWeights,
    /// Composite score at or above which the direction is `buy`.
    #[serde(default = "default_buy_threshold")]
    pub buy_threshold: f64,
    /// Composite score at or below which the direction is `sell`.
    #[serde(default = "default_sell_threshold")]
    pub sell_threshold: f64,
    /// Scores with magnitude at or below this count as neutral for confidence.
    #[serde(default = "default_neutral_band")]
    pub neutral_band: f64,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            weights: SignalWeights::default(),
            buy_threshold: default_buy_threshold(),
            sell_threshold: default_sell_threshold(),
            neutral_band: default_neutral_band(),
        }
    }
}

/// Position sizing and stop placement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    #[serde(default = "default_portfolio_value")]
    pub portfolio_value: f64,
    /// Fraction of the portfolio risked on a trade at zero conviction.
    #[serde(default = "default_min_risk_pct")]
    pub min_risk_pct: f64,
    /// Fraction of the portfolio risked on a trade at full conviction.
    #[serde(default = "default_max_risk_pct")]
    pub max_risk_pct: f64,
    /// Stop distance in ATRs.
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,
    /// Target distance as a multiple of the stop distance.
    #[serde(default = "default_reward_multiple")]
    pub reward_multiple: f64,
    /// Fraction of full Kelly to apply (0.5 = half-Kelly).
    #[serde(default = "default_kelly_fraction")]
    pub kelly_fraction: f64,
    /// Hard cap on the Kelly allocation as a fraction of the portfolio.
    #[serde(default = "default_kelly_cap")]
    pub kelly_cap: f64,
    /// Historical win rate. `None` disables Kelly-based sizing.
    #[serde(default = "default_win_rate")]
    pub win_rate: Option<f64>,
    /// Average win / average loss.
    #[serde(default = "default_payoff_ratio")]
    pub payoff_ratio: Option<f64>,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            portfolio_value: default_portfolio_value(),
            min_risk_pct: default_min_risk_pct(),
            max_risk_pct: default_max_risk_pct(),
            atr_multiplier: default_atr_multiplier(),
            reward_multiple: default_reward_multiple(),
            kelly_fraction: default_kelly_fraction(),
            kelly_cap: default_kelly_cap(),
            win_rate: default_win_rate(),
            payoff_ratio: default_payoff_ratio(),
        }
    }
}

/// Options analytics parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptionsConfig {
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default)]
    pub dividend_yield: f64,
    /// Moneyness band (±) used for skew.
    #[serde(default = "default_skew_band")]
    pub skew_band: f64,
    /// Trading days of IV history used for rank/percentile.
    #[serde(default = "default_iv_history_days")]
    pub iv_history_days: usize,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: default_risk_free_rate(),
            dividend_yield: 0.0,
            skew_band: default_skew_band(),
            iv_history_days: default_iv_history_days(),
        }
    }
}

/// Monte Carlo optimizer parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    #[serde(default = "default_n_portfolios")]
    pub n_portfolios: usize,
    #[serde(default = "default_frontier_points")]
    pub frontier_points: usize,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    /// Fixed sampler seed. `None` draws a fresh seed per run.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            n_portfolios: default_n_portfolios(),
            frontier_points: default_frontier_points(),
            risk_free_rate: default_risk_free_rate(),
            seed: None,
        }
    }
}

// --- Defaults ---

fn default_data_dir() -> String {
    "~/.pat/data".into()
}
fn default_log_level() -> String {
    "info".into()
}
fn default_buy_threshold() -> f64 {
    0.2
}
fn default_sell_threshold() -> f64 {
    -0.2
}
fn default_neutral_band() -> f64 {
    0.1
}
fn default_portfolio_value() -> f64 {
    100_000.0
}
fn default_min_risk_pct() -> f64 {
    0.01
}
fn default_max_risk_pct() -> f64 {
    0.02
}
fn default_atr_multiplier() -> f64 {
    2.0
}
fn default_reward_multiple() -> f64 {
    2.0
}
fn default_kelly_fraction() -> f64 {
    0.5
}
fn default_kelly_cap() -> f64 {
    0.25
}
fn default_win_rate() -> Option<f64> {
    Some(0.55)
}
fn default_payoff_ratio() -> Option<f64> {
    Some(1.5)
}
fn default_risk_free_rate() -> f64 {
    0.045
}
fn default_skew_band() -> f64 {
    0.20
}
fn default_iv_history_days() -> usize {
    252
}
fn default_n_portfolios() -> usize {
    5_000
}
fn default_frontier_points() -> usize {
    30
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, PatError> {
    let path = Path::new(path);
    if !path.exists() {
        info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| PatError::Config(format!("failed to read {}: {}", path.display(), e)))?;

    parse(&content)
}

/// Parse and validate configuration from a TOML string.
pub fn parse(content: &str) -> Result<Config, PatError> {
    let config: Config = toml::from_str(content)
        .map_err(|e| PatError::Config(format!("failed to parse config: {}", e)))?;

    config.signals.weights.validate()?;
    if config.risk.max_risk_pct < config.risk.min_risk_pct {
        return Err(PatError::Config(format!(
            "risk.max_risk_pct ({}) is below risk.min_risk_pct ({})",
            config.risk.max_risk_pct, config.risk.min_risk_pct
        )));
    }
    if config.optimizer.n_portfolios == 0 {
        return Err(PatError::Config(
            "optimizer.n_portfolios must be at least 1".into(),
        ));
    }

    Ok(config)
}
