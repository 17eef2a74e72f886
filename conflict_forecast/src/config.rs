//! Engine configuration
//!
//! Every field has a default, so an empty TOML document is a valid configuration:
//!
//! ```toml
//! model_version = "ensemble-v1"
//! fit_timeout_ms = 5000
//!
//! [aggregation]
//! granularity = "daily"
//! min_nonzero_periods = 10
//!
//! [ensemble]
//! seasonal = 0.5
//! autoregressive = 0.3
//! linear = 0.2
//!
//! [risk.thresholds]
//! medium = 1.0
//! high = 1.5
//! critical = 2.5
//! ```

use crate::data::Granularity;
use crate::ensemble::EnsembleWeights;
use crate::error::{ForecastError, Result};
use crate::risk::RiskThresholds;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Top-level configuration for the forecasting engine
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Label stored with every prediction and used in cache keys
    pub model_version: String,
    /// Coverage of the reported intervals
    pub confidence_level: f64,
    /// Budget for each constituent fit
    pub fit_timeout_ms: u64,
    /// Horizon used when ranking locations
    pub default_horizon_days: u32,
    /// Ranking worker pool size, 0 for one per CPU core
    pub worker_threads: usize,
    pub aggregation: AggregationConfig,
    pub seasonal: SeasonalConfig,
    pub autoregressive: AutoregressiveConfig,
    pub ensemble: EnsembleConfig,
    pub backtest: BacktestConfig,
    pub risk: RiskConfig,
    pub cache: CacheConfig,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            model_version: "ensemble-v1".to_string(),
            confidence_level: 0.95,
            fit_timeout_ms: 5_000,
            default_horizon_days: 30,
            worker_threads: 0,
            aggregation: AggregationConfig::default(),
            seasonal: SeasonalConfig::default(),
            autoregressive: AutoregressiveConfig::default(),
            ensemble: EnsembleConfig::default(),
            backtest: BacktestConfig::default(),
            risk: RiskConfig::default(),
            cache: CacheConfig::default(),
        }
    }
}

impl ForecastConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ForecastConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|e| {
            ForecastError::ConfigError(format!("reading {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Reject settings no engine could run with
    pub fn validate(&self) -> Result<()> {
        if self.model_version.trim().is_empty() {
            return Err(ForecastError::ValidationError(
                "model_version must not be empty".to_string(),
            ));
        }
        if !(self.confidence_level > 0.0 && self.confidence_level < 1.0) {
            return Err(ForecastError::ValidationError(format!(
                "confidence_level must be in (0, 1), got {}",
                self.confidence_level
            )));
        }
        if self.fit_timeout_ms == 0 {
            return Err(ForecastError::ValidationError(
                "fit_timeout_ms must be positive".to_string(),
            ));
        }
        if self.default_horizon_days == 0 {
            return Err(ForecastError::ValidationError(
                "default_horizon_days must be positive".to_string(),
            ));
        }
        if self.aggregation.min_nonzero_periods == 0 {
            return Err(ForecastError::ValidationError(
                "aggregation.min_nonzero_periods must be positive".to_string(),
            ));
        }
        if let Some(period) = self.seasonal.period {
            if period < 2 {
                return Err(ForecastError::ValidationError(format!(
                    "seasonal.period must be at least 2, got {}",
                    period
                )));
            }
        }
        if !(self.seasonal.changepoint_range > 0.0 && self.seasonal.changepoint_range <= 1.0) {
            return Err(ForecastError::ValidationError(format!(
                "seasonal.changepoint_range must be in (0, 1], got {}",
                self.seasonal.changepoint_range
            )));
        }
        if !(self.seasonal.interval_growth >= 0.0) {
            return Err(ForecastError::ValidationError(
                "seasonal.interval_growth must be non-negative".to_string(),
            ));
        }
        if self.autoregressive.max_differences > 2 {
            return Err(ForecastError::ValidationError(format!(
                "autoregressive.max_differences is capped at 2, got {}",
                self.autoregressive.max_differences
            )));
        }
        self.ensemble.weights()?;
        if !(self.ensemble.min_half_width > 0.0) {
            return Err(ForecastError::ValidationError(
                "ensemble.min_half_width must be positive".to_string(),
            ));
        }
        if self.backtest.min_train_periods < 3 {
            return Err(ForecastError::ValidationError(
                "backtest.min_train_periods must be at least 3".to_string(),
            ));
        }
        if self.risk.recent_window_days == 0 {
            return Err(ForecastError::ValidationError(
                "risk.recent_window_days must be positive".to_string(),
            ));
        }
        if !(self.risk.fatality_weight >= 0.0) {
            return Err(ForecastError::ValidationError(
                "risk.fatality_weight must be non-negative".to_string(),
            ));
        }
        self.risk.thresholds.validate()?;
        if self.cache.ttl_secs == 0 {
            return Err(ForecastError::ValidationError(
                "cache.ttl_secs must be positive".to_string(),
            ));
        }
        if self.cache.refresh_ahead_secs >= self.cache.ttl_secs {
            return Err(ForecastError::ValidationError(
                "cache.refresh_ahead_secs must be shorter than the TTL".to_string(),
            ));
        }
        Ok(())
    }
}

/// How raw events become a series
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub granularity: Granularity,
    /// Series with fewer non-zero periods are rejected
    pub min_nonzero_periods: usize,
    /// Ignore events older than this many days before the end of the history
    pub history_window_days: Option<u32>,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            granularity: Granularity::Daily,
            min_nonzero_periods: 10,
            history_window_days: Some(730),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SeasonalConfig {
    /// Fixed seasonal period; detected from the data when absent
    pub period: Option<usize>,
    /// Longest period considered during detection
    pub max_period: usize,
    /// Minimum autocorrelation for a detected period
    pub min_autocorrelation: f64,
    pub max_changepoints: usize,
    /// Fraction of the history eligible for changepoints
    pub changepoint_range: f64,
    pub penalty_scale: f64,
    /// Relative interval widening per forecast step
    pub interval_growth: f64,
    /// Trend/seasonal refinement passes
    pub iterations: usize,
}

impl Default for SeasonalConfig {
    fn default() -> Self {
        Self {
            period: None,
            max_period: 60,
            min_autocorrelation: 0.3,
            max_changepoints: 5,
            changepoint_range: 0.8,
            penalty_scale: 1.0,
            interval_growth: 0.05,
            iterations: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AutoregressiveConfig {
    pub max_p: usize,
    pub max_q: usize,
    pub max_differences: usize,
    /// Lag cap for the unit-root test; rule of thumb when absent
    pub adf_max_lags: Option<usize>,
    /// Optimizer iteration budget per candidate order
    pub max_iterations: usize,
}

impl Default for AutoregressiveConfig {
    fn default() -> Self {
        Self {
            max_p: 3,
            max_q: 3,
            max_differences: 2,
            adf_max_lags: None,
            max_iterations: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EnsembleConfig {
    pub seasonal: f64,
    pub autoregressive: f64,
    pub linear: f64,
    /// Floor on the combined interval half-width, in incidents
    pub min_half_width: f64,
}

impl Default for EnsembleConfig {
    fn default() -> Self {
        Self {
            seasonal: 0.5,
            autoregressive: 0.3,
            linear: 0.2,
            min_half_width: 0.5,
        }
    }
}

impl EnsembleConfig {
    /// Validated weights
    pub fn weights(&self) -> Result<EnsembleWeights> {
        EnsembleWeights::new(self.seasonal, self.autoregressive, self.linear)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub enabled: bool,
    /// Rolling origins to evaluate
    pub folds: usize,
    /// Shortest training prefix a fold may use
    pub min_train_periods: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            folds: 3,
            min_train_periods: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    /// Days making up the recent incident rate
    pub recent_window_days: u32,
    pub thresholds: RiskThresholds,
    /// Score multiplier per projected fatality per horizon day
    pub fatality_weight: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 30,
            thresholds: RiskThresholds::default(),
            fatality_weight: 0.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    /// Entries this close to expiry are refreshed ahead of time
    pub refresh_ahead_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 6 * 60 * 60,
            refresh_ahead_secs: 10 * 60,
        }
    }
}
