//! Forecasting models for incident series
//!
//! The three constituent forecasters form a closed set. [`Forecaster`] dispatches to
//! them; each fit returns a new, immutable [`ModelFitResult`].

use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::time::{Duration, Instant};

pub mod autoregressive;
pub mod linear_trend;
pub mod seasonal_trend;

pub use autoregressive::AutoregressiveForecaster;
pub use linear_trend::LinearTrendForecaster;
pub use seasonal_trend::SeasonalTrendForecaster;

/// One forecast period with its interval
///
/// Always satisfies `lower_bound <= point_estimate <= upper_bound` and
/// `point_estimate >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    period_start: NaiveDate,
    point_estimate: f64,
    lower_bound: f64,
    upper_bound: f64,
}

impl ForecastPoint {
    /// Build a point from a raw estimate and a symmetric half-width.
    ///
    /// Incident counts cannot be negative, so the estimate and lower bound are clamped
    /// at zero; the upper bound never drops below the estimate.
    pub fn new(period_start: NaiveDate, estimate: f64, half_width: f64) -> Result<Self> {
        if !estimate.is_finite() || !half_width.is_finite() {
            return Err(ForecastError::ValidationError(format!(
                "Non-finite forecast for {}: estimate {}, half-width {}",
                period_start, estimate, half_width
            )));
        }
        let half_width = half_width.abs();
        let point_estimate = estimate.max(0.0);
        let lower_bound = (estimate - half_width).max(0.0).min(point_estimate);
        let upper_bound = (estimate + half_width).max(point_estimate);

        Ok(Self {
            period_start,
            point_estimate,
            lower_bound,
            upper_bound,
        })
    }

    /// Extend the upper bound until the interval is at least `width` wide
    pub fn with_min_width(mut self, width: f64) -> Self {
        if width.is_finite() && self.width() < width {
            self.upper_bound = self.lower_bound + width;
        }
        self
    }

    pub fn period_start(&self) -> NaiveDate {
        self.period_start
    }

    pub fn point_estimate(&self) -> f64 {
        self.point_estimate
    }

    pub fn lower_bound(&self) -> f64 {
        self.lower_bound
    }

    pub fn upper_bound(&self) -> f64 {
        self.upper_bound
    }

    pub fn width(&self) -> f64 {
        self.upper_bound - self.lower_bound
    }

    pub fn half_width(&self) -> f64 {
        self.width() / 2.0
    }
}

/// The constituent forecaster variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    SeasonalTrend,
    Autoregressive,
    LinearTrend,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::SeasonalTrend,
        ModelKind::Autoregressive,
        ModelKind::LinearTrend,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::SeasonalTrend => "seasonal_trend",
            ModelKind::Autoregressive => "autoregressive",
            ModelKind::LinearTrend => "linear_trend",
        }
    }
}

impl std::fmt::Display for ModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fitted parameters, one variant per forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum ModelParameters {
    SeasonalTrend {
        intercept: f64,
        base_slope: f64,
        final_slope: f64,
        changepoints: Vec<usize>,
        /// `None` when the history was too short for a seasonal component
        period: Option<usize>,
        seasonal_profile: Vec<f64>,
        residual_std: f64,
    },
    Autoregressive {
        p: usize,
        d: usize,
        q: usize,
        intercept: f64,
        ar: Vec<f64>,
        ma: Vec<f64>,
        aic: f64,
        sigma2: f64,
    },
    LinearTrend {
        slope: f64,
        intercept: f64,
        residual_std_error: f64,
        r_squared: f64,
    },
}

/// Immutable snapshot of one forecaster fit
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelFitResult {
    kind: ModelKind,
    parameters: ModelParameters,
    points: Vec<ForecastPoint>,
    fit_timestamp: DateTime<Utc>,
    converged: bool,
    fallback: Option<ModelKind>,
}

impl ModelFitResult {
    pub fn new(
        kind: ModelKind,
        parameters: ModelParameters,
        points: Vec<ForecastPoint>,
        converged: bool,
    ) -> Self {
        Self {
            kind,
            parameters,
            points,
            fit_timestamp: Utc::now(),
            converged,
            fallback: None,
        }
    }

    /// Re-label another forecaster's output as this variant's fallback
    pub fn substitute(kind: ModelKind, fallback: ModelFitResult) -> Self {
        Self {
            kind,
            fallback: Some(fallback.kind),
            converged: false,
            ..fallback
        }
    }

    pub fn kind(&self) -> ModelKind {
        self.kind
    }

    pub fn parameters(&self) -> &ModelParameters {
        &self.parameters
    }

    pub fn points(&self) -> &[ForecastPoint] {
        &self.points
    }

    pub fn horizon(&self) -> usize {
        self.points.len()
    }

    pub fn fit_timestamp(&self) -> DateTime<Utc> {
        self.fit_timestamp
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    /// The forecaster whose output stands in for this one, if any
    pub fn fallback(&self) -> Option<ModelKind> {
        self.fallback
    }

    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }

    pub fn point_estimates(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.point_estimate()).collect()
    }
}

/// Wall-clock budget for one fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitDeadline {
    at: Instant,
    budget_ms: u64,
}

impl FitDeadline {
    /// A deadline `budget_ms` from now
    pub fn after_ms(budget_ms: u64) -> Self {
        Self {
            at: Instant::now() + Duration::from_millis(budget_ms),
            budget_ms,
        }
    }

    pub fn at(&self) -> Instant {
        self.at
    }

    pub fn budget_ms(&self) -> u64 {
        self.budget_ms
    }

    pub fn has_passed(&self) -> bool {
        Instant::now() >= self.at
    }

    /// Fail with a timeout for `kind` once the deadline has passed
    pub fn check(&self, kind: ModelKind) -> Result<()> {
        if self.has_passed() {
            return Err(ForecastError::Timeout {
                model: kind.to_string(),
                budget_ms: self.budget_ms,
            });
        }
        Ok(())
    }
}

/// Forecast model that can be fitted to an incident series
pub trait ForecastModel: Debug + Send + Sync {
    /// Which variant this model is
    fn kind(&self) -> ModelKind;

    /// Fit to `series` and forecast `horizon` periods past its end
    fn fit(&self, series: &TimeSeries, horizon: usize) -> Result<ModelFitResult>;

    fn name(&self) -> &str {
        self.kind().name()
    }
}

/// Closed set of constituent forecasters
#[derive(Debug, Clone)]
pub enum Forecaster {
    SeasonalTrend(SeasonalTrendForecaster),
    Autoregressive(AutoregressiveForecaster),
    LinearTrend(LinearTrendForecaster),
}

impl Forecaster {
    /// Bound the iterative parts of the fit by `deadline`.
    ///
    /// The linear trend is closed form and ignores it.
    pub fn with_deadline(self, deadline: FitDeadline) -> Self {
        match self {
            Forecaster::SeasonalTrend(model) => {
                Forecaster::SeasonalTrend(model.with_deadline(deadline))
            }
            Forecaster::Autoregressive(model) => {
                Forecaster::Autoregressive(model.with_deadline(deadline))
            }
            linear @ Forecaster::LinearTrend(_) => linear,
        }
    }
}

impl ForecastModel for Forecaster {
    fn kind(&self) -> ModelKind {
        match self {
            Forecaster::SeasonalTrend(_) => ModelKind::SeasonalTrend,
            Forecaster::Autoregressive(_) => ModelKind::Autoregressive,
            Forecaster::LinearTrend(_) => ModelKind::LinearTrend,
        }
    }

    fn fit(&self, series: &TimeSeries, horizon: usize) -> Result<ModelFitResult> {
        match self {
            Forecaster::SeasonalTrend(model) => model.fit(series, horizon),
            Forecaster::Autoregressive(model) => model.fit(series, horizon),
            Forecaster::LinearTrend(model) => model.fit(series, horizon),
        }
    }
}

/// Check a series can be forecast at all and compute the future period starts
pub(crate) fn prepare(
    series: &TimeSeries,
    horizon: usize,
    min_len: usize,
) -> Result<Vec<NaiveDate>> {
    if horizon == 0 {
        return Err(ForecastError::InvalidParameter(
            "Forecast horizon must be at least one period".to_string(),
        ));
    }
    if series.len() < min_len {
        return Err(ForecastError::InsufficientHistory {
            needed: min_len,
            got: series.len(),
        });
    }
    let last = series.last_period().ok_or(ForecastError::InsufficientHistory {
        needed: min_len,
        got: 0,
    })?;
    Ok(crate::utils::future_periods(
        last,
        series.granularity(),
        horizon,
    ))
}
