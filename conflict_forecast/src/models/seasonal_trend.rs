//! Piecewise-linear trend plus a repeating seasonal profile
//!
//! The series is decomposed as `trend + seasonal + noise`. The trend is piecewise linear
//! with changepoints chosen under a BIC penalty; the seasonal component is the mean
//! detrended value at each phase of the cycle. Trend and seasonal estimates are refined
//! alternately for a fixed number of passes.
//!
//! With fewer than two full cycles of history the seasonal component is dropped and the
//! forecast is the trend alone.

use crate::config::SeasonalConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::{
    prepare, FitDeadline, ForecastModel, ForecastPoint, ModelFitResult, ModelKind,
    ModelParameters,
};
use forecast_math::changepoint::{fit_piecewise_trend, ChangepointConfig, PiecewiseTrend};
use forecast_math::seasonality::{detect_period, seasonal_profile};
use forecast_math::stats::{std_dev, two_sided_z};

#[derive(Debug, Clone)]
pub struct SeasonalTrendForecaster {
    period: Option<usize>,
    max_period: usize,
    min_autocorrelation: f64,
    changepoints: ChangepointConfig,
    interval_growth: f64,
    iterations: usize,
    confidence_level: f64,
    deadline: Option<FitDeadline>,
}

impl SeasonalTrendForecaster {
    pub fn new(config: &SeasonalConfig, confidence_level: f64) -> Result<Self> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Confidence level must be in (0, 1), got {}",
                confidence_level
            )));
        }
        if matches!(config.period, Some(p) if p < 2) {
            return Err(ForecastError::InvalidParameter(
                "Seasonal period must be at least 2".to_string(),
            ));
        }

        Ok(Self {
            period: config.period,
            max_period: config.max_period,
            min_autocorrelation: config.min_autocorrelation,
            changepoints: ChangepointConfig {
                max_changepoints: config.max_changepoints,
                changepoint_range: config.changepoint_range,
                penalty_scale: config.penalty_scale,
                ..ChangepointConfig::default()
            },
            interval_growth: config.interval_growth,
            iterations: config.iterations.max(1),
            confidence_level,
            deadline: None,
        })
    }

    /// Use a fixed seasonal period instead of detecting one
    pub fn with_period(mut self, period: usize) -> Self {
        self.period = Some(period.max(2));
        self
    }

    /// Stop refining with a timeout once `deadline` passes
    pub fn with_deadline(mut self, deadline: FitDeadline) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn check_deadline(&self) -> Result<()> {
        match &self.deadline {
            Some(deadline) => deadline.check(ModelKind::SeasonalTrend),
            None => Ok(()),
        }
    }

    fn decompose(&self, values: &[f64]) -> Result<Decomposition> {
        let n = values.len();
        let mut trend = fit_piecewise_trend(values, &self.changepoints)?;
        self.check_deadline()?;

        let period = match self.period {
            Some(p) => Some(p),
            None => {
                let detrended = subtract(values, &trend.fitted());
                detect_period(&detrended, 2, self.max_period, self.min_autocorrelation)
            }
        };

        let period = match period {
            Some(p) if n >= 2 * p => p,
            Some(p) => {
                log::debug!(
                    "Only {} periods for a cycle of {}, forecasting trend alone",
                    n,
                    p
                );
                return Ok(Decomposition {
                    trend,
                    period: None,
                    profile: Vec::new(),
                });
            }
            None => {
                return Ok(Decomposition {
                    trend,
                    period: None,
                    profile: Vec::new(),
                })
            }
        };

        let mut profile = vec![0.0; period];
        for _ in 0..self.iterations {
            self.check_deadline()?;
            profile = seasonal_profile(&subtract(values, &trend.fitted()), period)?;
            let deseasonalised: Vec<f64> = values
                .iter()
                .enumerate()
                .map(|(t, v)| v - profile[t % period])
                .collect();
            trend = fit_piecewise_trend(&deseasonalised, &self.changepoints)?;
        }

        Ok(Decomposition {
            trend,
            period: Some(period),
            profile,
        })
    }
}

struct Decomposition {
    trend: PiecewiseTrend,
    period: Option<usize>,
    profile: Vec<f64>,
}

impl Decomposition {
    fn value_at(&self, t: usize) -> f64 {
        let seasonal = match self.period {
            Some(p) => self.profile[t % p],
            None => 0.0,
        };
        self.trend.value_at(t as f64) + seasonal
    }
}

fn subtract(values: &[f64], fitted: &[f64]) -> Vec<f64> {
    values.iter().zip(fitted.iter()).map(|(v, f)| v - f).collect()
}

impl ForecastModel for SeasonalTrendForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::SeasonalTrend
    }

    fn fit(&self, series: &TimeSeries, horizon: usize) -> Result<ModelFitResult> {
        let periods = prepare(series, horizon, 3)?;
        let values = series.values();
        let n = values.len();

        let decomposition = self.decompose(&values)?;
        let residuals: Vec<f64> = values
            .iter()
            .enumerate()
            .map(|(t, v)| v - decomposition.value_at(t))
            .collect();
        let sigma = std_dev(&residuals);
        let z = two_sided_z(self.confidence_level)?;

        let points = periods
            .into_iter()
            .enumerate()
            .map(|(i, period_start)| {
                let step = (i + 1) as f64;
                let half_width = z * sigma * (1.0 + self.interval_growth * step);
                ForecastPoint::new(period_start, decomposition.value_at(n + i), half_width)
            })
            .collect::<Result<Vec<_>>>()?;

        let trend = &decomposition.trend;
        Ok(ModelFitResult::new(
            ModelKind::SeasonalTrend,
            ModelParameters::SeasonalTrend {
                intercept: trend.intercept,
                base_slope: trend.base_slope,
                final_slope: trend.final_slope(),
                changepoints: trend.changepoints.clone(),
                period: decomposition.period,
                seasonal_profile: decomposition.profile.clone(),
                residual_std: sigma,
            },
            points,
            true,
        ))
    }
}
