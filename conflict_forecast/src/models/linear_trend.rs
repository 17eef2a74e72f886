//! Ordinary least squares trend extrapolation

use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::models::{
    prepare, ForecastModel, ForecastPoint, ModelFitResult, ModelKind, ModelParameters,
};
use forecast_math::regression::fit_line;
use forecast_math::stats::students_t_quantile;

/// Straight-line forecaster; succeeds on any series with three or more periods
#[derive(Debug, Clone)]
pub struct LinearTrendForecaster {
    confidence_level: f64,
}

impl LinearTrendForecaster {
    pub fn new(confidence_level: f64) -> Result<Self> {
        if !(confidence_level > 0.0 && confidence_level < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "Confidence level must be in (0, 1), got {}",
                confidence_level
            )));
        }
        Ok(Self { confidence_level })
    }
}

impl Default for LinearTrendForecaster {
    fn default() -> Self {
        Self {
            confidence_level: 0.95,
        }
    }
}

impl ForecastModel for LinearTrendForecaster {
    fn kind(&self) -> ModelKind {
        ModelKind::LinearTrend
    }

    fn fit(&self, series: &TimeSeries, horizon: usize) -> Result<ModelFitResult> {
        let periods = prepare(series, horizon, 3)?;
        let fit = fit_line(&series.values())?;

        let t = students_t_quantile(
            (1.0 + self.confidence_level) / 2.0,
            fit.degrees_of_freedom().max(1) as f64,
        )?;

        let last = (series.len() - 1) as f64;
        let points = periods
            .into_iter()
            .enumerate()
            .map(|(i, period_start)| {
                let x = last + (i + 1) as f64;
                ForecastPoint::new(period_start, fit.predict(x), t * fit.prediction_std_error(x))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ModelFitResult::new(
            ModelKind::LinearTrend,
            ModelParameters::LinearTrend {
                slope: fit.slope,
                intercept: fit.intercept,
                residual_std_error: fit.residual_std_error,
                r_squared: fit.r_squared,
            },
            points,
            true,
        ))
    }
}
