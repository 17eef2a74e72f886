//! Metrics for evaluating forecast accuracy and rolling-origin backtests

use crate::config::BacktestConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use forecast_math::stats::root_mean_square;
use serde::{Deserialize, Serialize};

/// Accuracy of one forecast against observed counts
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastAccuracy {
    /// Mean Absolute Error
    pub mae: f64,
    /// Root Mean Squared Error
    pub rmse: f64,
    /// Mean Absolute Percentage Error as a fraction, `mean(|a - p| / max(a, 1))`
    pub mape: f64,
    /// Symmetric Mean Absolute Percentage Error as a fraction
    pub smape: f64,
}

impl std::fmt::Display for ForecastAccuracy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Forecast Accuracy Metrics:")?;
        writeln!(f, "  MAE:   {:.4}", self.mae)?;
        writeln!(f, "  RMSE:  {:.4}", self.rmse)?;
        writeln!(f, "  MAPE:  {:.4}", self.mape)?;
        write!(f, "  SMAPE: {:.4}", self.smape)
    }
}

/// Mean absolute percentage error with the denominator floored at one incident
pub fn mape(forecast: &[f64], actual: &[f64]) -> Result<f64> {
    check_lengths(forecast, actual)?;
    Ok(forecast
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| (a - p).abs() / a.max(1.0))
        .sum::<f64>()
        / forecast.len() as f64)
}

/// Calculate accuracy metrics for a forecast vs actual values
pub fn forecast_accuracy(forecast: &[f64], actual: &[f64]) -> Result<ForecastAccuracy> {
    check_lengths(forecast, actual)?;
    let n = forecast.len() as f64;

    let errors: Vec<f64> = forecast
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| a - p)
        .collect();

    let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
    let rmse = root_mean_square(&errors);

    let smape = forecast
        .iter()
        .zip(actual.iter())
        .map(|(p, a)| {
            let denominator = p.abs() + a.abs();
            if denominator == 0.0 {
                0.0
            } else {
                2.0 * (a - p).abs() / denominator
            }
        })
        .sum::<f64>()
        / n;

    Ok(ForecastAccuracy {
        mae,
        rmse,
        mape: mape(forecast, actual)?,
        smape,
    })
}

fn check_lengths(forecast: &[f64], actual: &[f64]) -> Result<()> {
    if forecast.len() != actual.len() || forecast.is_empty() {
        return Err(ForecastError::ValidationError(format!(
            "Forecast ({}) and actual ({}) values must have the same non-zero length",
            forecast.len(),
            actual.len()
        )));
    }
    if forecast.iter().chain(actual.iter()).any(|v| !v.is_finite()) {
        return Err(ForecastError::ValidationError(
            "Forecast and actual values must be finite".to_string(),
        ));
    }
    Ok(())
}

/// One training cutoff of a backtest
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldResult {
    /// Number of training periods
    pub cutoff: usize,
    /// Periods forecast past the cutoff
    pub horizon: usize,
    pub accuracy: ForecastAccuracy,
}

/// Backtest outcome averaged over folds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub folds: Vec<FoldResult>,
    /// Mean MAPE across folds
    pub mape: f64,
    /// Mean MAE across folds
    pub mae: f64,
}

/// Rolling-origin backtester
///
/// The last `folds` non-overlapping windows of `horizon` periods are each forecast from
/// the history before them, as long as that history is at least `min_train_periods`
/// long. Windows are shortened to fit when the series is short.
#[derive(Debug, Clone)]
pub struct AccuracyTracker {
    folds: usize,
    min_train_periods: usize,
}

impl AccuracyTracker {
    pub fn new(folds: usize, min_train_periods: usize) -> Result<Self> {
        if folds == 0 {
            return Err(ForecastError::InvalidParameter(
                "Backtest needs at least one fold".to_string(),
            ));
        }
        if min_train_periods == 0 {
            return Err(ForecastError::InvalidParameter(
                "Backtest training prefix must be non-empty".to_string(),
            ));
        }
        Ok(Self {
            folds,
            min_train_periods,
        })
    }

    pub fn from_config(config: &BacktestConfig) -> Result<Self> {
        Self::new(config.folds, config.min_train_periods)
    }

    /// Training cutoffs, ascending, and the horizon each fold forecasts
    pub fn cutoffs(&self, len: usize, horizon: usize) -> (Vec<usize>, usize) {
        if len <= self.min_train_periods || horizon == 0 {
            return (Vec::new(), 0);
        }
        let horizon = horizon.min(len - self.min_train_periods);
        let mut cutoffs: Vec<usize> = (1..=self.folds)
            .filter_map(|k| len.checked_sub(k * horizon))
            .filter(|&c| c >= self.min_train_periods)
            .collect();
        cutoffs.reverse();
        (cutoffs, horizon)
    }

    /// Backtest `forecast`, which must return `h` point estimates for a training series.
    ///
    /// Folds whose forecast fails are skipped; the backtest fails only when every fold
    /// does.
    pub fn backtest<F>(
        &self,
        series: &TimeSeries,
        horizon: usize,
        forecast: F,
    ) -> Result<BacktestReport>
    where
        F: Fn(&TimeSeries, usize) -> Result<Vec<f64>>,
    {
        let (cutoffs, horizon) = self.cutoffs(series.len(), horizon);
        if cutoffs.is_empty() {
            return Err(ForecastError::InsufficientHistory {
                needed: self.min_train_periods + 1,
                got: series.len(),
            });
        }

        let values = series.values();
        let mut folds = Vec::with_capacity(cutoffs.len());
        let mut last_error = None;
        for cutoff in cutoffs {
            let train = series.head(cutoff);
            let actual = &values[cutoff..cutoff + horizon];
            let outcome = forecast(&train, horizon)
                .and_then(|predicted| forecast_accuracy(&predicted, actual));
            match outcome {
                Ok(accuracy) => folds.push(FoldResult {
                    cutoff,
                    horizon,
                    accuracy,
                }),
                Err(e) => {
                    log::debug!("Backtest fold at {} failed: {}", cutoff, e);
                    last_error = Some(e);
                }
            }
        }

        if folds.is_empty() {
            return Err(last_error.unwrap_or_else(|| {
                ForecastError::ValidationError("Backtest produced no folds".to_string())
            }));
        }

        let count = folds.len() as f64;
        let mape = folds.iter().map(|f| f.accuracy.mape).sum::<f64>() / count;
        let mae = folds.iter().map(|f| f.accuracy.mae).sum::<f64>() / count;
        Ok(BacktestReport { folds, mape, mae })
    }
}
