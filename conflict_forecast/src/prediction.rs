//! The externally visible forecast artifact

use crate::data::Granularity;
use crate::ensemble::ConstituentSummary;
use crate::error::{ForecastError, Result};
use crate::models::ForecastPoint;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Combined forecast for one location and horizon
///
/// Shared behind an `Arc` once built; nothing mutates it afterwards. All floats are
/// finite, so the JSON form never carries NaN or infinities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub location: String,
    pub horizon_days: u32,
    pub granularity: Granularity,
    pub points: Vec<ForecastPoint>,
    /// Backtest MAPE as a fraction; `None` when the backtest could not run
    pub mape: Option<f64>,
    /// Contributing forecasters joined with `+`
    pub model_label: String,
    pub constituents: Vec<ConstituentSummary>,
    /// Forecast incidents over the horizon
    pub projected_incidents: f64,
    /// Forecast incidents times the historical fatalities per incident
    pub projected_fatalities: f64,
    /// Incidents per day over the recent window
    pub recent_rate: f64,
    /// Incidents per day over the whole history
    pub baseline_rate: f64,
    pub trained_at: DateTime<Utc>,
    /// Set for historical forecasts
    pub as_of: Option<NaiveDate>,
    pub model_version: String,
}

impl PredictionResult {
    /// Reject results that would put non-finite numbers on the wire
    pub fn ensure_finite(&self) -> Result<()> {
        let scalars = [
            self.projected_incidents,
            self.projected_fatalities,
            self.recent_rate,
            self.baseline_rate,
        ];
        let points_finite = self.points.iter().all(|p| {
            p.point_estimate().is_finite()
                && p.lower_bound().is_finite()
                && p.upper_bound().is_finite()
        });
        let weights_finite = self.constituents.iter().all(|c| c.weight.is_finite());

        if !points_finite
            || !weights_finite
            || scalars.iter().any(|v| !v.is_finite())
            || self.mape.map_or(false, |m| !m.is_finite())
        {
            return Err(ForecastError::ValidationError(format!(
                "Prediction for {} contains non-finite values",
                self.location
            )));
        }
        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
