//! Risk scores, tiers and location ranking

use crate::config::RiskConfig;
use crate::data::TimeSeries;
use crate::error::{ForecastError, Result};
use crate::prediction::PredictionResult;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Discrete risk classification, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RiskTier::Low => "Low",
            RiskTier::Medium => "Medium",
            RiskTier::High => "High",
            RiskTier::Critical => "Critical",
        };
        f.write_str(label)
    }
}

/// Lower score bounds of the Medium, High and Critical tiers
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskThresholds {
    pub medium: f64,
    pub high: f64,
    pub critical: f64,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            medium: 1.0,
            high: 1.5,
            critical: 2.5,
        }
    }
}

impl RiskThresholds {
    pub fn new(medium: f64, high: f64, critical: f64) -> Result<Self> {
        let thresholds = Self {
            medium,
            high,
            critical,
        };
        thresholds.validate()?;
        Ok(thresholds)
    }

    /// Thresholds must be finite, non-negative and strictly ascending
    pub fn validate(&self) -> Result<()> {
        let all = [self.medium, self.high, self.critical];
        if all.iter().any(|t| !t.is_finite() || *t < 0.0) {
            return Err(ForecastError::ValidationError(
                "Risk thresholds must be finite and non-negative".to_string(),
            ));
        }
        if !(self.medium < self.high && self.high < self.critical) {
            return Err(ForecastError::ValidationError(format!(
                "Risk thresholds must be strictly ascending, got {} / {} / {}",
                self.medium, self.high, self.critical
            )));
        }
        Ok(())
    }

    pub fn tier(&self, score: f64) -> RiskTier {
        if score >= self.critical {
            RiskTier::Critical
        } else if score >= self.high {
            RiskTier::High
        } else if score >= self.medium {
            RiskTier::Medium
        } else {
            RiskTier::Low
        }
    }
}

/// Risk of one location, derived from its prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub location: String,
    pub risk_score: f64,
    pub risk_tier: RiskTier,
    /// 1-based position in a ranking; 0 until ranked
    pub rank: usize,
    pub projected_fatalities: f64,
    pub recent_rate: f64,
    pub baseline_rate: f64,
}

/// Incidents per day over the trailing `window_days`, and over the whole series
pub fn observed_rates(series: &TimeSeries, window_days: u32) -> (f64, f64) {
    if series.is_empty() {
        return (0.0, 0.0);
    }
    let days_per_period = series.granularity().days();
    let recent_periods = (((window_days + days_per_period - 1) / days_per_period) as usize)
        .clamp(1, series.len());

    let points = series.points();
    let recent: u64 = points[points.len() - recent_periods..]
        .iter()
        .map(|p| p.count)
        .sum();
    let recent_rate = recent as f64 / (recent_periods as f64 * f64::from(days_per_period));
    let baseline_rate =
        series.total_count() as f64 / (series.len() as f64 * f64::from(days_per_period));
    (recent_rate, baseline_rate)
}

/// Converts predictions into scored, tiered and ranked assessments
#[derive(Debug, Clone)]
pub struct RiskClassifier {
    thresholds: RiskThresholds,
    fatality_weight: f64,
}

impl RiskClassifier {
    pub fn new(thresholds: RiskThresholds, fatality_weight: f64) -> Result<Self> {
        thresholds.validate()?;
        if !(fatality_weight >= 0.0 && fatality_weight.is_finite()) {
            return Err(ForecastError::InvalidParameter(format!(
                "Fatality weight must be finite and non-negative, got {}",
                fatality_weight
            )));
        }
        Ok(Self {
            thresholds,
            fatality_weight,
        })
    }

    pub fn from_config(config: &RiskConfig) -> Result<Self> {
        Self::new(config.thresholds, config.fatality_weight)
    }

    pub fn thresholds(&self) -> RiskThresholds {
        self.thresholds
    }

    /// `(recent_rate / baseline_rate) * (1 + fatality_weight * fatalities / horizon_days)`
    ///
    /// A location without any recorded incidents scores zero.
    pub fn score(&self, prediction: &PredictionResult) -> f64 {
        if !(prediction.baseline_rate > 0.0) {
            return 0.0;
        }
        let ratio = prediction.recent_rate / prediction.baseline_rate;
        let per_day = prediction.projected_fatalities / f64::from(prediction.horizon_days.max(1));
        let severity = 1.0 + self.fatality_weight * per_day.max(0.0);
        let score = ratio * severity;
        if score.is_finite() {
            score
        } else {
            0.0
        }
    }

    pub fn assess(&self, prediction: &PredictionResult) -> RiskAssessment {
        let risk_score = self.score(prediction);
        RiskAssessment {
            location: prediction.location.clone(),
            risk_score,
            risk_tier: self.thresholds.tier(risk_score),
            rank: 0,
            projected_fatalities: prediction.projected_fatalities,
            recent_rate: prediction.recent_rate,
            baseline_rate: prediction.baseline_rate,
        }
    }

    /// Order by descending score, then descending projected fatalities, then location
    /// name, and number the result from 1
    pub fn rank(mut assessments: Vec<RiskAssessment>) -> Vec<RiskAssessment> {
        assessments.sort_by(|a, b| {
            b.risk_score
                .partial_cmp(&a.risk_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| {
                    b.projected_fatalities
                        .partial_cmp(&a.projected_fatalities)
                        .unwrap_or(Ordering::Equal)
                })
                .then_with(|| a.location.cmp(&b.location))
        });
        for (i, assessment) in assessments.iter_mut().enumerate() {
            assessment.rank = i + 1;
        }
        assessments
    }
}
