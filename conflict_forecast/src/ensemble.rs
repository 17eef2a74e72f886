//! Weighted combination of the constituent forecasts

use crate::error::{ForecastError, Result};
use crate::models::{ForecastPoint, ModelFitResult, ModelKind};
use serde::{Deserialize, Serialize};

const WEIGHT_TOLERANCE: f64 = 1e-9;

/// Validated ensemble weights, one per forecaster kind
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EnsembleWeights {
    seasonal: f64,
    autoregressive: f64,
    linear: f64,
}

impl EnsembleWeights {
    /// Weights must be finite, non-negative and sum to one
    pub fn new(seasonal: f64, autoregressive: f64, linear: f64) -> Result<Self> {
        for (name, w) in [
            ("seasonal", seasonal),
            ("autoregressive", autoregressive),
            ("linear", linear),
        ] {
            if !w.is_finite() || w < 0.0 {
                return Err(ForecastError::ValidationError(format!(
                    "Ensemble weight {} must be finite and non-negative, got {}",
                    name, w
                )));
            }
        }

        let sum = seasonal + autoregressive + linear;
        if (sum - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(ForecastError::ValidationError(format!(
                "Ensemble weights must sum to 1, got {}",
                sum
            )));
        }

        Ok(Self {
            seasonal,
            autoregressive,
            linear,
        })
    }

    pub fn weight(&self, kind: ModelKind) -> f64 {
        match kind {
            ModelKind::SeasonalTrend => self.seasonal,
            ModelKind::Autoregressive => self.autoregressive,
            ModelKind::LinearTrend => self.linear,
        }
    }

    pub fn sum(&self) -> f64 {
        self.seasonal + self.autoregressive + self.linear
    }
}

impl Default for EnsembleWeights {
    fn default() -> Self {
        Self {
            seasonal: 0.5,
            autoregressive: 0.3,
            linear: 0.2,
        }
    }
}

/// How one constituent took part in a combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstituentSummary {
    pub model: ModelKind,
    /// Renormalised weight; 0 when excluded
    pub weight: f64,
    pub converged: bool,
    /// Set when the constituent's output came from another forecaster
    pub fallback: Option<ModelKind>,
    /// Failure message when the constituent produced nothing
    pub error: Option<String>,
}

/// Output of the combiner
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedForecast {
    pub points: Vec<ForecastPoint>,
    /// Contributing kinds joined with `+`
    pub model_label: String,
    pub constituents: Vec<ConstituentSummary>,
}

/// Merges constituent forecasts with fixed weights
#[derive(Debug, Clone)]
pub struct EnsembleCombiner {
    weights: EnsembleWeights,
    min_half_width: f64,
}

impl EnsembleCombiner {
    pub fn new(weights: EnsembleWeights, min_half_width: f64) -> Self {
        Self {
            weights,
            min_half_width: min_half_width.max(0.0),
        }
    }

    pub fn weights(&self) -> EnsembleWeights {
        self.weights
    }

    /// Combine the constituent outcomes into one forecast.
    ///
    /// Failed constituents and fallback substitutes are excluded and their weight is
    /// spread proportionally over the rest. Fallbacks are only used when nothing else
    /// succeeded. Each step's half-width is `sqrt(sum(w_i^2 * h_i^2))`, floored at the
    /// narrowest constituent half-width and at `min_half_width`.
    pub fn combine(
        &self,
        outcomes: &[(ModelKind, Result<ModelFitResult>)],
    ) -> Result<CombinedForecast> {
        let primary: Vec<&ModelFitResult> = outcomes
            .iter()
            .filter_map(|(_, r)| r.as_ref().ok())
            .filter(|r| !r.is_fallback())
            .filter(|r| self.weights.weight(r.kind()) > 0.0)
            .collect();

        let (members, fallback_only) = if primary.is_empty() {
            let fallbacks: Vec<&ModelFitResult> = outcomes
                .iter()
                .filter_map(|(_, r)| r.as_ref().ok())
                .collect();
            (fallbacks, true)
        } else {
            (primary, false)
        };

        if members.is_empty() {
            return Err(total_failure(outcomes));
        }
        if fallback_only {
            log::warn!("No primary forecaster succeeded, combining fallback output only");
        }

        let raw: Vec<f64> = members
            .iter()
            .map(|r| self.weights.weight(r.kind()))
            .collect();
        let total: f64 = raw.iter().sum();
        let weights: Vec<f64> = if total > 0.0 {
            raw.iter().map(|w| w / total).collect()
        } else {
            vec![1.0 / members.len() as f64; members.len()]
        };

        let horizon = members[0].horizon();
        for member in &members[1..] {
            let aligned = member.horizon() == horizon
                && member
                    .points()
                    .iter()
                    .zip(members[0].points())
                    .all(|(a, b)| a.period_start() == b.period_start());
            if !aligned {
                return Err(ForecastError::ValidationError(format!(
                    "{} and {} forecasts are not aligned on the same periods",
                    members[0].kind(),
                    member.kind()
                )));
            }
        }

        let mut points = Vec::with_capacity(horizon);
        for step in 0..horizon {
            let mut estimate = 0.0;
            let mut variance = 0.0;
            let mut narrowest_half = f64::INFINITY;
            let mut narrowest_width = f64::INFINITY;
            for (member, w) in members.iter().zip(weights.iter()) {
                let point = &member.points()[step];
                estimate += w * point.point_estimate();
                variance += w * w * point.half_width().powi(2);
                narrowest_half = narrowest_half.min(point.half_width());
                narrowest_width = narrowest_width.min(point.width());
            }

            let half_width = variance.sqrt().max(narrowest_half).max(self.min_half_width);
            let period_start = members[0].points()[step].period_start();
            let point = ForecastPoint::new(period_start, estimate, half_width)?
                .with_min_width(narrowest_width.max(2.0 * self.min_half_width));
            points.push(point);
        }

        let mut constituents = Vec::with_capacity(outcomes.len());
        for (kind, outcome) in outcomes {
            let summary = match outcome {
                Ok(result) => {
                    let weight = members
                        .iter()
                        .position(|m| std::ptr::eq(*m, result))
                        .map_or(0.0, |i| weights[i]);
                    ConstituentSummary {
                        model: *kind,
                        weight,
                        converged: result.converged(),
                        fallback: result.fallback(),
                        error: None,
                    }
                }
                Err(e) => ConstituentSummary {
                    model: *kind,
                    weight: 0.0,
                    converged: false,
                    fallback: None,
                    error: Some(e.to_string()),
                },
            };
            constituents.push(summary);
        }

        let model_label = members
            .iter()
            .map(|m| match m.fallback() {
                Some(source) => format!("{}({})", m.kind(), source),
                None => m.kind().to_string(),
            })
            .collect::<Vec<_>>()
            .join("+");

        Ok(CombinedForecast {
            points,
            model_label,
            constituents,
        })
    }
}

/// The error reported when no constituent produced a forecast
fn total_failure(outcomes: &[(ModelKind, Result<ModelFitResult>)]) -> ForecastError {
    let errors: Vec<&ForecastError> = outcomes
        .iter()
        .filter_map(|(_, r)| r.as_ref().err())
        .collect();

    if let Some(insufficient) = errors
        .iter()
        .find(|e| matches!(e, ForecastError::InsufficientHistory { .. }))
    {
        if errors
            .iter()
            .all(|e| matches!(e, ForecastError::InsufficientHistory { .. }))
        {
            return (*insufficient).clone();
        }
    }

    let detail = outcomes
        .iter()
        .map(|(kind, r)| match r {
            Ok(_) => format!("{}: zero weight", kind),
            Err(e) => format!("{}: {}", kind, e),
        })
        .collect::<Vec<_>>()
        .join("; ");
    ForecastError::AllModelsFailed(detail)
}
