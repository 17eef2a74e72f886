//! Piecewise-linear trends with penalised changepoint selection
//!
//! The trend is `intercept + slope * t + sum(delta_k * max(t - c_k, 0))`: a line whose
//! slope shifts by `delta_k` at each changepoint `c_k`. Changepoints are picked greedily
//! from evenly spaced candidates, one at a time, as long as each addition lowers a
//! BIC-style score. The `ln(n)` charge per parameter keeps the trend from chasing noise.

use crate::regression::least_squares;
use crate::stats::mean;
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Configuration for changepoint selection
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangepointConfig {
    /// Upper bound on accepted changepoints
    pub max_changepoints: usize,
    /// Fraction of the history in which changepoints may be placed
    pub changepoint_range: f64,
    /// Multiplier on the `ln(n)` charge per parameter
    pub penalty_scale: f64,
    /// Minimum distance between changepoints, and from the series start
    pub min_segment: usize,
    /// Number of evenly spaced candidate positions
    pub n_candidates: usize,
}

impl Default for ChangepointConfig {
    fn default() -> Self {
        Self {
            max_changepoints: 5,
            changepoint_range: 0.8,
            penalty_scale: 1.0,
            min_segment: 4,
            n_candidates: 25,
        }
    }
}

/// Fitted piecewise-linear trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiecewiseTrend {
    /// Level at index 0
    pub intercept: f64,
    /// Slope before the first changepoint
    pub base_slope: f64,
    /// Changepoint indices, ascending
    pub changepoints: Vec<usize>,
    /// Slope change at each changepoint
    pub slope_deltas: Vec<f64>,
    /// Residual sum of squares of the fit
    pub rss: f64,
    /// Number of observations fitted
    pub n: usize,
}

impl PiecewiseTrend {
    /// Trend value at index `t`; indices past the history extrapolate the final slope
    pub fn value_at(&self, t: f64) -> f64 {
        self.intercept
            + self.base_slope * t
            + self
                .changepoints
                .iter()
                .zip(self.slope_deltas.iter())
                .map(|(&c, d)| d * (t - c as f64).max(0.0))
                .sum::<f64>()
    }

    /// Slope after the last changepoint
    pub fn final_slope(&self) -> f64 {
        self.base_slope + self.slope_deltas.iter().sum::<f64>()
    }

    /// Trend values over the fitted indices
    pub fn fitted(&self) -> Vec<f64> {
        (0..self.n).map(|t| self.value_at(t as f64)).collect()
    }
}

/// Fit a piecewise-linear trend to `values`.
pub fn fit_piecewise_trend(values: &[f64], config: &ChangepointConfig) -> Result<PiecewiseTrend> {
    let n = values.len();
    if n < 3 {
        return Err(MathError::InsufficientData(format!(
            "Need at least 3 points for a trend, got {}",
            n
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(
            "Series contains non-finite values".to_string(),
        ));
    }

    let candidates = candidate_positions(n, config);

    // RSS floor relative to the series scale, so exact fits compare on penalty alone
    let scale = 1.0 + mean(&values.iter().map(|v| v * v).collect::<Vec<_>>());
    let floor = 1e-10 * scale;
    let ln_n = (n as f64).ln();
    let score = |rss: f64, params: usize| {
        n as f64 * (rss / n as f64).max(floor).ln() + config.penalty_scale * params as f64 * ln_n
    };

    let mut selected: Vec<usize> = Vec::new();
    let (mut coefficients, mut rss) = fit_with(values, &selected)?;
    let mut best_score = score(rss, 2);

    while selected.len() < config.max_changepoints {
        let mut step: Option<(f64, usize, Vec<f64>, f64)> = None;

        for &c in &candidates {
            if selected
                .iter()
                .any(|&s| s.abs_diff(c) < config.min_segment.max(1))
            {
                continue;
            }
            let mut trial = selected.clone();
            trial.push(c);
            trial.sort_unstable();

            let Ok((coef, trial_rss)) = fit_with(values, &trial) else {
                continue;
            };
            let trial_score = score(trial_rss, trial.len() + 2);
            if step.as_ref().map_or(true, |(s, ..)| trial_score < *s) {
                step = Some((trial_score, c, coef, trial_rss));
            }
        }

        match step {
            Some((trial_score, c, coef, trial_rss)) if trial_score < best_score => {
                selected.push(c);
                selected.sort_unstable();
                coefficients = coef;
                rss = trial_rss;
                best_score = trial_score;
            }
            _ => break,
        }
    }

    Ok(PiecewiseTrend {
        intercept: coefficients[0],
        base_slope: coefficients[1],
        slope_deltas: coefficients[2..].to_vec(),
        changepoints: selected,
        rss,
        n,
    })
}

fn candidate_positions(n: usize, config: &ChangepointConfig) -> Vec<usize> {
    let min_segment = config.min_segment.max(1);
    let last = ((n as f64) * config.changepoint_range.clamp(0.0, 1.0)).floor() as usize;
    let last = last.min(n.saturating_sub(min_segment));
    if config.n_candidates == 0 || last <= min_segment {
        return Vec::new();
    }

    let span = last - min_segment;
    let count = config.n_candidates.min(span + 1);
    let mut positions: Vec<usize> = (0..count)
        .map(|i| {
            if count == 1 {
                min_segment
            } else {
                min_segment + (i * span) / (count - 1)
            }
        })
        .collect();
    positions.dedup();
    positions
}

/// Least squares on the hinge basis for a sorted set of changepoints
fn fit_with(values: &[f64], changepoints: &[usize]) -> Result<(Vec<f64>, f64)> {
    let rows: Vec<Vec<f64>> = (0..values.len())
        .map(|t| {
            let t = t as f64;
            let mut row = Vec::with_capacity(changepoints.len() + 2);
            row.push(1.0);
            row.push(t);
            row.extend(changepoints.iter().map(|&c| (t - c as f64).max(0.0)));
            row
        })
        .collect();
    let fit = least_squares(&rows, values)?;
    Ok((fit.coefficients, fit.rss))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_straight_line_has_no_changepoints() {
        let values: Vec<f64> = (0..80).map(|t| 10.0 + 0.5 * t as f64).collect();
        let trend = fit_piecewise_trend(&values, &ChangepointConfig::default()).unwrap();

        assert!(trend.changepoints.is_empty());
        assert_relative_eq!(trend.final_slope(), 0.5, epsilon = 1e-8);
        assert_relative_eq!(trend.value_at(100.0), 60.0, epsilon = 1e-6);
    }

    #[test]
    fn test_detects_slope_reversal() {
        let values: Vec<f64> = (0..100)
            .map(|t| {
                let t = t as f64;
                if t <= 50.0 {
                    t
                } else {
                    50.0 - (t - 50.0)
                }
            })
            .collect();
        let trend = fit_piecewise_trend(&values, &ChangepointConfig::default()).unwrap();

        assert!(!trend.changepoints.is_empty());
        assert!(trend
            .changepoints
            .iter()
            .any(|&c| (c as i64 - 50).abs() <= 4));
        assert!(trend.final_slope() < 0.0);
    }

    #[test]
    fn test_candidates_stay_inside_range() {
        let config = ChangepointConfig::default();
        let positions = candidate_positions(100, &config);
        assert!(!positions.is_empty());
        assert!(positions.iter().all(|&p| p >= config.min_segment && p <= 80));
        assert!(candidate_positions(6, &config).is_empty());
    }
}
