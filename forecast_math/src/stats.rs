//! Descriptive statistics and distribution quantiles

use crate::{MathError, Result};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};

/// Arithmetic mean. Returns 0.0 for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample variance (n - 1 denominator). Returns 0.0 for fewer than two values.
pub fn variance(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64
}

/// Sample standard deviation
pub fn std_dev(values: &[f64]) -> f64 {
    variance(values).sqrt()
}

/// Root mean square of a slice
pub fn root_mean_square(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64).sqrt()
}

/// Sample autocorrelation at the given lag.
///
/// Returns 0.0 when the lag is out of range or the series has no variance.
pub fn autocorrelation(values: &[f64], lag: usize) -> f64 {
    let n = values.len();
    if lag == 0 {
        return 1.0;
    }
    if lag >= n {
        return 0.0;
    }

    let m = mean(values);
    let denominator: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    if denominator <= f64::EPSILON {
        return 0.0;
    }

    let numerator: f64 = values[lag..]
        .iter()
        .zip(values.iter())
        .map(|(a, b)| (a - m) * (b - m))
        .sum();

    numerator / denominator
}

/// Quantile of the standard normal distribution
pub fn normal_quantile(p: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Probability must be in (0, 1), got {}",
            p
        )));
    }
    let normal =
        Normal::new(0.0, 1.0).map_err(|e| MathError::CalculationError(e.to_string()))?;
    Ok(normal.inverse_cdf(p))
}

/// Quantile of Student's t distribution with `dof` degrees of freedom.
///
/// Large degrees of freedom are served by the normal quantile.
pub fn students_t_quantile(p: f64, dof: f64) -> Result<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Probability must be in (0, 1), got {}",
            p
        )));
    }
    if !(dof > 0.0) {
        return Err(MathError::InvalidInput(format!(
            "Degrees of freedom must be positive, got {}",
            dof
        )));
    }
    if dof > 1000.0 {
        return normal_quantile(p);
    }

    let t = StudentsT::new(0.0, 1.0, dof)
        .map_err(|e| MathError::CalculationError(e.to_string()))?;
    Ok(t.inverse_cdf(p))
}

/// Two-sided critical value for a confidence level, e.g. 1.96 for 0.95
pub fn two_sided_z(confidence_level: f64) -> Result<f64> {
    if !(confidence_level > 0.0 && confidence_level < 1.0) {
        return Err(MathError::InvalidInput(format!(
            "Confidence level must be in (0, 1), got {}",
            confidence_level
        )));
    }
    normal_quantile((1.0 + confidence_level) / 2.0)
}
