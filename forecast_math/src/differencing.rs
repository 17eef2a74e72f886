//! Differencing, integration and unit-root testing

use crate::regression::least_squares;
use crate::stats::variance;
use crate::{MathError, Result};

/// 5% critical value of the Dickey-Fuller distribution with a constant term
pub const ADF_CRITICAL_5PCT: f64 = -2.86;

/// Apply `d` rounds of first differencing.
pub fn difference(series: &[f64], d: usize) -> Vec<f64> {
    let mut result = series.to_vec();
    for _ in 0..d {
        if result.len() <= 1 {
            return Vec::new();
        }
        result = result.windows(2).map(|w| w[1] - w[0]).collect();
    }
    result
}

/// Undo `d` rounds of differencing for values that continue `original`.
///
/// `differenced` holds future values on the differenced scale; the result holds the
/// same future values on the original scale.
pub fn integrate(differenced: &[f64], original: &[f64], d: usize) -> Vec<f64> {
    let mut result = differenced.to_vec();
    for level in (0..d).rev() {
        let anchor = difference(original, level).last().copied().unwrap_or(0.0);
        let mut running = anchor;
        result = result
            .iter()
            .map(|delta| {
                running += delta;
                running
            })
            .collect();
    }
    result
}

/// Outcome of an augmented Dickey-Fuller test
#[derive(Debug, Clone, PartialEq)]
pub struct AdfResult {
    /// t statistic of the lagged level coefficient
    pub statistic: f64,
    /// Number of lagged differences in the regression
    pub lags: usize,
    /// Unit root rejected at the 5% level
    pub is_stationary: bool,
}

/// Augmented Dickey-Fuller test with a constant.
///
/// Regresses `dy_t = a + b*y_{t-1} + sum(g_i * dy_{t-i})` and compares the t statistic of
/// `b` with the 5% critical value. The lag order is chosen by AIC up to `max_lags`
/// (default `floor((n - 1)^(1/3))`), all candidates sharing one estimation sample.
pub fn adf_test(series: &[f64], max_lags: Option<usize>) -> Result<AdfResult> {
    let n = series.len();
    if n < 8 {
        return Err(MathError::InsufficientData(format!(
            "Need at least 8 observations for a unit-root test, got {}",
            n
        )));
    }

    // A flat series has no unit root to speak of
    if variance(series) <= 1e-12 {
        return Ok(AdfResult {
            statistic: f64::NEG_INFINITY,
            lags: 0,
            is_stationary: true,
        });
    }

    let default_lags = ((n - 1) as f64).cbrt().floor() as usize;
    let max_lags = max_lags.unwrap_or(default_lags).min((n - 6) / 3);

    let diff = difference(series, 1);
    let start = max_lags + 1;

    let mut best: Option<(f64, usize)> = None;
    for lags in 0..=max_lags {
        let (rows, y) = adf_design(series, &diff, lags, start);
        let Ok(fit) = least_squares(&rows, &y) else {
            continue;
        };
        let m = y.len() as f64;
        let aic = m * (fit.rss.max(1e-300) / m).ln() + 2.0 * (lags + 2) as f64;
        if best.map_or(true, |(b, _)| aic < b) {
            best = Some((aic, lags));
        }
    }

    let (_, lags) = best.ok_or_else(|| {
        MathError::CalculationError("No unit-root regression could be estimated".to_string())
    })?;

    let (rows, y) = adf_design(series, &diff, lags, start);
    let fit = least_squares(&rows, &y)?;
    let beta = fit.coefficients[1];

    let statistic = match fit.standard_error(1) {
        Some(se) if se > 1e-12 && se.is_finite() => beta / se,
        // Perfect fit: the sign of the level coefficient decides
        _ => {
            if beta < -1e-8 {
                f64::NEG_INFINITY
            } else {
                0.0
            }
        }
    };

    Ok(AdfResult {
        statistic,
        lags,
        is_stationary: statistic < ADF_CRITICAL_5PCT,
    })
}

fn adf_design(
    series: &[f64],
    diff: &[f64],
    lags: usize,
    start: usize,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let n = series.len();
    let mut rows = Vec::with_capacity(n - start);
    let mut y = Vec::with_capacity(n - start);

    // Row t explains diff[t - 1] = series[t] - series[t - 1]
    for t in start..n {
        let mut row = Vec::with_capacity(lags + 2);
        row.push(1.0);
        row.push(series[t - 1]);
        for i in 1..=lags {
            row.push(diff[t - 1 - i]);
        }
        rows.push(row);
        y.push(diff[t - 1]);
    }

    (rows, y)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_difference_orders() {
        let series = vec![1.0, 3.0, 6.0, 10.0, 15.0];
        assert_eq!(difference(&series, 0), series);
        assert_eq!(difference(&series, 1), vec![2.0, 3.0, 4.0, 5.0]);
        assert_eq!(difference(&series, 2), vec![1.0, 1.0, 1.0]);
        assert!(difference(&[1.0], 1).is_empty());
    }

    #[test]
    fn test_integrate_inverts_difference() {
        let series = vec![1.0, 3.0, 6.0, 10.0, 15.0, 21.0, 28.0];
        let (train, future) = series.split_at(4);

        for d in 0..=2 {
            let future_diff: Vec<f64> = difference(&series, d)[train.len() - d..].to_vec();
            let restored = integrate(&future_diff, train, d);
            for (a, b) in restored.iter().zip(future.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn test_adf_rejects_unit_root_for_white_noise_like_series() {
        // Deterministic mean-reverting oscillation
        let series: Vec<f64> = (0..120)
            .map(|i| ((i * 37 % 11) as f64 - 5.0) * 0.8)
            .collect();
        let result = adf_test(&series, None).unwrap();
        assert!(result.is_stationary, "statistic {}", result.statistic);
    }

    #[test]
    fn test_adf_keeps_unit_root_for_trending_series() {
        let series: Vec<f64> = (0..100).map(|t| 100.0 + 2.0 * t as f64).collect();
        let result = adf_test(&series, None).unwrap();
        assert!(!result.is_stationary);
    }

    #[test]
    fn test_adf_flat_series_is_stationary() {
        let result = adf_test(&[4.0; 30], None).unwrap();
        assert!(result.is_stationary);
    }
}
