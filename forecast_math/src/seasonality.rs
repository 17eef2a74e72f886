//! Seasonal period detection and seasonal profiles

use crate::stats::autocorrelation;
use crate::{MathError, Result};

/// Detect the dominant seasonal period from the autocorrelation function.
///
/// Only local ACF peaks between `min_period` and `max_period` count, and a peak must
/// reach `threshold`. Harmonics of the true period score nearly as high as the period
/// itself, so the smallest lag within 90% of the best peak wins.
pub fn detect_period(
    values: &[f64],
    min_period: usize,
    max_period: usize,
    threshold: f64,
) -> Option<usize> {
    let min_period = min_period.max(2);
    let max_period = max_period.min(values.len() / 2);
    if max_period < min_period {
        return None;
    }

    let acf: Vec<f64> = (0..=max_period + 1)
        .map(|lag| autocorrelation(values, lag))
        .collect();

    let peaks: Vec<(usize, f64)> = (min_period..=max_period)
        .filter(|&lag| {
            let value = acf[lag];
            let left = acf[lag - 1];
            let right = acf.get(lag + 1).copied().unwrap_or(f64::NEG_INFINITY);
            value.is_finite() && value >= threshold && value >= left && value >= right
        })
        .map(|lag| (lag, acf[lag]))
        .collect();

    let best = peaks.iter().map(|&(_, v)| v).fold(f64::NEG_INFINITY, f64::max);
    if !best.is_finite() {
        return None;
    }

    peaks
        .into_iter()
        .find(|&(_, v)| v >= 0.9 * best)
        .map(|(lag, _)| lag)
}

/// Mean of `detrended` at each phase of `period`, shifted to sum to zero.
///
/// Phase `i` covers indices `i, i + period, ...`.
pub fn seasonal_profile(detrended: &[f64], period: usize) -> Result<Vec<f64>> {
    if period < 2 {
        return Err(MathError::InvalidInput(format!(
            "Seasonal period must be at least 2, got {}",
            period
        )));
    }
    if detrended.len() < period {
        return Err(MathError::InsufficientData(format!(
            "Need at least one full cycle of {} values, got {}",
            period,
            detrended.len()
        )));
    }

    let mut sums = vec![0.0; period];
    let mut counts = vec![0usize; period];
    for (i, &v) in detrended.iter().enumerate() {
        sums[i % period] += v;
        counts[i % period] += 1;
    }

    let mut profile: Vec<f64> = sums
        .iter()
        .zip(counts.iter())
        .map(|(s, &c)| s / c as f64)
        .collect();
    let centre = profile.iter().sum::<f64>() / period as f64;
    for p in profile.iter_mut() {
        *p -= centre;
    }

    Ok(profile)
}
