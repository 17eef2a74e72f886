//! Least squares regression
//!
//! Contains:
//! - [`fit_line`]: ordinary least squares of a series against its index
//! - [`least_squares`]: general multiple regression through the normal equations

use crate::stats::mean;
use crate::{MathError, Result};
use serde::{Deserialize, Serialize};

/// Straight line fitted to a series against the period index `0..n`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearFit {
    /// Change per period
    pub slope: f64,
    /// Fitted value at index 0
    pub intercept: f64,
    /// Residual standard error, `sqrt(RSS / (n - 2))`
    pub residual_std_error: f64,
    /// Coefficient of determination (0 when the series is flat)
    pub r_squared: f64,
    /// Number of observations
    pub n: usize,
    x_mean: f64,
    sxx: f64,
}

impl LinearFit {
    /// Fitted value at (possibly fractional, possibly future) index `x`
    pub fn predict(&self, x: f64) -> f64 {
        self.intercept + self.slope * x
    }

    /// Fitted values over the training indices
    pub fn fitted(&self) -> Vec<f64> {
        (0..self.n).map(|i| self.predict(i as f64)).collect()
    }

    /// Standard error of a new observation at index `x`
    pub fn prediction_std_error(&self, x: f64) -> f64 {
        let n = self.n as f64;
        let leverage = if self.sxx > 0.0 {
            (x - self.x_mean).powi(2) / self.sxx
        } else {
            0.0
        };
        self.residual_std_error * (1.0 + 1.0 / n + leverage).sqrt()
    }

    /// Residual degrees of freedom
    pub fn degrees_of_freedom(&self) -> usize {
        self.n.saturating_sub(2)
    }
}

/// Fit `y = intercept + slope * i` over `i = 0..n`.
///
/// Needs at least three points so the residual standard error is defined.
pub fn fit_line(values: &[f64]) -> Result<LinearFit> {
    let n = values.len();
    if n < 3 {
        return Err(MathError::InsufficientData(format!(
            "Need at least 3 points for a linear fit, got {}",
            n
        )));
    }
    if values.iter().any(|v| !v.is_finite()) {
        return Err(MathError::InvalidInput(
            "Series contains non-finite values".to_string(),
        ));
    }

    let nf = n as f64;
    let x_mean = (nf - 1.0) / 2.0;
    let y_mean = mean(values);

    let mut sxx = 0.0;
    let mut sxy = 0.0;
    let mut syy = 0.0;
    for (i, &y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        let dy = y - y_mean;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }

    let slope = sxy / sxx;
    let intercept = y_mean - slope * x_mean;

    let rss: f64 = values
        .iter()
        .enumerate()
        .map(|(i, &y)| (y - (intercept + slope * i as f64)).powi(2))
        .sum();

    let r_squared = if syy > f64::EPSILON {
        (1.0 - rss / syy).clamp(0.0, 1.0)
    } else {
        0.0
    };

    Ok(LinearFit {
        slope,
        intercept,
        residual_std_error: (rss / (nf - 2.0)).sqrt(),
        r_squared,
        n,
        x_mean,
        sxx,
    })
}

/// Result of a multiple regression
#[derive(Debug, Clone)]
pub struct LeastSquaresFit {
    /// One coefficient per design column
    pub coefficients: Vec<f64>,
    /// Residual sum of squares
    pub rss: f64,
    /// Number of observations
    pub n: usize,
    /// `(X'X)^-1`
    unscaled_covariance: Vec<Vec<f64>>,
}

impl LeastSquaresFit {
    /// Residual variance `RSS / (n - k)`; `None` without residual degrees of freedom
    pub fn residual_variance(&self) -> Option<f64> {
        let k = self.coefficients.len();
        if self.n <= k {
            return None;
        }
        Some(self.rss / (self.n - k) as f64)
    }

    /// Standard error of coefficient `j`
    pub fn standard_error(&self, j: usize) -> Option<f64> {
        let sigma2 = self.residual_variance()?;
        let diag = self.unscaled_covariance.get(j)?.get(j)?;
        Some((sigma2 * diag.max(0.0)).sqrt())
    }

    /// Prediction for one design row
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        row.iter()
            .zip(self.coefficients.iter())
            .map(|(x, b)| x * b)
            .sum()
    }
}

/// Solve `min ||y - X b||^2` for the design matrix given as rows.
pub fn least_squares(rows: &[Vec<f64>], y: &[f64]) -> Result<LeastSquaresFit> {
    let n = rows.len();
    if n == 0 || n != y.len() {
        return Err(MathError::InvalidInput(format!(
            "Design has {} rows but target has {} values",
            n,
            y.len()
        )));
    }

    let k = rows[0].len();
    if k == 0 || rows.iter().any(|r| r.len() != k) {
        return Err(MathError::InvalidInput(
            "Design rows must share a non-zero width".to_string(),
        ));
    }
    if n < k {
        return Err(MathError::InsufficientData(format!(
            "Need at least {} observations for {} regressors, got {}",
            k, k, n
        )));
    }

    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, &target) in rows.iter().zip(y.iter()) {
        for a in 0..k {
            xty[a] += row[a] * target;
            for b in a..k {
                xtx[a][b] += row[a] * row[b];
            }
        }
    }
    for a in 0..k {
        for b in 0..a {
            xtx[a][b] = xtx[b][a];
        }
    }

    let inverse = invert_matrix(&xtx)?;
    let coefficients: Vec<f64> = inverse
        .iter()
        .map(|inv_row| inv_row.iter().zip(xty.iter()).map(|(a, b)| a * b).sum())
        .collect();

    if coefficients.iter().any(|c| !c.is_finite()) {
        return Err(MathError::CalculationError(
            "Least squares produced non-finite coefficients".to_string(),
        ));
    }

    let rss = rows
        .iter()
        .zip(y.iter())
        .map(|(row, &target)| {
            let fitted: f64 = row.iter().zip(coefficients.iter()).map(|(x, b)| x * b).sum();
            (target - fitted).powi(2)
        })
        .sum();

    Ok(LeastSquaresFit {
        coefficients,
        rss,
        n,
        unscaled_covariance: inverse,
    })
}

/// Invert a square matrix with Gauss-Jordan elimination and partial pivoting
pub fn invert_matrix(matrix: &[Vec<f64>]) -> Result<Vec<Vec<f64>>> {
    let k = matrix.len();
    if k == 0 || matrix.iter().any(|r| r.len() != k) {
        return Err(MathError::InvalidInput(
            "Matrix must be square and non-empty".to_string(),
        ));
    }

    let scale = matrix
        .iter()
        .enumerate()
        .map(|(i, r)| r[i].abs())
        .fold(0.0, f64::max)
        .max(1.0);
    let tolerance = 1e-12 * scale;

    let mut a: Vec<Vec<f64>> = matrix.to_vec();
    let mut inv: Vec<Vec<f64>> = (0..k)
        .map(|i| (0..k).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
        .collect();

    for col in 0..k {
        let pivot = (col..k)
            .max_by(|&x, &y| {
                a[x][col]
                    .abs()
                    .partial_cmp(&a[y][col].abs())
                    .unwrap_or(std::cmp::Ordering::Equal)
            })
            .unwrap_or(col);

        if !(a[pivot][col].abs() > tolerance) {
            return Err(MathError::SingularMatrix(format!(
                "Pivot {} is numerically zero",
                col
            )));
        }

        a.swap(col, pivot);
        inv.swap(col, pivot);

        let p = a[col][col];
        for j in 0..k {
            a[col][j] /= p;
            inv[col][j] /= p;
        }

        for row in 0..k {
            if row == col {
                continue;
            }
            let factor = a[row][col];
            if factor == 0.0 {
                continue;
            }
            for j in 0..k {
                a[row][j] -= factor * a[col][j];
                inv[row][j] -= factor * inv[col][j];
            }
        }
    }

    Ok(inv)
}
