//! # Forecast Math
//!
//! Numerical building blocks for count time series forecasting.
//! The forecasting engine builds its models out of these pieces:
//!
//! - Descriptive statistics and distribution quantiles ([`stats`])
//! - Ordinary and general least squares ([`regression`])
//! - Differencing and the augmented Dickey-Fuller test ([`differencing`])
//! - ARMA helpers: stationarity checks and psi weights ([`arma`])
//! - Nelder-Mead minimisation ([`optimize`])
//! - Piecewise-linear trends with penalised changepoints ([`changepoint`])
//! - Autocorrelation based period detection ([`seasonality`])

use thiserror::Error;

pub mod arma;
pub mod changepoint;
pub mod differencing;
pub mod optimize;
pub mod regression;
pub mod seasonality;
pub mod stats;

/// Errors that can occur in numerical calculations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MathError {
    #[error("Insufficient data for calculation: {0}")]
    InsufficientData(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Calculation error: {0}")]
    CalculationError(String),

    #[error("Singular matrix: {0}")]
    SingularMatrix(String),
}

/// Result type for numerical operations
pub type Result<T> = std::result::Result<T, MathError>;
