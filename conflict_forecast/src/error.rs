//! Error types for the conflict_forecast crate

use forecast_math::MathError;
use thiserror::Error;

/// Custom error types for the conflict_forecast crate
///
/// Foreign errors are stored as rendered messages so the enum stays `Clone`; callers
/// waiting on a shared in-flight computation each receive their own copy of the outcome.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ForecastError {
    /// Too little or too sparse history to fit anything
    #[error("Insufficient history: need at least {needed} non-zero periods, got {got}")]
    InsufficientHistory { needed: usize, got: usize },

    /// A single forecaster failed to fit
    #[error("Model fit failed for {model}: {reason}")]
    ModelFit { model: String, reason: String },

    /// A single forecaster exceeded its time budget
    #[error("Model {model} exceeded its fit budget of {budget_ms} ms")]
    Timeout { model: String, budget_ms: u64 },

    /// The forecast cache could not be reached
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// Every constituent forecaster failed
    #[error("All forecasters failed: {0}")]
    AllModelsFailed(String),

    /// The requested location has no data
    #[error("Unknown location: {0}")]
    UnknownLocation(String),

    /// Error from invalid parameters
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Error related to parameter validation
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Error related to data validation or processing
    #[error("Data error: {0}")]
    DataError(String),

    /// Error from numeric routines
    #[error("Math error: {0}")]
    Math(#[from] MathError),

    /// Error from IO operations
    #[error("IO error: {0}")]
    IoError(String),

    /// Error from CSV parsing
    #[error("CSV error: {0}")]
    CsvError(String),

    /// Error from JSON serialization
    #[error("JSON error: {0}")]
    JsonError(String),

    /// Error from configuration parsing
    #[error("Config error: {0}")]
    ConfigError(String),
}

impl ForecastError {
    /// Whether the error is confined to one constituent forecaster
    pub fn is_model_failure(&self) -> bool {
        matches!(
            self,
            ForecastError::ModelFit { .. } | ForecastError::Timeout { .. } | ForecastError::Math(_)
        )
    }
}

/// Result type with our custom error
pub type Result<T> = std::result::Result<T, ForecastError>;

impl From<std::io::Error> for ForecastError {
    fn from(err: std::io::Error) -> Self {
        ForecastError::IoError(err.to_string())
    }
}

impl From<csv::Error> for ForecastError {
    fn from(err: csv::Error) -> Self {
        ForecastError::CsvError(err.to_string())
    }
}

impl From<serde_json::Error> for ForecastError {
    fn from(err: serde_json::Error) -> Self {
        ForecastError::JsonError(err.to_string())
    }
}

impl From<toml::de::Error> for ForecastError {
    fn from(err: toml::de::Error) -> Self {
        ForecastError::ConfigError(err.to_string())
    }
}
