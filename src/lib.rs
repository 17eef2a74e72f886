//! # Conflict Watch
//!
//! `conflict_watch` bundles the workspace crates behind one dependency:
//!
//! - [`forecast`]: the per-location forecasting engine (`conflict_forecast`)
//! - [`math`]: the numerical routines it is built on (`forecast_math`)
//!
//! ## Example
//!
//! ```
//! use conflict_watch::forecast::risk::{RiskThresholds, RiskTier};
//! use conflict_watch::math::stats::mean;
//!
//! let recent = mean(&[4.0, 6.0, 5.0]);
//! let baseline = mean(&[2.0, 2.0, 2.0, 2.0]);
//! let tier = RiskThresholds::default().tier(recent / baseline);
//! assert_eq!(tier, RiskTier::Critical);
//! ```

pub use conflict_forecast as forecast;
pub use forecast_math as math;

pub use conflict_forecast::{
    ForecastConfig, ForecastEngine, ForecastError, InMemoryForecastCache, PredictionResult,
    RiskAssessment, RiskTier,
};

/// Versions of the bundled crates
pub fn versions() -> [(&'static str, &'static str); 2] {
    [
        (env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")),
        (conflict_forecast::NAME, conflict_forecast::VERSION),
    ]
}
