//! # Conflict Forecast
//!
//! Per-location forecasting of conflict incident counts.
//!
//! ## Features
//!
//! - Event aggregation into gap-free daily or weekly series
//! - Three forecasters: seasonal-trend with changepoints, ARIMA with automatic order
//!   selection, and an OLS linear trend
//! - Weighted ensemble with reconciled intervals
//! - Rolling-origin backtests reporting MAPE
//! - Risk scores, tiers and location ranking
//! - A time-boxed cache with single-flight recomputation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use conflict_forecast::cache::InMemoryForecastCache;
//! use conflict_forecast::data::{DataLoader, SeriesAggregator};
//! use conflict_forecast::source::EventSeriesSource;
//! use conflict_forecast::{ForecastConfig, ForecastEngine};
//! use std::sync::Arc;
//!
//! # fn main() -> conflict_forecast::error::Result<()> {
//! let config = ForecastConfig::default();
//! let events = DataLoader::events_from_csv("events.csv")?;
//! let source = EventSeriesSource::new(events, SeriesAggregator::from_config(&config.aggregation));
//!
//! let engine = ForecastEngine::new(
//!     config,
//!     Arc::new(source),
//!     Arc::new(InMemoryForecastCache::new()),
//! )?;
//!
//! // Forecast the next 30 days for one location
//! let prediction = engine.forecast("Borno", 30, None)?;
//! println!("{}", prediction.to_json()?);
//!
//! // Rank the five locations most at risk
//! for assessment in engine.top_at_risk(5)? {
//!     println!("{} {} {:.2}", assessment.rank, assessment.location, assessment.risk_score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod config;
pub mod data;
pub mod ensemble;
pub mod error;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod prediction;
pub mod risk;
pub mod source;
pub mod utils;

// Re-export commonly used types
pub use crate::cache::{ForecastCache, InMemoryForecastCache};
pub use crate::config::ForecastConfig;
pub use crate::data::{DataLoader, Granularity, TimeSeries};
pub use crate::error::ForecastError;
pub use crate::models::{ForecastModel, ForecastPoint, ModelFitResult, ModelKind};
pub use crate::pipeline::ForecastEngine;
pub use crate::prediction::PredictionResult;
pub use crate::risk::{RiskAssessment, RiskTier};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
