//! The forecasting engine: cache, constituent fits, ensemble, backtest and ranking
//!
//! One call to [`ForecastEngine::forecast`] runs the whole per-location pipeline:
//!
//! ```text
//! cache ─hit──────────────────────────────────────────────────────▶ caller
//!   └miss▶ source ▶ {seasonal, autoregressive, linear} ▶ combiner ▶ backtest ▶ cache
//! ```
//!
//! Constituent fits run on their own threads and are bounded by `fit_timeout_ms`. A fit
//! that overruns is reported as a timeout; its thread sees the same deadline and stops
//! at its next check.

use crate::cache::{CacheKey, Clock, ForecastCache, SingleFlight, SystemClock};
use crate::config::ForecastConfig;
use crate::data::TimeSeries;
use crate::ensemble::{CombinedForecast, EnsembleCombiner};
use crate::error::{ForecastError, Result};
use crate::metrics::AccuracyTracker;
use crate::models::{
    AutoregressiveForecaster, FitDeadline, ForecastModel, Forecaster, LinearTrendForecaster,
    ModelFitResult, ModelKind, SeasonalTrendForecaster,
};
use crate::prediction::PredictionResult;
use crate::risk::{observed_rates, RiskAssessment, RiskClassifier};
use crate::source::SeriesSource;
use crate::utils::horizon_periods;
use chrono::NaiveDate;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

/// Longest cache lifetime honoured, about ten years
const MAX_CACHE_SECS: u64 = 10 * 365 * 24 * 60 * 60;

fn seconds(secs: u64) -> chrono::Duration {
    chrono::Duration::seconds(secs.min(MAX_CACHE_SECS) as i64)
}

/// Per-location forecasting pipeline with an injected cache
pub struct ForecastEngine {
    config: ForecastConfig,
    source: Arc<dyn SeriesSource>,
    cache: Arc<dyn ForecastCache>,
    clock: Arc<dyn Clock>,
    forecasters: Vec<Forecaster>,
    combiner: EnsembleCombiner,
    tracker: AccuracyTracker,
    classifier: RiskClassifier,
    flights: SingleFlight<CacheKey, Arc<PredictionResult>>,
    computations: AtomicU64,
}

impl std::fmt::Debug for ForecastEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForecastEngine")
            .field("model_version", &self.config.model_version)
            .field("forecasters", &self.forecasters)
            .field("computations", &self.compute_count())
            .finish()
    }
}

impl ForecastEngine {
    /// Build an engine from a validated configuration
    pub fn new(
        config: ForecastConfig,
        source: Arc<dyn SeriesSource>,
        cache: Arc<dyn ForecastCache>,
    ) -> Result<Self> {
        config.validate()?;

        let forecasters = vec![
            Forecaster::SeasonalTrend(SeasonalTrendForecaster::new(
                &config.seasonal,
                config.confidence_level,
            )?),
            Forecaster::Autoregressive(AutoregressiveForecaster::new(
                &config.autoregressive,
                config.confidence_level,
            )?),
            Forecaster::LinearTrend(LinearTrendForecaster::new(config.confidence_level)?),
        ];
        let combiner =
            EnsembleCombiner::new(config.ensemble.weights()?, config.ensemble.min_half_width);
        let tracker = AccuracyTracker::from_config(&config.backtest)?;
        let classifier = RiskClassifier::from_config(&config.risk)?;

        Ok(Self {
            config,
            source,
            cache,
            clock: Arc::new(SystemClock),
            forecasters,
            combiner,
            tracker,
            classifier,
            flights: SingleFlight::new(),
            computations: AtomicU64::new(0),
        })
    }

    /// Use `clock` for training timestamps and cache freshness decisions
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Number of full pipeline computations run so far
    pub fn compute_count(&self) -> u64 {
        self.computations.load(Ordering::SeqCst)
    }

    fn cache_key(&self, location: &str, horizon_days: u32) -> CacheKey {
        CacheKey::new(location, horizon_days, self.config.model_version.clone())
    }

    fn ttl(&self) -> chrono::Duration {
        seconds(self.config.cache.ttl_secs)
    }

    fn refresh_ahead(&self) -> chrono::Duration {
        seconds(self.config.cache.refresh_ahead_secs)
    }

    /// Forecast `horizon_days` ahead for `location`.
    ///
    /// Fresh cached results are returned as is. An entry close to expiry is served
    /// while another caller refreshes it; otherwise the caller refreshes it. Misses are
    /// computed once per key however many callers are waiting. With `as_of` the forecast
    /// is historical and bypasses the cache entirely.
    pub fn forecast(
        &self,
        location: &str,
        horizon_days: u32,
        as_of: Option<NaiveDate>,
    ) -> Result<Arc<PredictionResult>> {
        if horizon_days == 0 {
            return Err(ForecastError::InvalidParameter(
                "Horizon must be at least one day".to_string(),
            ));
        }
        if as_of.is_some() {
            return self.compute(location, horizon_days, as_of).map(Arc::new);
        }

        let key = self.cache_key(location, horizon_days);
        match self.cache.get(&key) {
            Ok(Some(entry)) => {
                let now = self.clock.now();
                if !entry.is_near_expiry(now, self.refresh_ahead()) {
                    log::debug!("Cache hit for {} ({} days)", location, horizon_days);
                    return Ok(entry.value);
                }
                if self.flights.is_in_flight(&key) {
                    log::debug!(
                        "Serving near-expiry entry for {} while a refresh runs",
                        location
                    );
                    return Ok(entry.value);
                }
                log::debug!("Refreshing near-expiry entry for {}", location);
            }
            Ok(None) => log::debug!("Cache miss for {} ({} days)", location, horizon_days),
            Err(e) => {
                log::warn!("Cache unavailable, computing {} directly: {}", location, e);
                return self.compute(location, horizon_days, None).map(Arc::new);
            }
        }

        self.flights.run(key.clone(), || {
            // Another leader may have stored a fresh result since our lookup
            if let Ok(Some(entry)) = self.cache.get(&key) {
                if !entry.is_near_expiry(self.clock.now(), self.refresh_ahead()) {
                    return Ok(entry.value);
                }
            }

            let prediction = Arc::new(self.compute(location, horizon_days, None)?);
            if let Err(e) = self.cache.put(key.clone(), Arc::clone(&prediction), self.ttl()) {
                log::warn!("Could not cache forecast for {}: {}", location, e);
            }
            Ok(prediction)
        })
    }

    /// Drop cached forecasts for `location` and recompute the given horizon
    pub fn refresh(&self, location: &str, horizon_days: u32) -> Result<Arc<PredictionResult>> {
        if let Err(e) = self.cache.invalidate(location) {
            log::warn!("Could not invalidate cache for {}: {}", location, e);
        }
        self.forecast(location, horizon_days, None)
    }

    /// Rank every location the source knows and return the `n` most at risk.
    ///
    /// Locations are forecast over `default_horizon_days` on a worker pool, reusing
    /// cached predictions where fresh. Locations that cannot be forecast are skipped.
    pub fn top_at_risk(&self, n: usize) -> Result<Vec<RiskAssessment>> {
        if n == 0 {
            return Ok(Vec::new());
        }

        let locations = self.source.locations();
        let horizon_days = self.config.default_horizon_days;
        let workers = self.worker_count().min(locations.len()).max(1);
        let next = AtomicUsize::new(0);
        let predictions: Mutex<Vec<Arc<PredictionResult>>> =
            Mutex::new(Vec::with_capacity(locations.len()));

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| loop {
                    let i = next.fetch_add(1, Ordering::SeqCst);
                    let Some(location) = locations.get(i) else {
                        break;
                    };
                    match self.forecast(location, horizon_days, None) {
                        Ok(prediction) => predictions.lock().push(prediction),
                        Err(ForecastError::InsufficientHistory { needed, got }) => log::info!(
                            "Skipping {}: {} of {} required periods",
                            location,
                            got,
                            needed
                        ),
                        Err(e) => log::warn!("Skipping {}: {}", location, e),
                    }
                });
            }
        });

        let assessments = predictions
            .into_inner()
            .iter()
            .map(|p| self.classifier.assess(p))
            .collect();
        let mut ranked = RiskClassifier::rank(assessments);
        ranked.truncate(n);
        Ok(ranked)
    }

    fn worker_count(&self) -> usize {
        if self.config.worker_threads > 0 {
            return self.config.worker_threads;
        }
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Run the full pipeline for one location, without the cache
    fn compute(
        &self,
        location: &str,
        horizon_days: u32,
        as_of: Option<NaiveDate>,
    ) -> Result<PredictionResult> {
        self.computations.fetch_add(1, Ordering::SeqCst);

        let series = self.source.series(location, as_of)?;
        series.validate_history(self.config.aggregation.min_nonzero_periods)?;
        let horizon = horizon_periods(horizon_days, series.granularity());

        let combined = self.ensemble(&series, horizon)?;

        let mape = if self.config.backtest.enabled {
            match self.tracker.backtest(&series, horizon, |train, h| {
                self.ensemble(train, h)
                    .map(|c| c.points.iter().map(|p| p.point_estimate()).collect())
            }) {
                Ok(report) => Some(report.mape),
                Err(e) => {
                    log::warn!("Backtest for {} failed, MAPE unknown: {}", location, e);
                    None
                }
            }
        } else {
            None
        };

        let projected_incidents: f64 = combined.points.iter().map(|p| p.point_estimate()).sum();
        let projected_fatalities = projected_incidents * series.fatalities_per_incident();
        let (recent_rate, baseline_rate) =
            observed_rates(&series, self.config.risk.recent_window_days);

        let prediction = PredictionResult {
            location: location.to_string(),
            horizon_days,
            granularity: series.granularity(),
            points: combined.points,
            mape,
            model_label: combined.model_label,
            constituents: combined.constituents,
            projected_incidents,
            projected_fatalities,
            recent_rate,
            baseline_rate,
            trained_at: self.clock.now(),
            as_of,
            model_version: self.config.model_version.clone(),
        };
        prediction.ensure_finite()?;

        log::info!(
            "Forecast {} for {} periods with {} (MAPE {})",
            location,
            horizon,
            prediction.model_label,
            prediction
                .mape
                .map_or_else(|| "unknown".to_string(), |m| format!("{:.3}", m))
        );
        Ok(prediction)
    }

    /// Fit every constituent and combine
    fn ensemble(&self, series: &TimeSeries, horizon: usize) -> Result<CombinedForecast> {
        let outcomes = self.fit_constituents(series, horizon);
        self.combiner.combine(&outcomes)
    }

    /// Fit the constituents concurrently, each bounded by the fit timeout
    fn fit_constituents(
        &self,
        series: &TimeSeries,
        horizon: usize,
    ) -> Vec<(ModelKind, Result<ModelFitResult>)> {
        let budget_ms = self.config.fit_timeout_ms;
        let deadline = FitDeadline::after_ms(budget_ms);
        let shared = Arc::new(series.clone());
        let (tx, rx) = mpsc::channel();

        let mut outcomes: Vec<(ModelKind, Result<ModelFitResult>)> =
            Vec::with_capacity(self.forecasters.len());
        let mut pending = 0;
        for forecaster in &self.forecasters {
            let kind = forecaster.kind();
            let forecaster = forecaster.clone().with_deadline(deadline);
            let series = Arc::clone(&shared);
            let tx = tx.clone();
            let spawned = thread::Builder::new()
                .name(format!("fit-{}", kind))
                .spawn(move || {
                    let outcome = forecaster.fit(&series, horizon);
                    // The receiver is gone once the deadline has passed
                    let _ = tx.send((kind, outcome));
                });
            match spawned {
                Ok(_) => pending += 1,
                Err(e) => outcomes.push((
                    kind,
                    Err(ForecastError::ModelFit {
                        model: kind.to_string(),
                        reason: format!("could not start fit thread: {}", e),
                    }),
                )),
            }
        }
        drop(tx);

        let mut timed_out = false;
        while pending > 0 {
            let remaining = deadline.at().saturating_duration_since(Instant::now());
            match rx.recv_timeout(remaining) {
                Ok((kind, outcome)) => {
                    pending -= 1;
                    match &outcome {
                        Err(e) => log::warn!("{} failed for {}: {}", kind, series.location(), e),
                        Ok(fit) => {
                            if let Some(source) = fit.fallback() {
                                log::warn!(
                                    "{} fell back to {} for {}",
                                    kind,
                                    source,
                                    series.location()
                                );
                            }
                        }
                    }
                    outcomes.push((kind, outcome));
                }
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        for kind in ModelKind::ALL {
            if outcomes.iter().any(|(k, _)| *k == kind) {
                continue;
            }
            let error = if timed_out {
                log::warn!(
                    "{} timed out after {} ms for {}",
                    kind,
                    budget_ms,
                    series.location()
                );
                ForecastError::Timeout {
                    model: kind.to_string(),
                    budget_ms,
                }
            } else {
                ForecastError::ModelFit {
                    model: kind.to_string(),
                    reason: "fit thread exited without a result".to_string(),
                }
            };
            outcomes.push((kind, Err(error)));
        }

        outcomes.sort_by_key(|(kind, _)| *kind);
        outcomes
    }
}
