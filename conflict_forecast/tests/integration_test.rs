use chrono::{Duration, NaiveDate, TimeZone, Utc};
use conflict_forecast::cache::{
    CacheEntry, CacheKey, ForecastCache, InMemoryForecastCache, ManualClock,
};
use conflict_forecast::config::ForecastConfig;
use conflict_forecast::data::{EventRecord, Granularity, SeriesAggregator, SeriesPoint, TimeSeries};
use conflict_forecast::error::{ForecastError, Result};
use conflict_forecast::models::ModelKind;
use conflict_forecast::risk::RiskTier;
use conflict_forecast::source::{EventSeriesSource, SeriesSource, StaticSeriesSource};
use conflict_forecast::{ForecastEngine, PredictionResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

fn start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()
}

fn test_config() -> ForecastConfig {
    let mut config = ForecastConfig::default();
    config.fit_timeout_ms = 60_000;
    config.autoregressive.max_p = 2;
    config.autoregressive.max_q = 1;
    config.autoregressive.max_iterations = 400;
    config.backtest.folds = 2;
    config.worker_threads = 4;
    config
}

/// Poisson incident counts around a linear rate with a weekend bump
fn noisy_series(
    location: &str,
    days: usize,
    base: f64,
    trend: f64,
    fatalities: u64,
    seed: u64,
) -> TimeSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let points = (0..days)
        .map(|t| {
            let weekend = if t % 7 >= 5 { 1.5 } else { 0.0 };
            let rate = (base + trend * t as f64 + weekend).max(0.2);
            let count = Poisson::new(rate).unwrap().sample(&mut rng) as u64;
            SeriesPoint {
                period_start: start_date() + Duration::days(t as i64),
                count,
                fatalities: count * fatalities,
            }
        })
        .collect();
    TimeSeries::new(location, Granularity::Daily, points).unwrap()
}

fn engine_with(source: StaticSeriesSource, cache: Arc<dyn ForecastCache>) -> ForecastEngine {
    ForecastEngine::new(test_config(), Arc::new(source), cache).unwrap()
}

fn borno_source() -> StaticSeriesSource {
    StaticSeriesSource::new().with_series(noisy_series("Borno", 120, 6.0, 0.02, 2, 7))
}

fn assert_bounds_hold(prediction: &PredictionResult) {
    for point in &prediction.points {
        assert!(point.lower_bound() <= point.point_estimate());
        assert!(point.point_estimate() <= point.upper_bound());
        assert!(point.point_estimate() >= 0.0);
        assert!(point.width() > 0.0);
    }
}

#[test]
fn test_forecast_twice_is_served_from_cache() {
    let engine = engine_with(borno_source(), Arc::new(InMemoryForecastCache::new()));

    let first = engine.forecast("Borno", 30, None).unwrap();
    let second = engine.forecast("Borno", 30, None).unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(*first, *second);
    assert_eq!(engine.compute_count(), 1);

    assert_eq!(first.points.len(), 30);
    assert_eq!(first.points[0].period_start(), start_date() + Duration::days(120));
    assert_bounds_hold(&first);
    assert!(first.model_label.contains("linear_trend"));
    assert_eq!(first.constituents.len(), 3);
    let weight_sum: f64 = first.constituents.iter().map(|c| c.weight).sum();
    assert!((weight_sum - 1.0).abs() < 1e-9);
}

#[test]
fn test_concurrent_misses_compute_once() {
    let engine = Arc::new(engine_with(borno_source(), Arc::new(InMemoryForecastCache::new())));
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                engine.forecast("Borno", 30, None)
            })
        })
        .collect();

    let results: Vec<Arc<PredictionResult>> = handles
        .into_iter()
        .map(|h| h.join().unwrap().unwrap())
        .collect();

    assert_eq!(engine.compute_count(), 1);
    for result in &results[1..] {
        assert_eq!(**result, *results[0]);
    }
}

#[test]
fn test_short_series_is_rejected_as_insufficient_history() {
    let short =
        TimeSeries::from_counts("Kano", Granularity::Daily, start_date(), &[3, 1, 4, 1, 5])
            .unwrap();
    let engine = engine_with(
        StaticSeriesSource::new().with_series(short),
        Arc::new(InMemoryForecastCache::new()),
    );

    match engine.forecast("Kano", 30, None) {
        Err(ForecastError::InsufficientHistory { needed, got }) => {
            assert_eq!(needed, 10);
            assert_eq!(got, 5);
        }
        other => panic!("Expected InsufficientHistory, got {:?}", other),
    }
}

#[test]
fn test_unknown_location_and_zero_horizon() {
    let engine = engine_with(borno_source(), Arc::new(InMemoryForecastCache::new()));
    assert!(matches!(
        engine.forecast("Atlantis", 30, None),
        Err(ForecastError::UnknownLocation(_))
    ));
    assert!(matches!(
        engine.forecast("Borno", 0, None),
        Err(ForecastError::InvalidParameter(_))
    ));
}

#[test]
fn test_top_at_risk_orders_and_truncates() {
    let mut source = StaticSeriesSource::new();
    // Rising trends score above flat ones
    source.insert(noisy_series("Borno", 90, 4.0, 0.08, 3, 1));
    source.insert(noisy_series("Yobe", 90, 4.0, 0.04, 1, 2));
    source.insert(noisy_series("Adamawa", 90, 5.0, 0.0, 1, 3));
    source.insert(noisy_series("Kaduna", 90, 6.0, -0.03, 2, 4));
    source.insert(noisy_series("Zamfara", 90, 3.0, 0.02, 4, 5));
    source.insert(noisy_series("Katsina", 90, 2.0, 0.01, 1, 6));
    source.insert(
        TimeSeries::from_counts("Lagos", Granularity::Daily, start_date(), &[1, 0, 2]).unwrap(),
    );

    let engine = engine_with(source, Arc::new(InMemoryForecastCache::new()));
    let ranked = engine.top_at_risk(5).unwrap();

    assert_eq!(ranked.len(), 5);
    assert!(ranked.iter().all(|a| a.location != "Lagos"));
    for (i, assessment) in ranked.iter().enumerate() {
        assert_eq!(assessment.rank, i + 1);
    }
    for pair in ranked.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let ordered = a.risk_score > b.risk_score
            || (a.risk_score == b.risk_score
                && (a.projected_fatalities > b.projected_fatalities
                    || (a.projected_fatalities == b.projected_fatalities
                        && a.location < b.location)));
        assert!(ordered, "{:?} should rank above {:?}", a, b);
    }

    // Predictions made while ranking are cached
    let computed = engine.compute_count();
    engine.forecast("Borno", engine.config().default_horizon_days, None).unwrap();
    assert_eq!(engine.compute_count(), computed);
}

#[test]
fn test_expired_entry_is_recomputed() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let cache = Arc::new(InMemoryForecastCache::with_clock(clock.clone()));
    let engine = engine_with(borno_source(), cache).with_clock(clock.clone());

    let first = engine.forecast("Borno", 14, None).unwrap();
    clock.advance(Duration::hours(3));
    engine.forecast("Borno", 14, None).unwrap();
    assert_eq!(engine.compute_count(), 1);

    clock.advance(Duration::hours(4));
    let refreshed = engine.forecast("Borno", 14, None).unwrap();
    assert_eq!(engine.compute_count(), 2);
    assert!(refreshed.trained_at > first.trained_at);
}

#[test]
fn test_near_expiry_entry_is_refreshed_by_the_next_caller() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let cache = Arc::new(InMemoryForecastCache::with_clock(clock.clone()));
    let engine = engine_with(borno_source(), cache).with_clock(clock.clone());

    engine.forecast("Borno", 14, None).unwrap();
    clock.advance(Duration::hours(6) - Duration::minutes(5));
    engine.forecast("Borno", 14, None).unwrap();
    assert_eq!(engine.compute_count(), 2);

    // The refreshed entry is fresh again
    engine.forecast("Borno", 14, None).unwrap();
    assert_eq!(engine.compute_count(), 2);
}

/// Static series whose next read, once armed, blocks until the test lets it through
struct GatedSource {
    inner: StaticSeriesSource,
    armed: AtomicBool,
    entered: Barrier,
    release: Barrier,
}

impl GatedSource {
    fn new(inner: StaticSeriesSource) -> Self {
        Self {
            inner,
            armed: AtomicBool::new(false),
            entered: Barrier::new(2),
            release: Barrier::new(2),
        }
    }
}

impl SeriesSource for GatedSource {
    fn locations(&self) -> Vec<String> {
        self.inner.locations()
    }

    fn series(&self, location: &str, as_of: Option<NaiveDate>) -> Result<TimeSeries> {
        if self.armed.swap(false, Ordering::SeqCst) {
            self.entered.wait();
            self.release.wait();
        }
        self.inner.series(location, as_of)
    }
}

#[test]
fn test_near_expiry_entry_is_served_while_another_caller_refreshes() {
    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()));
    let cache = Arc::new(InMemoryForecastCache::with_clock(clock.clone()));
    let source = Arc::new(GatedSource::new(borno_source()));
    let engine = ForecastEngine::new(test_config(), source.clone(), cache)
        .unwrap()
        .with_clock(clock.clone());

    let stale = engine.forecast("Borno", 14, None).unwrap();
    clock.advance(Duration::hours(6) - Duration::minutes(5));
    source.armed.store(true, Ordering::SeqCst);

    thread::scope(|scope| {
        let leader = scope.spawn(|| engine.forecast("Borno", 14, None).unwrap());

        // The leader is now inside its refresh, holding the flight for the key
        source.entered.wait();
        let served = engine.forecast("Borno", 14, None).unwrap();
        assert!(Arc::ptr_eq(&served, &stale));

        source.release.wait();
        let refreshed = leader.join().unwrap();
        assert!(!Arc::ptr_eq(&refreshed, &stale));
    });

    assert_eq!(engine.compute_count(), 2);
}

#[test]
fn test_refresh_forces_recompute() {
    let engine = engine_with(borno_source(), Arc::new(InMemoryForecastCache::new()));
    engine.forecast("Borno", 30, None).unwrap();
    engine.refresh("Borno", 30).unwrap();
    assert_eq!(engine.compute_count(), 2);
}

#[test]
fn test_historical_forecast_bypasses_cache() {
    let engine = engine_with(borno_source(), Arc::new(InMemoryForecastCache::new()));
    let as_of = start_date() + Duration::days(99);

    let first = engine.forecast("Borno", 7, Some(as_of)).unwrap();
    engine.forecast("Borno", 7, Some(as_of)).unwrap();

    assert_eq!(engine.compute_count(), 2);
    assert_eq!(first.as_of, Some(as_of));
    assert_eq!(first.points[0].period_start(), as_of + Duration::days(1));
}

/// A cache whose backend is always down
struct UnreachableCache;

impl ForecastCache for UnreachableCache {
    fn get(&self, _key: &CacheKey) -> Result<Option<CacheEntry>> {
        Err(ForecastError::CacheUnavailable("connection refused".to_string()))
    }

    fn put(&self, _key: CacheKey, _value: Arc<PredictionResult>, _ttl: Duration) -> Result<()> {
        Err(ForecastError::CacheUnavailable("connection refused".to_string()))
    }

    fn invalidate_key(&self, _key: &CacheKey) -> Result<()> {
        Err(ForecastError::CacheUnavailable("connection refused".to_string()))
    }

    fn invalidate(&self, _location: &str) -> Result<()> {
        Err(ForecastError::CacheUnavailable("connection refused".to_string()))
    }
}

#[test]
fn test_unavailable_cache_degrades_to_direct_compute() {
    let engine = engine_with(borno_source(), Arc::new(UnreachableCache));

    let first = engine.forecast("Borno", 30, None).unwrap();
    let second = engine.refresh("Borno", 30).unwrap();

    assert_eq!(engine.compute_count(), 2);
    assert_eq!(first.points.len(), second.points.len());
}

#[test]
fn test_prediction_serializes_to_finite_json() {
    let engine = engine_with(borno_source(), Arc::new(InMemoryForecastCache::new()));
    let prediction = engine.forecast("Borno", 30, None).unwrap();

    let mape = prediction.mape.expect("backtest should run on 120 days of history");
    assert!(mape >= 0.0);
    assert!(prediction.projected_fatalities > 0.0);

    let json: serde_json::Value = serde_json::from_str(&prediction.to_json().unwrap()).unwrap();
    assert_eq!(json["location"], "Borno");
    assert_eq!(json["horizon_days"], 30);
    assert_eq!(json["points"].as_array().unwrap().len(), 30);
    assert!(json["points"][0]["point_estimate"].is_f64());
    assert!(json["mape"].is_f64());
}

#[test]
fn test_overrunning_fits_time_out_and_are_excluded() {
    let mut config = test_config();
    config.fit_timeout_ms = 200;
    config.autoregressive.max_p = 5;
    config.autoregressive.max_q = 5;
    config.autoregressive.max_iterations = 1_000_000;
    config.backtest.enabled = false;

    let long = noisy_series("Borno", 3000, 6.0, 0.001, 1, 11);
    let engine = ForecastEngine::new(
        config,
        Arc::new(StaticSeriesSource::new().with_series(long)),
        Arc::new(InMemoryForecastCache::new()),
    )
    .unwrap();

    let prediction = engine.forecast("Borno", 14, None).unwrap();
    assert_bounds_hold(&prediction);
    assert!(prediction.model_label.contains("linear_trend"));
    assert!(!prediction.model_label.contains("autoregressive"));

    let autoregressive = prediction
        .constituents
        .iter()
        .find(|c| c.model == ModelKind::Autoregressive)
        .unwrap();
    assert_eq!(autoregressive.weight, 0.0);
    assert!(autoregressive
        .error
        .as_deref()
        .unwrap()
        .contains("exceeded its fit budget of 200 ms"));

    let weight: f64 = prediction.constituents.iter().map(|c| c.weight).sum();
    assert!((weight - 1.0).abs() < 1e-9);
}

/// `per_day` Poisson events a day for `days` days from the start date
fn daily_events(location: &str, days: i64, per_day: f64, seed: u64) -> Vec<EventRecord> {
    let mut rng = StdRng::seed_from_u64(seed);
    let poisson = Poisson::new(per_day).unwrap();
    (0..days)
        .flat_map(|t| {
            let count = poisson.sample(&mut rng) as usize;
            let day = start_date() + Duration::days(t);
            std::iter::repeat_with(move || EventRecord::new(location, day, 1)).take(count)
        })
        .collect()
}

#[test]
fn test_location_gone_quiet_is_zero_filled_and_ranks_low() {
    let end = start_date() + Duration::days(199);
    let mut events = daily_events("Active", 200, 3.0, 21);
    events.push(EventRecord::new("Active", end, 1));
    events.extend(daily_events("Quiet", 100, 11.0, 22));
    let source = EventSeriesSource::new(events, SeriesAggregator::new(Granularity::Daily, 10));

    let quiet = source.series("Quiet", None).unwrap();
    assert_eq!(source.series("Active", None).unwrap().last_period(), Some(end));
    assert_eq!(quiet.last_period(), Some(end));
    assert_eq!(quiet.len(), 200);
    assert!(quiet.points()[100..].iter().all(|p| p.count == 0));

    let engine = ForecastEngine::new(
        test_config(),
        Arc::new(source),
        Arc::new(InMemoryForecastCache::new()),
    )
    .unwrap();
    let ranked = engine.top_at_risk(2).unwrap();

    assert_eq!(ranked.len(), 2);
    assert_eq!(ranked[0].location, "Active");
    assert_eq!(ranked[1].location, "Quiet");
    assert_eq!(ranked[1].recent_rate, 0.0);
    assert_eq!(ranked[1].risk_score, 0.0);
    assert_eq!(ranked[1].risk_tier, RiskTier::Low);
    assert!(ranked[0].risk_score > 0.0);
}
