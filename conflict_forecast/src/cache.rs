//! Time-boxed prediction cache and single-flight coordination
//!
//! The cache is an injected capability: the engine talks to [`ForecastCache`], and
//! [`InMemoryForecastCache`] is the implementation used in-process. Reads of a valid
//! entry take a shared lock only, so concurrent readers never wait on each other.

use crate::error::{ForecastError, Result};
use crate::prediction::PredictionResult;
use chrono::{DateTime, Duration, Utc};
use parking_lot::{Condvar, Mutex, RwLock};
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

/// Source of the current time
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now = *now + by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Identity of a cached prediction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub location: String,
    pub horizon_days: u32,
    pub model_version: String,
}

impl CacheKey {
    pub fn new(
        location: impl Into<String>,
        horizon_days: u32,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            location: location.into(),
            horizon_days,
            model_version: model_version.into(),
        }
    }
}

/// A stored prediction and its lifetime
#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: Arc<PredictionResult>,
    pub stored_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Valid, but expiring within `window`
    pub fn is_near_expiry(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.is_valid(now) && self.expires_at - now <= window
    }
}

/// Cache contract used by the engine
pub trait ForecastCache: Send + Sync {
    /// A valid entry for `key`, or `None` on a miss
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Store `value` until now + `ttl`
    fn put(&self, key: CacheKey, value: Arc<PredictionResult>, ttl: Duration) -> Result<()>;

    /// Drop the entry for one key
    fn invalidate_key(&self, key: &CacheKey) -> Result<()>;

    /// Drop every entry for `location`, whatever the horizon or model version
    fn invalidate(&self, location: &str) -> Result<()>;
}

/// In-process cache behind a reader-writer lock
pub struct InMemoryForecastCache {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    clock: Arc<dyn Clock>,
}

impl InMemoryForecastCache {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            clock,
        }
    }

    /// Number of stored entries, expired ones included
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Remove expired entries, returning how many were dropped
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|_, entry| entry.is_valid(now));
        before - entries.len()
    }
}

impl Default for InMemoryForecastCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryForecastCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryForecastCache")
            .field("entries", &self.len())
            .finish()
    }
}

impl ForecastCache for InMemoryForecastCache {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let now = self.clock.now();
        Ok(self
            .entries
            .read()
            .get(key)
            .filter(|entry| entry.is_valid(now))
            .cloned())
    }

    fn put(&self, key: CacheKey, value: Arc<PredictionResult>, ttl: Duration) -> Result<()> {
        if ttl <= Duration::zero() {
            return Err(ForecastError::InvalidParameter(
                "Cache TTL must be positive".to_string(),
            ));
        }
        let stored_at = self.clock.now();
        let entry = CacheEntry {
            value,
            stored_at,
            expires_at: stored_at + ttl,
        };
        self.entries.write().insert(key, entry);
        Ok(())
    }

    fn invalidate_key(&self, key: &CacheKey) -> Result<()> {
        self.entries.write().remove(key);
        Ok(())
    }

    fn invalidate(&self, location: &str) -> Result<()> {
        self.entries.write().retain(|key, _| key.location != location);
        Ok(())
    }
}

/// Shared slot for one in-flight computation
struct Call<T> {
    result: Mutex<Option<Result<T>>>,
    done: Condvar,
}

/// At most one computation per key at a time
///
/// The first caller for a key runs the computation; callers arriving while it runs
/// block until it finishes and receive a clone of its outcome.
pub struct SingleFlight<K, T> {
    calls: Mutex<HashMap<K, Arc<Call<T>>>>,
}

impl<K, T> SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a computation for `key` is running
    pub fn is_in_flight(&self, key: &K) -> bool {
        self.calls.lock().contains_key(key)
    }

    /// Run `compute` for `key`, or wait for the computation already running
    pub fn run<F>(&self, key: K, compute: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let (call, leader) = {
            let mut calls = self.calls.lock();
            match calls.get(&key) {
                Some(call) => (Arc::clone(call), false),
                None => {
                    let call = Arc::new(Call {
                        result: Mutex::new(None),
                        done: Condvar::new(),
                    });
                    calls.insert(key.clone(), Arc::clone(&call));
                    (call, true)
                }
            }
        };

        if !leader {
            let mut result = call.result.lock();
            while result.is_none() {
                call.done.wait(&mut result);
            }
            return match result.as_ref() {
                Some(outcome) => outcome.clone(),
                None => Err(aborted()),
            };
        }

        let guard = FlightGuard {
            flights: self,
            key,
            call,
        };
        let outcome = compute();
        guard.complete(outcome.clone());
        outcome
    }
}

impl<K, T> Default for SingleFlight<K, T>
where
    K: Eq + Hash + Clone,
    T: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

fn aborted() -> ForecastError {
    ForecastError::AllModelsFailed("the in-flight computation was aborted".to_string())
}

/// Publishes the leader's outcome and retires the key, even if the leader unwinds
struct FlightGuard<'a, K, T>
where
    K: Eq + Hash,
{
    flights: &'a SingleFlight<K, T>,
    key: K,
    call: Arc<Call<T>>,
}

impl<K, T> FlightGuard<'_, K, T>
where
    K: Eq + Hash,
{
    fn complete(self, outcome: Result<T>) {
        *self.call.result.lock() = Some(outcome);
    }
}

impl<K, T> Drop for FlightGuard<'_, K, T>
where
    K: Eq + Hash,
{
    fn drop(&mut self) {
        {
            let mut result = self.call.result.lock();
            if result.is_none() {
                *result = Some(Err(aborted()));
            }
        }
        self.flights.calls.lock().remove(&self.key);
        self.call.done.notify_all();
    }
}
