//! Providers of per-location incident series

use crate::data::{DataLoader, EventRecord, SeriesAggregator, TimeSeries};
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Supplies already aggregated series to the engine
pub trait SeriesSource: Send + Sync {
    /// Every location the source can provide, sorted
    fn locations(&self) -> Vec<String>;

    /// The series for `location`, ending at `as_of` when given
    fn series(&self, location: &str, as_of: Option<NaiveDate>) -> Result<TimeSeries>;
}

/// Pre-aggregated series held in memory
#[derive(Debug, Clone, Default)]
pub struct StaticSeriesSource {
    series: BTreeMap<String, TimeSeries>,
}

impl StaticSeriesSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace the series for its location
    pub fn insert(&mut self, series: TimeSeries) {
        self.series.insert(series.location().to_string(), series);
    }

    pub fn with_series(mut self, series: TimeSeries) -> Self {
        self.insert(series);
        self
    }
}

impl FromIterator<TimeSeries> for StaticSeriesSource {
    fn from_iter<I: IntoIterator<Item = TimeSeries>>(iter: I) -> Self {
        let mut source = Self::new();
        for series in iter {
            source.insert(series);
        }
        source
    }
}

impl SeriesSource for StaticSeriesSource {
    fn locations(&self) -> Vec<String> {
        self.series.keys().cloned().collect()
    }

    fn series(&self, location: &str, as_of: Option<NaiveDate>) -> Result<TimeSeries> {
        let series = self
            .series
            .get(location)
            .ok_or_else(|| ForecastError::UnknownLocation(location.to_string()))?;
        Ok(match as_of {
            Some(cutoff) => series.truncate_to(cutoff),
            None => series.clone(),
        })
    }
}

/// Raw events aggregated on demand.
///
/// Every location's series runs to one shared end date, so a location that has gone
/// quiet is zero-filled up to the latest event seen anywhere.
#[derive(Debug, Clone)]
pub struct EventSeriesSource {
    events: BTreeMap<String, Vec<EventRecord>>,
    aggregator: SeriesAggregator,
    end_date: Option<NaiveDate>,
}

impl EventSeriesSource {
    pub fn new(events: Vec<EventRecord>, aggregator: SeriesAggregator) -> Self {
        let end_date = events.iter().map(|e| e.date).max();
        Self {
            events: DataLoader::group_by_location(events),
            aggregator,
            end_date,
        }
    }

    /// End every series at `date` instead of the latest event
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.end_date = Some(date);
        self
    }

    pub fn end_date(&self) -> Option<NaiveDate> {
        self.end_date
    }
}

impl SeriesSource for EventSeriesSource {
    fn locations(&self) -> Vec<String> {
        self.events.keys().cloned().collect()
    }

    fn series(&self, location: &str, as_of: Option<NaiveDate>) -> Result<TimeSeries> {
        let events = self
            .events
            .get(location)
            .ok_or_else(|| ForecastError::UnknownLocation(location.to_string()))?;
        self.aggregator
            .aggregate(location, events, as_of.or(self.end_date))
    }
}
