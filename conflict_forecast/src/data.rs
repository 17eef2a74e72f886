//! Event records, equally spaced incident series, and the aggregator between them

use crate::config::AggregationConfig;
use crate::error::{ForecastError, Result};
use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Width of one series period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    /// One period per calendar day
    #[default]
    Daily,
    /// One period per ISO week, starting on Monday
    Weekly,
}

impl Granularity {
    /// Number of days covered by one period
    pub fn days(self) -> u32 {
        match self {
            Granularity::Daily => 1,
            Granularity::Weekly => 7,
        }
    }

    /// Start of the period containing `date`
    pub fn period_start(self, date: NaiveDate) -> NaiveDate {
        match self {
            Granularity::Daily => date,
            Granularity::Weekly => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
        }
    }

    /// Start of the period following the one starting at `start`
    pub fn next_start(self, start: NaiveDate) -> NaiveDate {
        start + Duration::days(i64::from(self.days()))
    }

    /// Whether `date` is a valid period start
    pub fn is_aligned(self, date: NaiveDate) -> bool {
        self.period_start(date) == date
    }
}

impl std::fmt::Display for Granularity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Granularity::Daily => write!(f, "daily"),
            Granularity::Weekly => write!(f, "weekly"),
        }
    }
}

/// A single recorded incident
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Location tag, e.g. an administrative region
    pub location: String,
    /// Day the incident occurred
    pub date: NaiveDate,
    /// Reported fatalities
    #[serde(default)]
    pub fatalities: u32,
}

impl EventRecord {
    pub fn new(location: impl Into<String>, date: NaiveDate, fatalities: u32) -> Self {
        Self {
            location: location.into(),
            date,
            fatalities,
        }
    }
}

/// One period of an incident series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// First day of the period
    pub period_start: NaiveDate,
    /// Number of incidents in the period
    pub count: u64,
    /// Fatalities summed over the period's incidents
    pub fatalities: u64,
}

/// Equally spaced, gap-free incident counts for one location
///
/// Periods are contiguous and strictly increasing; missing periods are present with a
/// zero count. A series is handed to forecasters read-only.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeSeries {
    location: String,
    granularity: Granularity,
    points: Vec<SeriesPoint>,
}

impl TimeSeries {
    /// Build a series, checking that periods are aligned and contiguous
    pub fn new(
        location: impl Into<String>,
        granularity: Granularity,
        points: Vec<SeriesPoint>,
    ) -> Result<Self> {
        if let Some(first) = points.first() {
            if !granularity.is_aligned(first.period_start) {
                return Err(ForecastError::DataError(format!(
                    "Period start {} is not aligned to {} periods",
                    first.period_start, granularity
                )));
            }
        }

        for pair in points.windows(2) {
            let expected = granularity.next_start(pair[0].period_start);
            if pair[1].period_start != expected {
                return Err(ForecastError::DataError(format!(
                    "Periods must be contiguous: expected {} after {}, found {}",
                    expected, pair[0].period_start, pair[1].period_start
                )));
            }
        }

        Ok(Self {
            location: location.into(),
            granularity,
            points,
        })
    }

    /// Build a series from consecutive counts starting at `start`, with no fatalities
    pub fn from_counts(
        location: impl Into<String>,
        granularity: Granularity,
        start: NaiveDate,
        counts: &[u64],
    ) -> Result<Self> {
        let mut period_start = granularity.period_start(start);
        let mut points = Vec::with_capacity(counts.len());
        for &count in counts {
            points.push(SeriesPoint {
                period_start,
                count,
                fatalities: 0,
            });
            period_start = granularity.next_start(period_start);
        }
        Self::new(location, granularity, points)
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Counts as floats, in period order
    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.count as f64).collect()
    }

    /// Number of periods with at least one incident
    pub fn nonzero_periods(&self) -> usize {
        self.points.iter().filter(|p| p.count > 0).count()
    }

    pub fn total_count(&self) -> u64 {
        self.points.iter().map(|p| p.count).sum()
    }

    pub fn total_fatalities(&self) -> u64 {
        self.points.iter().map(|p| p.fatalities).sum()
    }

    /// Historical fatalities per incident, 0 without incidents
    pub fn fatalities_per_incident(&self) -> f64 {
        let count = self.total_count();
        if count == 0 {
            0.0
        } else {
            self.total_fatalities() as f64 / count as f64
        }
    }

    pub fn first_period(&self) -> Option<NaiveDate> {
        self.points.first().map(|p| p.period_start)
    }

    pub fn last_period(&self) -> Option<NaiveDate> {
        self.points.last().map(|p| p.period_start)
    }

    /// The first `len` periods
    pub fn head(&self, len: usize) -> TimeSeries {
        TimeSeries {
            location: self.location.clone(),
            granularity: self.granularity,
            points: self.points[..len.min(self.points.len())].to_vec(),
        }
    }

    /// Periods starting on or before `as_of`
    pub fn truncate_to(&self, as_of: NaiveDate) -> TimeSeries {
        let keep = self
            .points
            .iter()
            .take_while(|p| p.period_start <= as_of)
            .count();
        self.head(keep)
    }

    /// Reject series with fewer than `min_nonzero` non-zero periods
    pub fn validate_history(&self, min_nonzero: usize) -> Result<()> {
        let got = self.nonzero_periods();
        if got < min_nonzero {
            return Err(ForecastError::InsufficientHistory {
                needed: min_nonzero,
                got,
            });
        }
        Ok(())
    }
}

/// Buckets raw events into a gap-free series for one location
#[derive(Debug, Clone)]
pub struct SeriesAggregator {
    granularity: Granularity,
    min_nonzero_periods: usize,
    history_window_days: Option<u32>,
}

impl SeriesAggregator {
    pub fn new(granularity: Granularity, min_nonzero_periods: usize) -> Self {
        Self {
            granularity,
            min_nonzero_periods,
            history_window_days: None,
        }
    }

    pub fn from_config(config: &AggregationConfig) -> Self {
        Self {
            granularity: config.granularity,
            min_nonzero_periods: config.min_nonzero_periods,
            history_window_days: config.history_window_days,
        }
    }

    /// Only keep events within `days` of the end of the history
    pub fn with_history_window(mut self, days: u32) -> Self {
        self.history_window_days = Some(days);
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Aggregate the events tagged `location` into a series.
    ///
    /// The history ends at `as_of` when given, otherwise at the latest event; trailing
    /// periods up to `as_of` are zero-filled.
    pub fn aggregate(
        &self,
        location: &str,
        events: &[EventRecord],
        as_of: Option<NaiveDate>,
    ) -> Result<TimeSeries> {
        let relevant: Vec<&EventRecord> = events
            .iter()
            .filter(|e| e.location == location)
            .filter(|e| as_of.map_or(true, |cutoff| e.date <= cutoff))
            .collect();

        let Some(latest) = relevant.iter().map(|e| e.date).max() else {
            return Err(ForecastError::InsufficientHistory {
                needed: self.min_nonzero_periods,
                got: 0,
            });
        };
        let end = as_of.unwrap_or(latest);
        let window_start = self
            .history_window_days
            .map(|days| end - Duration::days(i64::from(days.max(1)) - 1));

        let mut buckets: BTreeMap<NaiveDate, (u64, u64)> = BTreeMap::new();
        for event in relevant {
            if window_start.map_or(false, |start| event.date < start) {
                continue;
            }
            let bucket = buckets
                .entry(self.granularity.period_start(event.date))
                .or_insert((0, 0));
            bucket.0 += 1;
            bucket.1 += u64::from(event.fatalities);
        }

        let Some(&first) = buckets.keys().next() else {
            return Err(ForecastError::InsufficientHistory {
                needed: self.min_nonzero_periods,
                got: 0,
            });
        };
        let last = self.granularity.period_start(end);

        let mut points = Vec::new();
        let mut period = first;
        while period <= last {
            let (count, fatalities) = buckets.get(&period).copied().unwrap_or((0, 0));
            points.push(SeriesPoint {
                period_start: period,
                count,
                fatalities,
            });
            period = self.granularity.next_start(period);
        }

        let series = TimeSeries::new(location, self.granularity, points)?;
        series.validate_history(self.min_nonzero_periods)?;
        log::debug!(
            "Aggregated {} {} periods for {}",
            series.len(),
            self.granularity,
            location
        );
        Ok(series)
    }
}

/// Data loader for incident event files
#[derive(Debug)]
pub struct DataLoader;

impl DataLoader {
    /// Load events from a CSV file with `location,date,fatalities` columns
    pub fn events_from_csv<P: AsRef<Path>>(path: P) -> Result<Vec<EventRecord>> {
        let file = File::open(path)?;
        Self::events_from_reader(file)
    }

    /// Load events from any CSV source with a header row
    pub fn events_from_reader<R: Read>(reader: R) -> Result<Vec<EventRecord>> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let mut events = Vec::new();
        for record in csv_reader.deserialize() {
            let event: EventRecord = record?;
            if event.location.is_empty() {
                return Err(ForecastError::DataError(
                    "Event record has an empty location".to_string(),
                ));
            }
            events.push(event);
        }
        Ok(events)
    }

    /// Group events by location, keeping file order within each group
    pub fn group_by_location(events: Vec<EventRecord>) -> BTreeMap<String, Vec<EventRecord>> {
        let mut grouped: BTreeMap<String, Vec<EventRecord>> = BTreeMap::new();
        for event in events {
            grouped.entry(event.location.clone()).or_default().push(event);
        }
        grouped
    }
}
