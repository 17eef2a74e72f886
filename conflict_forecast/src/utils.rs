//! Utility functions for the conflict_forecast crate

use crate::data::Granularity;
use chrono::NaiveDate;

/// Start dates of the `horizon` periods following `last_period`
pub fn future_periods(
    last_period: NaiveDate,
    granularity: Granularity,
    horizon: usize,
) -> Vec<NaiveDate> {
    let mut periods = Vec::with_capacity(horizon);
    let mut current = last_period;
    for _ in 0..horizon {
        current = granularity.next_start(current);
        periods.push(current);
    }
    periods
}

/// Number of periods needed to cover `horizon_days`
pub fn horizon_periods(horizon_days: u32, granularity: Granularity) -> usize {
    let days = granularity.days();
    ((horizon_days + days - 1) / days) as usize
}
