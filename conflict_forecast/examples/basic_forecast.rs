use chrono::{Duration, NaiveDate};
use conflict_forecast::cache::InMemoryForecastCache;
use conflict_forecast::data::{EventRecord, SeriesAggregator};
use conflict_forecast::source::EventSeriesSource;
use conflict_forecast::{ForecastConfig, ForecastEngine};
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    pretty_env_logger::init();

    println!("Conflict Forecast: Basic Forecasting Example");
    println!("============================================\n");

    let events = create_sample_events();
    println!("Sample data created: {} events\n", events.len());

    let config = ForecastConfig::default();
    let aggregator = SeriesAggregator::from_config(&config.aggregation);
    let engine = ForecastEngine::new(
        config,
        Arc::new(EventSeriesSource::new(events, aggregator)),
        Arc::new(InMemoryForecastCache::new()),
    )?;

    let prediction = engine.forecast("Borno", 14, None)?;
    println!("Forecast for {} using {}", prediction.location, prediction.model_label);
    for point in &prediction.points {
        println!(
            "  {}: {:.1} ({:.1} - {:.1})",
            point.period_start(),
            point.point_estimate(),
            point.lower_bound(),
            point.upper_bound()
        );
    }
    match prediction.mape {
        Some(mape) => println!("Backtest MAPE: {:.3}", mape),
        None => println!("Backtest MAPE: unknown"),
    }

    println!("\nRisk ranking:");
    for assessment in engine.top_at_risk(3)? {
        println!(
            "  {}. {} score {:.2} ({})",
            assessment.rank, assessment.location, assessment.risk_score, assessment.risk_tier
        );
    }

    Ok(())
}

/// Three regions with a weekly rhythm; one of them escalating over the last month
fn create_sample_events() -> Vec<EventRecord> {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap_or_default();
    let regions = [("Borno", 4u64, 2u32), ("Yobe", 2, 1), ("Adamawa", 1, 3)];

    let mut events = Vec::new();
    for day in 0..180u64 {
        let date = start + Duration::days(day as i64);
        for (name, base, fatalities) in regions {
            let weekly = if day % 7 >= 5 { 2 } else { 0 };
            let escalation = if name == "Borno" && day >= 150 { (day - 150) / 5 } else { 0 };
            for _ in 0..(base + weekly + escalation) {
                events.push(EventRecord::new(name, date, fatalities));
            }
        }
    }
    events
}
