use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use conflict_forecast::data::{DataLoader, SeriesAggregator};
use conflict_forecast::error::Result;
use conflict_forecast::source::EventSeriesSource;
use conflict_forecast::{ForecastConfig, ForecastEngine, InMemoryForecastCache};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Forecast conflict incidents from an events CSV and print JSON reports
#[derive(Debug, Parser)]
#[command(name = "forecast_report", version)]
struct Cli {
    /// CSV file with `location,date,fatalities` rows
    #[arg(long)]
    events: PathBuf,

    /// Optional TOML configuration
    #[arg(long)]
    config: Option<PathBuf>,

    /// Date every series runs to (YYYY-MM-DD); the latest event when omitted
    #[arg(long)]
    reference_date: Option<NaiveDate>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Forecast a single location
    Forecast {
        location: String,

        /// Horizon in days; the configured default when omitted
        #[arg(long)]
        horizon: Option<u32>,

        /// Forecast as if the history ended on this date (YYYY-MM-DD)
        #[arg(long)]
        as_of: Option<NaiveDate>,
    },
    /// Rank locations by risk
    Rank {
        /// Number of locations to list
        #[arg(short = 'n', long, default_value_t = 10)]
        top: usize,
    },
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ForecastConfig::from_file(path)?,
        None => ForecastConfig::default(),
    };

    let events = DataLoader::events_from_csv(&cli.events)?;
    log::info!("Loaded {} events from {}", events.len(), cli.events.display());

    let aggregator = SeriesAggregator::from_config(&config.aggregation);
    let default_horizon = config.default_horizon_days;
    let mut source = EventSeriesSource::new(events, aggregator);
    if let Some(date) = cli.reference_date {
        source = source.with_reference_date(date);
    }
    let engine = ForecastEngine::new(
        config,
        Arc::new(source),
        Arc::new(InMemoryForecastCache::new()),
    )?;

    let output = match cli.command {
        Command::Forecast {
            location,
            horizon,
            as_of,
        } => {
            let horizon = horizon.unwrap_or(default_horizon);
            let prediction = engine.forecast(&location, horizon, as_of)?;
            serde_json::to_string_pretty(prediction.as_ref())?
        }
        Command::Rank { top } => serde_json::to_string_pretty(&engine.top_at_risk(top)?)?,
    };
    println!("{}", output);
    Ok(())
}

fn main() -> ExitCode {
    pretty_env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
