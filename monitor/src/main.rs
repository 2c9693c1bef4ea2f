//! Linkpulse - Internet Connection Quality Monitor
//!
//! Periodically probes the connection, persists measurements, detects
//! outage/recovery/speed-shift events and serves rolling summaries.

mod analytics;
mod collector;
mod config;
mod detector;
mod output;
mod pipeline;
mod probe;
mod storage;
#[cfg(test)]
mod testutil;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use storage::{MeasurementStore, SqliteStore};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "linkpulse")]
#[command(version = "0.1.0")]
#[command(about = "Internet connection quality monitor", long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "linkpulse.toml")]
    config: PathBuf,

    /// Print a summary for the time range
    #[arg(long)]
    summary: bool,

    /// Print the summary as JSON instead of text
    #[arg(long)]
    json: bool,

    /// Export measurements for the time range as CSV
    #[arg(long)]
    export: bool,

    /// Run one forced measurement cycle and exit
    #[arg(long)]
    now: bool,

    /// Print the most recent N measurements and exit
    #[arg(long, value_name = "N")]
    recent: Option<usize>,

    /// Print detected events (for the time range, or the most recent 50)
    #[arg(long)]
    events: bool,

    /// Use the simulated probe instead of real network requests
    #[arg(long)]
    simulate: bool,

    /// Output file for export
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Time range: --last 24h, 7d, 30m
    #[arg(long)]
    last: Option<String>,

    /// Start time for range: YYYY-MM-DD HH:MM
    #[arg(long)]
    start: Option<String>,

    /// End time for range: YYYY-MM-DD HH:MM
    #[arg(long)]
    end: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = config::Config::load_or_default(&args.config)?;
    if args.simulate {
        config.probe.simulate = true;
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .init();

    info!("Linkpulse v0.1.0 - Internet Connection Quality Monitor");

    if args.summary {
        run_summary(&config, &args)
    } else if args.export {
        run_export(&config, &args)
    } else if args.events {
        run_events(&config, &args)
    } else if let Some(limit) = args.recent {
        run_recent(&config, limit)
    } else if args.now {
        run_now(&config).await
    } else {
        run_monitoring(&config).await
    }
}

fn open_store(config: &config::Config) -> Result<Arc<SqliteStore>> {
    let store = Arc::new(SqliteStore::new(&config.general.database_path)?);
    store.initialize()?;
    Ok(store)
}

async fn run_monitoring(config: &config::Config) -> Result<()> {
    info!("Starting monitoring mode");
    info!("Probe interval: {}ms", config.general.interval_ms);
    info!("Database: {:?}", config.general.database_path);

    let store = open_store(config)?;

    if config.probe.simulate {
        info!("Using simulated probe");
        let probe = probe::SimulatedProbe::new(config.simulation.clone());
        let pipeline = pipeline::Pipeline::new(config, probe, store.clone(), store)?;
        pipeline.run().await
    } else {
        let probe = probe::HttpProbe::new(config.probe.clone())?;
        let pipeline = pipeline::Pipeline::new(config, probe, store.clone(), store)?;
        pipeline.run().await
    }
}

async fn run_now(config: &config::Config) -> Result<()> {
    info!("Running one forced measurement cycle");

    let store = open_store(config)?;

    if config.probe.simulate {
        let probe = probe::SimulatedProbe::new(config.simulation.clone());
        let pipeline = pipeline::Pipeline::new(config, probe, store.clone(), store)?;
        run_now_on(pipeline).await
    } else {
        let probe = probe::HttpProbe::new(config.probe.clone())?;
        let pipeline = pipeline::Pipeline::new(config, probe, store.clone(), store)?;
        run_now_on(pipeline).await
    }
}

async fn run_now_on<P, MS, ES>(mut pipeline: pipeline::Pipeline<P, MS, ES>) -> Result<()>
where
    P: probe::ProbeStrategy,
    MS: MeasurementStore,
    ES: storage::EventStore,
{
    let mut events_rx = pipeline.publisher().subscribe_events();

    let measurement = pipeline.run_once().await?;
    output::print_measurement(&measurement);

    // show any transitions this cycle triggered
    while let Ok(event) = events_rx.try_recv() {
        output::print_event(&event);
    }

    Ok(())
}

fn run_recent(config: &config::Config, limit: usize) -> Result<()> {
    let store = open_store(config)?;

    let mut measurements = store.find_recent(limit)?;
    measurements.reverse(); // print oldest first

    for m in &measurements {
        output::print_measurement(m);
    }

    Ok(())
}

fn run_events(config: &config::Config, args: &Args) -> Result<()> {
    use storage::EventStore;

    let store = open_store(config)?;

    let events = if args.last.is_some() || (args.start.is_some() && args.end.is_some()) {
        let (from_ms, to_ms) = parse_time_range(args)?;
        EventStore::find_by_range(store.as_ref(), from_ms, to_ms)?
    } else {
        let mut recent = EventStore::find_recent(store.as_ref(), 50)?;
        recent.reverse(); // print oldest first
        recent
    };

    info!("Found {} events", events.len());
    for event in &events {
        output::print_event(event);
    }

    Ok(())
}

fn run_summary(config: &config::Config, args: &Args) -> Result<()> {
    let (from_ms, to_ms) = parse_time_range(args)?;

    let store = open_store(config)?;
    let window = store.find_by_range(from_ms, to_ms)?;
    info!("Found {} measurements", window.len());

    let summary = analytics::compute_summary(&window, &config.thresholds, &config.analytics);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        output::print_summary(&summary);
    }

    Ok(())
}

fn run_export(config: &config::Config, args: &Args) -> Result<()> {
    let (from_ms, to_ms) = parse_time_range(args)?;

    let store = open_store(config)?;
    let measurements = store.find_by_range(from_ms, to_ms)?;
    info!("Found {} measurements", measurements.len());

    let output_path = args.output.clone().unwrap_or_else(|| {
        PathBuf::from(format!(
            "linkpulse_export_{}.csv",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });

    output::export_csv(&measurements, &output_path)?;
    info!("Exported to {:?}", output_path);

    Ok(())
}

fn parse_time_range(args: &Args) -> Result<(i64, i64)> {
    if let Some(last) = &args.last {
        let duration = parse_duration(last)?;
        let end = chrono::Utc::now().timestamp_millis();
        let start = end - duration.num_milliseconds();
        Ok((start, end))
    } else if let (Some(start_str), Some(end_str)) = (&args.start, &args.end) {
        let start = chrono::NaiveDateTime::parse_from_str(start_str, "%Y-%m-%d %H:%M")
            .context("Invalid --start, expected YYYY-MM-DD HH:MM")?
            .and_utc()
            .timestamp_millis();
        let end = chrono::NaiveDateTime::parse_from_str(end_str, "%Y-%m-%d %H:%M")
            .context("Invalid --end, expected YYYY-MM-DD HH:MM")?
            .and_utc()
            .timestamp_millis();
        Ok((start, end))
    } else {
        // Default: last 24 hours
        let end = chrono::Utc::now().timestamp_millis();
        let start = end - 24 * 3600 * 1000;
        Ok((start, end))
    }
}

fn parse_duration(s: &str) -> Result<chrono::Duration> {
    let s = s.trim();
    if let Some(hours) = s.strip_suffix('h') {
        Ok(chrono::Duration::hours(hours.parse()?))
    } else if let Some(days) = s.strip_suffix('d') {
        Ok(chrono::Duration::days(days.parse()?))
    } else if let Some(minutes) = s.strip_suffix('m') {
        Ok(chrono::Duration::minutes(minutes.parse()?))
    } else {
        anyhow::bail!("Invalid duration format. Use: 24h, 7d, 30m, etc.")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_suffixes_parse() {
        assert_eq!(parse_duration("24h").unwrap(), chrono::Duration::hours(24));
        assert_eq!(parse_duration("7d").unwrap(), chrono::Duration::days(7));
        assert_eq!(parse_duration("30m").unwrap(), chrono::Duration::minutes(30));
        assert!(parse_duration("10x").is_err());
    }

    #[test]
    fn explicit_range_parses_to_millis() {
        let args = Args {
            config: PathBuf::from("linkpulse.toml"),
            summary: true,
            json: false,
            export: false,
            now: false,
            recent: None,
            events: false,
            simulate: false,
            output: None,
            last: None,
            start: Some("2026-01-01 00:00".to_string()),
            end: Some("2026-01-02 00:00".to_string()),
        };

        let (from_ms, to_ms) = parse_time_range(&args).unwrap();
        assert_eq!(to_ms - from_ms, 24 * 3600 * 1000);
    }
}
