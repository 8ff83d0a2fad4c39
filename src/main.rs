//! CLI Entry Point for weather-station
//!
//! Provides command-line interface for:
//! - Running the station (acquisition, journal, upload) with an operator console
//! - One-shot recovery of journaled data into the database
//! - Inspecting a day log
//!
//! # Usage
//!
//! ```bash
//! weather-station run --config config/station.toml
//! weather-station replay "2024/03/01 09:00:00" "2024/03/01 12:00:00"
//! weather-station decode data/weather-data_2024-03-01.csv
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use weather_station::clock::{Clock, LocalZone, SystemClock};
use weather_station::config::StationConfig;
use weather_station::console;
use weather_station::data::{DayLogStore, FsMedium, ReplayEngine};
use weather_station::data::record;
use weather_station::logging;
use weather_station::network::{HttpTransport, MockTransport, SessionHandle, Transport, Uploader};
use weather_station::status::StatusBoard;
use weather_station::Pipeline;

#[derive(Parser)]
#[command(name = "weather-station")]
#[command(about = "Weather station telemetry: journal, upload and recovery", long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the station until Ctrl+C, reading console commands from stdin
    Run {
        /// Accept every upload locally instead of contacting the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Upload journaled readings between two local times, then exit
    Replay {
        /// Start, "YYYY/MM/DD HH:MM:SS"
        start: String,
        /// End, "YYYY/MM/DD HH:MM:SS"
        end: String,
        /// Accept every upload locally instead of contacting the database
        #[arg(long)]
        dry_run: bool,
    },

    /// Print the readings of a day log as JSON lines
    Decode {
        /// Day log file
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    logging::init_from_config(&config)?;
    let zone = config.zone()?;

    match cli.command {
        Commands::Run { dry_run } => run_station(config, zone, dry_run).await,
        Commands::Replay {
            start,
            end,
            dry_run,
        } => replay_once(config, zone, &start, &end, dry_run).await,
        Commands::Decode { file } => decode_file(&file, zone).await,
    }
}

fn load_config(path: Option<&Path>) -> Result<StationConfig> {
    let config = match path {
        Some(path) => StationConfig::load_from(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => StationConfig::load()?,
    };
    config.validate()?;
    Ok(config)
}

fn transport(config: &StationConfig, dry_run: bool) -> Result<Arc<dyn Transport>> {
    if dry_run {
        info!("Dry run: uploads are accepted locally");
        Ok(Arc::new(MockTransport::new()))
    } else {
        Ok(Arc::new(HttpTransport::new(&config.upload)?))
    }
}

async fn run_station(config: StationConfig, zone: LocalZone, dry_run: bool) -> Result<()> {
    let handle = Pipeline::new(config.clone())
        .with_transport(transport(&config, dry_run)?)
        .with_session(SessionHandle::connected())
        .start()?;

    println!("{} running. Type 'help' for console commands, Ctrl+C to stop.", config.station.name);

    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Could not listen for Ctrl+C, stopping");
        }
    };
    console::serve(&handle, zone, BufReader::new(tokio::io::stdin()), stop).await;

    handle.shutdown().await;
    Ok(())
}

async fn replay_once(
    config: StationConfig,
    zone: LocalZone,
    start: &str,
    end: &str,
    dry_run: bool,
) -> Result<()> {
    let start = zone
        .parse(start)
        .context("Malformed start timestamp, could not convert to UNIX timestamp")?;
    let end = zone
        .parse(end)
        .context("Malformed end timestamp, could not convert to UNIX timestamp")?;

    let status = StatusBoard::new();
    let clock: Arc<dyn Clock> = Arc::new(SystemClock::new(zone));
    let store = DayLogStore::new(Arc::new(FsMedium::new(&config.storage.log_dir)));
    let (network_tx, network_rx) = mpsc::channel(config.upload.channel_capacity);

    let uploader = Uploader::new(
        transport(&config, dry_run)?,
        SessionHandle::connected(),
        &config.upload,
        status.clone(),
    );
    let stats = uploader.stats();
    let upload_task = tokio::spawn(uploader.run(network_rx));

    let engine = ReplayEngine::new(store, clock, network_tx, status);
    let report = engine.replay_with_report(start, end).await?;
    drop(engine);
    upload_task.await?;

    println!(
        "Queued {} readings from {} day(s): {} delivered, {} dropped, {} malformed lines skipped",
        report.queued,
        report.days_visited,
        stats.delivered(),
        stats.dropped(),
        report.malformed
    );
    Ok(())
}

async fn decode_file(path: &Path, zone: LocalZone) -> Result<()> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut lines = BufReader::new(file).lines();
    let mut number = 0usize;

    while let Some(line) = lines.next_line().await? {
        number += 1;
        if line.trim().is_empty() {
            continue;
        }
        match record::try_decode(&line, zone) {
            Ok(reading) => println!("{}", serde_json::to_string(&reading)?),
            Err(e) => warn!(line = number, error = %e, "Malformed record"),
        }
    }
    Ok(())
}
