//! Agricultural weather data service.
//!
//! Daily batch job that:
//! - Downloads and decodes each configured source into raw gridded rows
//! - Backfills missed or failed days from the import ledger
//! - Computes degree-day datasets from the raw temperatures
//! - Reports days with import problems

mod config;
mod notify;
mod scheduler;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use ingestion::SchemeFetcher;
use storage::SqliteStore;

use config::AppConfig;
use notify::LogNotifier;
use scheduler::{Scheduler, DEFAULT_STATUS_DAYS};

#[derive(Parser, Debug)]
#[command(name = "agweather")]
#[command(about = "Daily agricultural weather ingestion and degree-day computation")]
struct Args {
    /// Configuration file
    #[arg(long, env = "AGWEATHER_CONFIG", default_value = "config/agweather.yaml", global = true)]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// Serve Prometheus metrics on this port
    #[arg(long, env = "METRICS_PORT", global = true)]
    metrics_port: Option<u16>,

    /// Per-request download timeout in seconds
    #[arg(long, default_value = "300", global = true)]
    request_timeout: u64,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ingest every source, derive every dataset, then report status
    Run,
    /// Ingest from the configured sources
    Ingest {
        /// Only this source (default: all configured)
        #[arg(short, long)]
        source: Option<String>,
        /// Ingest this date even if the ledger marks it done (requires --source)
        #[arg(short, long, requires = "source")]
        date: Option<NaiveDate>,
    },
    /// Compute derived datasets
    Derive {
        /// Only this dataset (default: all configured)
        #[arg(short, long)]
        name: Option<String>,
    },
    /// Print the import status of recent days
    Status {
        /// Number of days before today to check
        #[arg(long, default_value_t = DEFAULT_STATUS_DAYS)]
        days: u32,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();

    // Initialize tracing
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if let Some(port) = args.metrics_port {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(port = port, "Prometheus metrics exporter listening");
    }

    let config = AppConfig::load(&args.config)?;
    let store = Arc::new(open_store(&config.database_url).await?);
    let fetcher = Arc::new(
        SchemeFetcher::new(Duration::from_secs(args.request_timeout))
            .context("Failed to build HTTP client")?,
    );
    let scheduler = Scheduler::new(config, store, fetcher, Arc::new(LogNotifier))?;

    let today = Local::now().date_naive();
    info!(today = %today, "Starting agweather");

    match args.command {
        Command::Run => {
            let report = scheduler.run(today).await?;
            print!("{}", report);
        }
        Command::Ingest {
            source: Some(source),
            date: Some(date),
        } => {
            let outcome = scheduler.ingest_date(&source, date, today).await?;
            info!(
                source = %outcome.source,
                date = %outcome.date,
                rows = outcome.rows_written,
                "Ingest complete"
            );
        }
        Command::Ingest {
            source: Some(source),
            date: None,
        } => {
            let summary = scheduler.ingest_source(&source, today).await?;
            for (date, e) in &summary.failed {
                error!(source = %source, date = %date, error = %e, "Date failed");
            }
        }
        Command::Ingest { source: None, .. } => scheduler.ingest_all(today).await,
        Command::Derive { name: Some(name) } => {
            let summary = scheduler.derive(&name, today).await?;
            for (date, e) in &summary.failed {
                error!(derived_type = %name, date = %date, error = %e, "Date failed");
            }
        }
        Command::Derive { name: None } => scheduler.derive_all(today).await,
        Command::Status { days, json } => {
            let report = scheduler.check_status(today, days).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
    }

    Ok(())
}

/// Open the store, creating the database directory for file URLs.
///
/// In-memory URLs get a single shared connection; a pool would give each
/// connection its own empty database.
async fn open_store(database_url: &str) -> Result<SqliteStore> {
    let store = if database_url.contains(":memory:") || database_url.contains("mode=memory") {
        SqliteStore::open_memory().await
    } else {
        match database_url.strip_prefix("sqlite://") {
            Some(path) if !path.is_empty() => SqliteStore::open(Path::new(path)).await,
            _ => SqliteStore::connect(database_url).await,
        }
    };
    store.with_context(|| format!("Failed to open database {}", database_url))
}
