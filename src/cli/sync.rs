//! Sync command implementation

use crate::controller::{RunOptions, SyncController};
use crate::dataset::IngestConfig;
use crate::metrics;
use crate::remote::http::HttpRemote;
use crate::shutdown::SharedShutdown;
use crate::store::json::JsonStore;
use crate::{RunState, SyncMode};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::CliError;

/// Maximum allowed concurrency to prevent self-inflicted rate limiting
const MAX_CONCURRENCY: usize = 32;

/// Parse a date in YYYYMMDD or YYYY-MM-DD format.
fn parse_date(s: &str) -> Result<NaiveDate, String> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| format!("'{s}' is not a valid date (expected YYYYMMDD or YYYY-MM-DD)"))
}

/// Parse and validate concurrency value
fn parse_concurrency(s: &str) -> Result<usize, String> {
    let value: usize = s
        .parse()
        .map_err(|_| format!("'{s}' is not a valid number"))?;

    if value == 0 {
        return Err("concurrency must be at least 1".to_string());
    }
    if value > MAX_CONCURRENCY {
        return Err(format!(
            "concurrency {value} exceeds maximum of {MAX_CONCURRENCY}"
        ));
    }
    Ok(value)
}

/// Batch Ingest CLI
#[derive(Parser, Debug)]
#[command(name = "batch-ingest")]
#[command(about = "Incremental batch ingestion from rate-limited data services", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Config file with datasets and connection targets
    #[arg(long, global = true, default_value = "ingest.json")]
    pub config: PathBuf,

    /// Prometheus scrape address (e.g. 0.0.0.0:9090); overrides the config
    #[arg(long, global = true)]
    pub metrics_addr: Option<SocketAddr>,
}

/// CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sync one dataset
    Sync(SyncArgs),

    /// List configured datasets
    Datasets(super::DatasetsCommand),
}

/// Sync command arguments
#[derive(Parser, Debug)]
pub struct SyncArgs {
    /// Dataset name from the config
    #[arg(long)]
    pub dataset: String,

    /// Window mode: full, incremental, or smart (default: the dataset's)
    #[arg(long)]
    pub mode: Option<SyncMode>,

    /// Window start (YYYYMMDD), required for incremental mode
    #[arg(long, value_parser = parse_date)]
    pub start: Option<NaiveDate>,

    /// Window end (YYYYMMDD, default: today)
    #[arg(long, value_parser = parse_date)]
    pub end: Option<NaiveDate>,

    /// Number of concurrent batches (default: the dataset's rate limit)
    #[arg(long, value_parser = parse_concurrency)]
    pub concurrency: Option<usize>,

    /// Plain progress output without the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}

impl SyncArgs {
    /// Execute the sync command.
    ///
    /// # Returns
    /// The run's terminal state; the caller maps it to an exit code.
    pub async fn execute(
        &self,
        cli: &Cli,
        shutdown: SharedShutdown,
    ) -> Result<RunState, CliError> {
        let config = IngestConfig::load(&cli.config)?;
        init_metrics(cli, &config)?;

        let dataset = config.dataset(&self.dataset)?.clone();
        let remote = Arc::new(HttpRemote::new(&config.base_url)?);
        let store = Arc::new(JsonStore::open(&config.data_dir)?);
        let controller =
            SyncController::new(remote, store.clone(), store, shutdown);

        let bar = if self.no_progress {
            None
        } else {
            Some(create_progress_bar(&dataset.name))
        };
        let progress = bar.clone().map(|bar| {
            Arc::new(move |done: u64, total: u64, _pct: f64| {
                bar.set_length(total);
                bar.set_position(done);
            }) as crate::progress::ProgressCallback
        });

        let result = controller
            .sync(
                &dataset,
                RunOptions {
                    mode: self.mode,
                    start: self.start,
                    end: self.end,
                    concurrency: self.concurrency,
                    progress,
                },
            )
            .await?;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }

        info!(
            dataset = %dataset.name,
            state = ?result.state,
            "{}/{} batches persisted, {} rows ({} dropped)",
            result.successful_batches,
            result.total_batches,
            result.rows_affected,
            result.rows_dropped
        );
        for error in &result.errors {
            warn!("{error}");
        }
        Ok(result.state)
    }
}

/// Install the Prometheus exporter when a scrape address is configured.
fn init_metrics(cli: &Cli, config: &IngestConfig) -> Result<(), CliError> {
    let addr = match (&cli.metrics_addr, &config.metrics_addr) {
        (Some(addr), _) => Some(*addr),
        (None, Some(raw)) => Some(raw.parse().map_err(|_| {
            CliError::InvalidArgument(format!("invalid metrics address '{raw}'"))
        })?),
        (None, None) => None,
    };
    if let Some(addr) = addr {
        if let Err(e) = metrics::init_metrics(addr) {
            // Metrics are best-effort; the sync itself proceeds.
            warn!("Metrics exporter failed to start: {e}");
        }
    }
    Ok(())
}

/// Create progress bar with style
fn create_progress_bar(dataset: &str) -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .expect("hardcoded template is valid")
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Syncing {dataset}"));
    pb
}
