//! # Batch Ingest Library
//!
//! An incremental batch-ingestion engine for rate-limited remote data sources.
//! Given a logical pull request that may span decades of history, the engine
//! splits it into small, independently-retriable batches, schedules them
//! concurrently under per-endpoint throughput limits, and drives each batch
//! through fetch → transform → validate → persist with retry and failure
//! isolation. A single failing batch never blocks or corrupts the rest of a
//! run.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use batch_ingest::controller::{RunOptions, SyncController};
//! use batch_ingest::dataset::DatasetDescriptor;
//! use batch_ingest::remote::http::HttpRemote;
//! use batch_ingest::store::json::JsonStore;
//! use batch_ingest::shutdown::ShutdownCoordinator;
//! use batch_ingest::SyncMode;
//!
//! # async fn example(dataset: DatasetDescriptor) -> Result<(), Box<dyn std::error::Error>> {
//! let remote = Arc::new(HttpRemote::new("https://data.example.com")?);
//! let store = Arc::new(JsonStore::open("./data")?);
//! let controller = SyncController::new(
//!     remote,
//!     store.clone(),
//!     store,
//!     ShutdownCoordinator::shared(),
//! );
//!
//! let result = controller
//!     .sync(
//!         &dataset,
//!         RunOptions {
//!             mode: Some(SyncMode::Smart),
//!             ..Default::default()
//!         },
//!     )
//!     .await?;
//! println!(
//!     "{}/{} batches persisted",
//!     result.successful_batches, result.total_batches
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`limiter`] - Per-endpoint concurrency caps and rolling-window throttles
//! - [`remote`] - Remote source boundary, error classification, HTTP adapter
//! - [`plan`] - Partition and map strategies, batch planning
//! - [`client`] - Paginated fetch with retry and backoff
//! - [`processor`] - Concurrent batch execution (transform, validate, persist)
//! - [`watermark`] - Sync window resolution and watermark advancement
//! - [`controller`] - Top-level run state machine
//! - [`store`] - Storage sink and watermark store boundaries plus adapters
//! - [`dataset`] - Declarative per-dataset descriptors
//!
//! ## Guarantees
//!
//! - Partition strategies cover the requested domain exactly once, with no
//!   gap and no overlap.
//! - `successful_batches` advances only after rows are confirmed persisted,
//!   never on a bare fetch.
//! - The per-dataset watermark is monotonic and only moves past a contiguous
//!   prefix of committed sub-ranges.

#![warn(missing_docs)]
#![warn(clippy::all)]

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// CLI command implementations
pub mod cli;

/// Paginated fetch client with retry
pub mod client;

/// Top-level sync controller
pub mod controller;

/// Declarative dataset descriptors
pub mod dataset;

/// Per-endpoint rate limiting
pub mod limiter;

/// Production observability metrics
pub mod metrics;

/// Batch planning: sources, partition and map strategies
pub mod plan;

/// Concurrent batch execution
pub mod processor;

/// Progress tracking and reporting
pub mod progress;

/// Remote source boundary and adapters
pub mod remote;

/// Graceful shutdown coordination shared across modules
pub mod shutdown;

/// Storage sink and watermark store boundaries and adapters
pub mod store;

/// Sync window resolution and watermark advancement
pub mod watermark;

// Re-export commonly used types
pub use plan::BatchSpec;

/// A single tabular row as fetched from a remote source.
///
/// Rows are kept as loosely-typed JSON objects until the transform stage
/// coerces the columns a dataset declares.
pub type Row = serde_json::Map<String, serde_json::Value>;

/// How a run derives its fetch window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Fetch from the dataset's earliest known date to now.
    Full,
    /// Fetch a caller-supplied window.
    Incremental,
    /// Derive the start from the stored watermark plus a safety lookback;
    /// falls back to [`SyncMode::Full`] when no watermark exists.
    #[default]
    Smart,
}

impl std::fmt::Display for SyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SyncMode::Full => "full",
            SyncMode::Incremental => "incremental",
            SyncMode::Smart => "smart",
        };
        write!(f, "{s}")
    }
}

impl FromStr for SyncMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(SyncMode::Full),
            "incremental" => Ok(SyncMode::Incremental),
            "smart" => Ok(SyncMode::Smart),
            _ => Err(format!(
                "Invalid sync mode: {s}. Valid options: full, incremental, smart"
            )),
        }
    }
}

/// Final status of one batch attempt chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Rows confirmed persisted.
    Success,
    /// All retries exhausted or a data error occurred.
    Failed,
    /// Never attempted (or abandoned mid-flight) because the run was
    /// cancelled or aborted; contributes no rows.
    SkippedCancelled,
}

/// Recorded result of one batch.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// The spec this outcome belongs to.
    pub spec: BatchSpec,
    /// Terminal status.
    pub status: BatchStatus,
    /// Rows confirmed persisted by the sink (0 unless `Success`).
    pub rows_affected: u64,
    /// Rows dropped by validation predicates.
    pub rows_dropped: u64,
    /// Error message for failed batches.
    pub error: Option<String>,
}

impl BatchOutcome {
    /// Outcome for a batch whose rows were confirmed persisted.
    pub fn success(spec: BatchSpec, rows_affected: u64, rows_dropped: u64) -> Self {
        Self {
            spec,
            status: BatchStatus::Success,
            rows_affected,
            rows_dropped,
            error: None,
        }
    }

    /// Outcome for a batch that failed after exhausting its retries.
    pub fn failed(spec: BatchSpec, error: impl Into<String>) -> Self {
        Self {
            spec,
            status: BatchStatus::Failed,
            rows_affected: 0,
            rows_dropped: 0,
            error: Some(error.into()),
        }
    }

    /// Outcome for a batch skipped due to cancellation or abort.
    pub fn skipped(spec: BatchSpec) -> Self {
        Self {
            spec,
            status: BatchStatus::SkippedCancelled,
            rows_affected: 0,
            rows_dropped: 0,
            error: None,
        }
    }
}

/// Terminal state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunState {
    /// Every batch succeeded.
    Completed,
    /// At least one batch failed after exhausting retries.
    PartiallyFailed,
    /// A non-retryable error stopped scheduling before all batches ran.
    Aborted,
}

/// Aggregated result of one run.
#[derive(Debug, Clone)]
pub struct RunResult {
    /// Terminal state of the run.
    pub state: RunState,
    /// Number of planned batches.
    pub total_batches: u64,
    /// Batches whose rows were confirmed persisted.
    pub successful_batches: u64,
    /// Batches that failed after exhausting retries.
    pub failed_batches: u64,
    /// Batches skipped due to cancellation or abort.
    pub skipped_batches: u64,
    /// Total rows confirmed persisted across the run.
    pub rows_affected: u64,
    /// Total rows dropped by validation predicates.
    pub rows_dropped: u64,
    /// Per-batch error descriptions, in plan order.
    pub errors: Vec<String>,
    /// Per-batch outcomes, in plan order.
    pub outcomes: Vec<BatchOutcome>,
}

impl RunResult {
    /// Build a run result from per-batch outcomes.
    ///
    /// Outcomes arrive in completion order from the worker pool and are
    /// re-sorted into plan order. The state is `Completed` when every batch
    /// succeeded, `PartiallyFailed` when at least one failed, and `Aborted`
    /// when the caller observed an abort-class error.
    pub fn from_outcomes(mut outcomes: Vec<BatchOutcome>, aborted: bool) -> Self {
        outcomes.sort_by_key(|o| o.spec.seq);

        let total = outcomes.len() as u64;
        let successful = outcomes
            .iter()
            .filter(|o| o.status == BatchStatus::Success)
            .count() as u64;
        let failed = outcomes
            .iter()
            .filter(|o| o.status == BatchStatus::Failed)
            .count() as u64;
        let skipped = outcomes
            .iter()
            .filter(|o| o.status == BatchStatus::SkippedCancelled)
            .count() as u64;
        let rows_affected = outcomes.iter().map(|o| o.rows_affected).sum();
        let rows_dropped = outcomes.iter().map(|o| o.rows_dropped).sum();
        let errors: Vec<String> = outcomes
            .iter()
            .filter_map(|o| o.error.as_ref().map(|e| format!("{}: {}", o.spec.label, e)))
            .collect();

        let state = if aborted {
            RunState::Aborted
        } else if failed > 0 || skipped > 0 {
            // A cancelled run with no hard failures still did not cover its
            // window.
            RunState::PartiallyFailed
        } else {
            RunState::Completed
        };

        Self {
            state,
            total_batches: total,
            successful_batches: successful,
            failed_batches: failed,
            skipped_batches: skipped,
            rows_affected,
            rows_dropped,
            errors,
            outcomes,
        }
    }

    /// Completion percentage based on confirmed persistence only.
    pub fn percentage(&self) -> f64 {
        if self.total_batches == 0 {
            100.0
        } else {
            self.successful_batches as f64 / self.total_batches as f64 * 100.0
        }
    }
}
