//! Progress tracking for long-running ingestion runs.
//!
//! Progress is defined as `successful_batches / total_batches` and advances
//! only on confirmed persistence, never on a bare fetch — reporting work
//! that later fails is the bug this rule exists to avoid. The tracker
//! invokes the caller's callback on every confirmed batch and rate-limits
//! its own log output by time and percentage step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::info;

const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
const DEFAULT_MIN_PERCENTAGE_STEP: f64 = 10.0;

/// Callback invoked with `(successful_batches, total_batches, percentage)`.
pub type ProgressCallback = Arc<dyn Fn(u64, u64, f64) + Send + Sync>;

/// Shared run-progress state.
pub struct ProgressTracker {
    total: u64,
    successful: AtomicU64,
    callback: Option<ProgressCallback>,
    emit: Mutex<EmitState>,
    update_interval: Duration,
    min_percentage_step: f64,
}

struct EmitState {
    last_update: Instant,
    last_percentage: f64,
}

impl ProgressTracker {
    /// Create a tracker for a run of `total` batches.
    pub fn new(total: u64, callback: Option<ProgressCallback>) -> Self {
        Self {
            total,
            successful: AtomicU64::new(0),
            callback,
            emit: Mutex::new(EmitState {
                last_update: Instant::now(),
                last_percentage: 0.0,
            }),
            update_interval: DEFAULT_UPDATE_INTERVAL,
            min_percentage_step: DEFAULT_MIN_PERCENTAGE_STEP,
        }
    }

    /// Override the log cadence.
    pub fn with_cadence(mut self, update_interval: Duration, min_percentage_step: f64) -> Self {
        self.update_interval = update_interval;
        self.min_percentage_step = min_percentage_step;
        self
    }

    /// Record one confirmed persistence.
    ///
    /// Called exactly once per successful batch, after the upsert returns.
    /// Returns the new successful count.
    pub fn record_success(&self, label: &str) -> u64 {
        let successful = self.successful.fetch_add(1, Ordering::SeqCst) + 1;
        debug_assert!(successful <= self.total);
        let percentage = self.percentage(successful);

        if let Some(callback) = &self.callback {
            callback(successful, self.total, percentage);
        }

        let should_log = {
            let mut emit = self.emit.lock().unwrap_or_else(|p| p.into_inner());
            let due = emit.last_update.elapsed() >= self.update_interval
                || percentage - emit.last_percentage >= self.min_percentage_step
                || successful == self.total;
            if due {
                emit.last_update = Instant::now();
                emit.last_percentage = percentage;
            }
            due
        };
        if should_log {
            info!(
                "Progress: {successful}/{} batches ({percentage:.1}%), latest: {label}",
                self.total
            );
        }
        successful
    }

    /// Batches confirmed persisted so far.
    pub fn successful(&self) -> u64 {
        self.successful.load(Ordering::SeqCst)
    }

    /// Total batches in this run.
    pub fn total(&self) -> u64 {
        self.total
    }

    fn percentage(&self, successful: u64) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            successful as f64 / self.total as f64 * 100.0
        }
    }
}
