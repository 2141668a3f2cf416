//! Concurrent batch execution.
//!
//! Consumes planned batch specs under a bounded worker pool and drives each
//! through fetch → transform → validate → persist. Batches are fully
//! independent; the idempotent upsert makes re-ordering and re-running safe.
//! Exactly one persist transaction happens per successful batch attempt, and
//! a failure anywhere leaves nothing written. A non-retryable error sets a
//! shared abort flag that stops further scheduling; cancellation is checked
//! before every pickup.

use crate::client::{FetchClient, FetchError};
use crate::dataset::DatasetDescriptor;
use crate::metrics;
use crate::plan::BatchSpec;
use crate::progress::{ProgressCallback, ProgressTracker};
use crate::remote::ErrorClass;
use crate::shutdown::SharedShutdown;
use crate::store::StorageSink;
use crate::{BatchOutcome, BatchStatus};
use futures::stream::{self, StreamExt};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

pub mod transform;
pub mod validate;

/// Executes a plan for one dataset.
pub struct BatchProcessor {
    client: Arc<FetchClient>,
    sink: Arc<dyn StorageSink>,
    shutdown: SharedShutdown,
}

impl BatchProcessor {
    /// Create a processor.
    pub fn new(
        client: Arc<FetchClient>,
        sink: Arc<dyn StorageSink>,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            client,
            sink,
            shutdown,
        }
    }

    /// Run every spec under a pool of `concurrency` workers.
    ///
    /// # Returns
    /// Per-batch outcomes (completion order) and whether an abort-class
    /// error stopped scheduling.
    pub async fn run(
        &self,
        dataset: &DatasetDescriptor,
        specs: Vec<BatchSpec>,
        concurrency: usize,
        progress: Option<ProgressCallback>,
    ) -> (Vec<BatchOutcome>, bool) {
        let total = specs.len() as u64;
        let tracker = Arc::new(ProgressTracker::new(total, progress));
        let abort = Arc::new(AtomicBool::new(false));
        info!(
            dataset = %dataset.name,
            batches = total,
            concurrency,
            "Executing plan"
        );

        let outcomes: Vec<BatchOutcome> = stream::iter(specs)
            .map(|spec| {
                let tracker = tracker.clone();
                let abort = abort.clone();
                async move {
                    // Checked at pickup: an abort or cancellation skips
                    // everything not yet started.
                    if abort.load(Ordering::SeqCst) || self.shutdown.is_shutdown_requested() {
                        metrics::record_batch(&dataset.name, "skipped");
                        return BatchOutcome::skipped(spec);
                    }
                    let outcome = self.process_batch(dataset, spec, &abort).await;
                    if outcome.status == BatchStatus::Success {
                        tracker.record_success(&outcome.spec.label);
                    }
                    outcome
                }
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        (outcomes, abort.load(Ordering::SeqCst))
    }

    /// Drive one batch through the full pipeline.
    async fn process_batch(
        &self,
        dataset: &DatasetDescriptor,
        spec: BatchSpec,
        abort: &AtomicBool,
    ) -> BatchOutcome {
        debug!(dataset = %dataset.name, batch = %spec.label, "Batch started");

        let rows = match self
            .client
            .fetch_all(&spec.endpoint, &spec.params, &dataset.rate_limit)
            .await
        {
            Ok(rows) => rows,
            Err(FetchError::Cancelled) => {
                debug!(batch = %spec.label, "Batch cancelled before completion");
                metrics::record_batch(&dataset.name, "skipped");
                return BatchOutcome::skipped(spec);
            }
            Err(e) => {
                if e.class() == Some(ErrorClass::NonRetryable) {
                    // Further calls cannot succeed and only waste quota.
                    error!(batch = %spec.label, "Aborting run: {e}");
                    abort.store(true, Ordering::SeqCst);
                } else {
                    warn!(batch = %spec.label, "Batch fetch failed: {e}");
                }
                metrics::record_batch(&dataset.name, "failed");
                return BatchOutcome::failed(spec, e.to_string());
            }
        };

        let transformed = match dataset.transform.apply(rows) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(batch = %spec.label, "Batch transform failed: {e}");
                metrics::record_batch(&dataset.name, "failed");
                return BatchOutcome::failed(spec, e.to_string());
            }
        };

        let validated = match validate::validate_rows(transformed, &dataset.validation) {
            Ok(validated) => validated,
            Err(e) => {
                warn!(batch = %spec.label, "Batch validation failed: {e}");
                metrics::record_batch(&dataset.name, "failed");
                return BatchOutcome::failed(spec, e.to_string());
            }
        };
        if validated.dropped > 0 {
            debug!(
                batch = %spec.label,
                dropped = validated.dropped,
                "Rows dropped by validation"
            );
        }

        let rows_affected = if validated.rows.is_empty() {
            0
        } else {
            match self.persist(dataset, &validated.rows).await {
                Ok(affected) => affected,
                Err(e) => {
                    warn!(batch = %spec.label, "Batch persist failed: {e}");
                    metrics::record_batch(&dataset.name, "failed");
                    return BatchOutcome::failed(spec, e);
                }
            }
        };

        debug!(
            batch = %spec.label,
            rows_affected,
            dropped = validated.dropped,
            "Batch persisted"
        );
        metrics::record_batch(&dataset.name, "success");
        metrics::record_rows(&dataset.name, rows_affected);
        BatchOutcome::success(spec, rows_affected, validated.dropped)
    }

    /// Upsert under the smaller store-specific retry budget.
    async fn persist(
        &self,
        dataset: &DatasetDescriptor,
        rows: &[crate::Row],
    ) -> Result<u64, String> {
        let attempts = dataset.retry.persist_attempts.max(1);
        let mut last_error = String::new();
        for attempt in 1..=attempts {
            match self
                .sink
                .upsert(&dataset.table, rows, &dataset.primary_key)
                .await
            {
                Ok(affected) => return Ok(affected),
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < attempts {
                        let backoff = dataset.retry.backoff(attempt);
                        warn!(
                            table = %dataset.table,
                            attempt,
                            "Persist failed: {last_error}; retrying after {backoff:?}"
                        );
                        sleep(backoff).await;
                    }
                }
            }
        }
        Err(format!("persist failed after {attempts} attempts: {last_error}"))
    }
}
