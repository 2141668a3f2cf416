//! The sync controller.
//!
//! Orchestrates one dataset run: resolve the fetch window, compile the
//! dataset's declarative partitioning into a plan, execute it under the
//! worker pool, and advance the watermark from what was actually persisted.
//! The controller owns no policy of its own; everything it does is driven by
//! the [`DatasetDescriptor`].

use crate::client::FetchClient;
use crate::dataset::{DatasetDescriptor, Partitioning, RegistryError};
use crate::limiter::{RateLimitPolicy, RateLimiterRegistry};
use crate::plan::{
    BatchPlanner, BatchSpec, ItemQuery, ItemSource, MapStrategy, PartitionStrategy, PlanError,
    PlanItem,
};
use crate::processor::BatchProcessor;
use crate::progress::ProgressCallback;
use crate::remote::RemoteSource;
use crate::shutdown::SharedShutdown;
use crate::store::{StorageSink, StoreError, WatermarkStore};
use crate::watermark::{contiguous_watermark, resolve_window, Window, WindowError};
use crate::{RunResult, RunState, SyncMode};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Errors surfaced by a sync run before or after batch execution.
///
/// Per-batch failures are not errors at this level; they are recorded in the
/// [`RunResult`].
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Dataset lookup or config problem.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// The fetch window could not be resolved.
    #[error(transparent)]
    Window(#[from] WindowError),

    /// The plan could not be built.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Watermark persistence failed after the run.
    #[error("watermark update failed: {0}")]
    Watermark(#[from] StoreError),
}

/// Per-run options, layered over the dataset's own defaults.
#[derive(Clone, Default)]
pub struct RunOptions {
    /// Window mode override; `None` uses the dataset's configured mode.
    pub mode: Option<SyncMode>,
    /// Explicit window start (required for incremental mode).
    pub start: Option<NaiveDate>,
    /// Explicit window end; defaults to today.
    pub end: Option<NaiveDate>,
    /// Worker pool size; `None` uses the dataset's rate-limit concurrency.
    pub concurrency: Option<usize>,
    /// Progress callback, invoked on each confirmed persist.
    pub progress: Option<ProgressCallback>,
}

/// Runs dataset syncs against one remote source and one store.
pub struct SyncController {
    remote: Arc<dyn RemoteSource>,
    sink: Arc<dyn StorageSink>,
    watermarks: Arc<dyn WatermarkStore>,
    limiters: Arc<RateLimiterRegistry>,
    shutdown: SharedShutdown,
}

impl SyncController {
    /// Create a controller.
    ///
    /// Rate limiters are shared across runs so two datasets hitting the same
    /// endpoint stay within one budget.
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        sink: Arc<dyn StorageSink>,
        watermarks: Arc<dyn WatermarkStore>,
        shutdown: SharedShutdown,
    ) -> Self {
        Self {
            remote,
            sink,
            watermarks,
            limiters: Arc::new(RateLimiterRegistry::new()),
            shutdown,
        }
    }

    /// Run one dataset end to end.
    ///
    /// # Returns
    /// The run's terminal state and per-batch outcomes. Batch failures do
    /// not bubble up as `Err`; only setup and watermark problems do.
    pub async fn sync(
        &self,
        dataset: &DatasetDescriptor,
        options: RunOptions,
    ) -> Result<RunResult, SyncError> {
        let mode = options.mode.unwrap_or(dataset.mode);
        let today = chrono::Utc::now().date_naive();

        debug!(dataset = %dataset.name, %mode, "Resolving window");
        let window = resolve_window(
            dataset,
            mode,
            options.start,
            options.end,
            self.watermarks.as_ref(),
            today,
        )
        .await?;
        info!(
            dataset = %dataset.name,
            %mode,
            start = %window.start,
            end = %window.end,
            "Window resolved"
        );

        let client = Arc::new(FetchClient::new(
            self.remote.clone(),
            self.limiters.clone(),
            dataset.retry.clone(),
            self.shutdown.clone(),
        ));

        let specs = self.plan(dataset, &window, &client).await?;
        if specs.is_empty() {
            info!(dataset = %dataset.name, "Nothing to sync");
        }

        let concurrency = options
            .concurrency
            .unwrap_or(dataset.rate_limit.max_concurrent);
        let processor = BatchProcessor::new(client, self.sink.clone(), self.shutdown.clone());
        let (outcomes, aborted) = processor
            .run(dataset, specs, concurrency, options.progress)
            .await;

        let result = RunResult::from_outcomes(outcomes, aborted);
        self.advance_watermark(dataset, &window, &result).await?;

        info!(
            dataset = %dataset.name,
            state = ?result.state,
            successful = result.successful_batches,
            failed = result.failed_batches,
            skipped = result.skipped_batches,
            rows = result.rows_affected,
            "Run finished"
        );
        Ok(result)
    }

    /// Compile the dataset's partitioning into an ordered plan.
    async fn plan(
        &self,
        dataset: &DatasetDescriptor,
        window: &Window,
        client: &Arc<FetchClient>,
    ) -> Result<Vec<BatchSpec>, SyncError> {
        let specs = match &dataset.partitioning {
            Partitioning::SingleBatch => BatchPlanner::single_batch(&dataset.endpoint),
            Partitioning::SmartDateRange {
                start_field,
                end_field,
            } => {
                let source = ItemSource::DateRange {
                    start: window.start,
                    end: window.end,
                };
                let map = MapStrategy::ToDateRange {
                    start_field: start_field.clone(),
                    end_field: end_field.clone(),
                };
                BatchPlanner::plan(&dataset.endpoint, &source, &PartitionStrategy::SmartTime, &map)
                    .await?
            }
            Partitioning::FixedDateRange {
                days,
                start_field,
                end_field,
            } => {
                let source = ItemSource::DateRange {
                    start: window.start,
                    end: window.end,
                };
                let partition = PartitionStrategy::FixedSize { size: (*days).max(1) };
                let map = MapStrategy::ToDateRange {
                    start_field: start_field.clone(),
                    end_field: end_field.clone(),
                };
                BatchPlanner::plan(&dataset.endpoint, &source, &partition, &map).await?
            }
            Partitioning::ByCategory {
                list_endpoint,
                attrs,
                item_attr,
                list_field,
            } => {
                let source = ItemSource::Query(Arc::new(EntityListing {
                    client: client.clone(),
                    endpoint: list_endpoint.clone(),
                    rate_limit: dataset.rate_limit.clone(),
                }));
                let partition = PartitionStrategy::Composite(
                    attrs
                        .iter()
                        .map(|attr| PartitionStrategy::ByCategory { attr: attr.clone() })
                        .collect(),
                );
                let map = MapStrategy::ToGroupedDict {
                    group_attrs: attrs.clone(),
                    item_attr: item_attr.clone(),
                    list_field: list_field.clone(),
                };
                BatchPlanner::plan(&dataset.endpoint, &source, &partition, &map).await?
            }
        };
        Ok(specs)
    }

    /// Advance the watermark, never past unpersisted data.
    ///
    /// A completed run covers its whole window; anything less advances only
    /// to the end of the contiguous prefix of successful date batches, so a
    /// gap is re-fetched by the next smart run.
    async fn advance_watermark(
        &self,
        dataset: &DatasetDescriptor,
        window: &Window,
        result: &RunResult,
    ) -> Result<(), StoreError> {
        let target = match result.state {
            RunState::Completed => Some(window.end),
            RunState::PartiallyFailed | RunState::Aborted => dataset
                .partitioning
                .end_field()
                .and_then(|field| contiguous_watermark(&result.outcomes, field))
                .map(|date| date.min(window.end)),
        };
        match target {
            Some(date) => {
                self.watermarks.set_latest_key(&dataset.name, date).await?;
                info!(dataset = %dataset.name, watermark = %date, "Watermark advanced");
            }
            None => {
                warn!(dataset = %dataset.name, "No progress persisted; watermark unchanged");
            }
        }
        Ok(())
    }
}

/// Entity enumeration for category partitioning, via a remote listing call.
struct EntityListing {
    client: Arc<FetchClient>,
    endpoint: String,
    rate_limit: RateLimitPolicy,
}

#[async_trait]
impl ItemQuery for EntityListing {
    async fn fetch_items(&self) -> Result<Vec<PlanItem>, PlanError> {
        let rows = self
            .client
            .fetch_all(&self.endpoint, &crate::remote::Params::new(), &self.rate_limit)
            .await
            .map_err(|e| PlanError::Source(e.to_string()))?;
        Ok(rows.into_iter().map(PlanItem::Record).collect())
    }
}
