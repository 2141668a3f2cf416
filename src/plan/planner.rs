//! Batch planner.
//!
//! Pure composition of source, partition strategy and map strategy into an
//! ordered list of batch specs. Given the same source snapshot the output is
//! deterministic and order-stable, so progress and log output are
//! reproducible across runs.

use crate::plan::{BatchSpec, ItemSource, MapStrategy, PartitionStrategy, PlanError};
use crate::remote::Params;
use tracing::debug;

/// Composes sources and strategies into batch specs.
pub struct BatchPlanner;

impl BatchPlanner {
    /// Build the ordered plan for one endpoint.
    ///
    /// # Arguments
    /// * `endpoint` - Target endpoint identifier stamped into every spec
    /// * `source` - Where partitionable items come from
    /// * `partition` - How items split into sub-sequences
    /// * `map` - How a sub-sequence becomes batch parameters
    pub async fn plan(
        endpoint: &str,
        source: &ItemSource,
        partition: &PartitionStrategy,
        map: &MapStrategy,
    ) -> Result<Vec<BatchSpec>, PlanError> {
        let items = source.items().await?;
        let groups = partition.partition(items);

        let mut specs = Vec::with_capacity(groups.len());
        for group in &groups {
            let params = map.map(group)?;
            let label = Self::label(&params);
            specs.push(BatchSpec::new(specs.len(), endpoint, params, label));
        }

        debug!(endpoint, batches = specs.len(), "Plan built");
        Ok(specs)
    }

    /// One parameterless spec covering the full history, for datasets whose
    /// total volume is far below any page limit.
    pub fn single_batch(endpoint: &str) -> Vec<BatchSpec> {
        vec![BatchSpec::new(0, endpoint, Params::new(), "full-history")]
    }

    fn label(params: &Params) -> String {
        if params.is_empty() {
            return "all".to_string();
        }
        params
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
