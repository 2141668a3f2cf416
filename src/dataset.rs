//! Declarative dataset descriptors.
//!
//! A dataset is pure configuration: an endpoint identifier, a field list, a
//! primary key, a destination table, and the policies governing its sync
//! (window mode, rate limits, retry, partitioning, transform, validation).
//! The engine treats descriptors as data; adding a dataset is a config
//! change, not an engineering task.

use crate::client::RetryPolicy;
use crate::limiter::RateLimitPolicy;
use crate::processor::transform::TransformRules;
use crate::processor::validate::ValidationRule;
use crate::SyncMode;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Default trailing days re-fetched in smart mode to absorb late-arriving
/// or corrected upstream data. Tunable per dataset.
fn default_safety_lookback_days() -> u32 {
    5
}

fn default_start_field() -> String {
    "start_date".to_string()
}

fn default_end_field() -> String {
    "end_date".to_string()
}

/// How a dataset's window turns into batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Partitioning {
    /// One parameterless call for the full history; for datasets whose
    /// total volume is far below any page limit (small monthly macro
    /// series).
    SingleBatch,
    /// Date sub-ranges sized from the total span.
    SmartDateRange {
        /// Parameter name for the sub-range start.
        #[serde(default = "default_start_field")]
        start_field: String,
        /// Parameter name for the sub-range end.
        #[serde(default = "default_end_field")]
        end_field: String,
    },
    /// Fixed-length date sub-ranges.
    FixedDateRange {
        /// Days per batch.
        days: usize,
        /// Parameter name for the sub-range start.
        #[serde(default = "default_start_field")]
        start_field: String,
        /// Parameter name for the sub-range end.
        #[serde(default = "default_end_field")]
        end_field: String,
    },
    /// Entities listed from a remote endpoint, grouped by attributes, one
    /// batch per group (e.g. one batch per exchange × status).
    ByCategory {
        /// Endpoint returning the entity list.
        list_endpoint: String,
        /// Grouping attributes, applied in sequence.
        attrs: Vec<String>,
        /// Attribute read from each entity for the batch's item list.
        item_attr: String,
        /// Parameter name for the joined item list.
        list_field: String,
    },
}

impl Default for Partitioning {
    fn default() -> Self {
        Partitioning::SmartDateRange {
            start_field: default_start_field(),
            end_field: default_end_field(),
        }
    }
}

impl Partitioning {
    /// Parameter carrying a batch's sub-range end, when date-partitioned.
    /// Watermark advancement reads it.
    pub fn end_field(&self) -> Option<&str> {
        match self {
            Partitioning::SmartDateRange { end_field, .. }
            | Partitioning::FixedDateRange { end_field, .. } => Some(end_field),
            _ => None,
        }
    }
}

/// One dataset's declarative configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetDescriptor {
    /// Unique dataset name; also the watermark key.
    pub name: String,
    /// Remote endpoint identifier.
    pub endpoint: String,
    /// Destination table.
    pub table: String,
    /// Columns expected after transformation.
    #[serde(default)]
    pub fields: Vec<String>,
    /// Primary key columns for the upsert.
    pub primary_key: Vec<String>,
    /// Default window mode when the caller does not override it.
    #[serde(default)]
    pub mode: SyncMode,
    /// Earliest date this dataset has data for; full-mode windows start
    /// here.
    pub earliest: NaiveDate,
    /// Trailing days re-fetched in smart mode.
    #[serde(default = "default_safety_lookback_days")]
    pub safety_lookback_days: u32,
    /// Throughput limits for this dataset's endpoint.
    #[serde(default)]
    pub rate_limit: RateLimitPolicy,
    /// Retry behaviour.
    #[serde(default)]
    pub retry: RetryPolicy,
    /// Window → batch mapping.
    #[serde(default)]
    pub partitioning: Partitioning,
    /// Column renames and coercions.
    #[serde(default)]
    pub transform: TransformRules,
    /// Row-level predicates.
    #[serde(default)]
    pub validation: Vec<ValidationRule>,
}

impl DatasetDescriptor {
    /// Validate internal consistency.
    pub fn validate(&self) -> Result<(), String> {
        if self.name.is_empty() {
            return Err("dataset name cannot be empty".to_string());
        }
        if self.endpoint.is_empty() {
            return Err("endpoint cannot be empty".to_string());
        }
        if self.table.is_empty() {
            return Err("table cannot be empty".to_string());
        }
        if self.primary_key.is_empty() {
            return Err(format!("dataset '{}' declares no primary key", self.name));
        }
        Ok(())
    }
}

/// Registry errors.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// Config file could not be read.
    #[error("cannot read config: {0}")]
    Io(String),

    /// Config file could not be parsed.
    #[error("cannot parse config: {0}")]
    Parse(String),

    /// A descriptor failed validation.
    #[error("invalid dataset: {0}")]
    Invalid(String),

    /// Lookup for an unknown dataset.
    #[error("unknown dataset: {0}")]
    Unknown(String),
}

/// Engine configuration: connection targets plus the dataset catalogue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Base URL of the remote data service.
    pub base_url: String,
    /// Directory for the local JSON store.
    pub data_dir: String,
    /// Optional Prometheus scrape address (e.g. "0.0.0.0:9090").
    #[serde(default)]
    pub metrics_addr: Option<String>,
    /// Dataset catalogue.
    pub datasets: Vec<DatasetDescriptor>,
}

impl IngestConfig {
    /// Load and validate a config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RegistryError> {
        let bytes = std::fs::read(path.as_ref()).map_err(|e| RegistryError::Io(e.to_string()))?;
        let config: IngestConfig =
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Parse(e.to_string()))?;
        let mut seen = HashMap::new();
        for dataset in &config.datasets {
            dataset.validate().map_err(RegistryError::Invalid)?;
            if seen.insert(dataset.name.clone(), ()).is_some() {
                return Err(RegistryError::Invalid(format!(
                    "duplicate dataset name '{}'",
                    dataset.name
                )));
            }
        }
        Ok(config)
    }

    /// Find a dataset by name.
    pub fn dataset(&self, name: &str) -> Result<&DatasetDescriptor, RegistryError> {
        self.datasets
            .iter()
            .find(|d| d.name == name)
            .ok_or_else(|| RegistryError::Unknown(name.to_string()))
    }
}
