//! Storage sink and watermark store boundaries.
//!
//! The engine never touches storage internals; it consumes two contracts:
//! a transactional, idempotent-by-primary-key upsert and a per-dataset
//! watermark (latest durably persisted date). Both must be safe to call
//! concurrently from the worker pool.

use crate::Row;
use async_trait::async_trait;
use chrono::NaiveDate;

pub mod json;
pub mod memory;

/// Storage errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Underlying I/O failure.
    #[error("IO error: {0}")]
    Io(String),

    /// Constraint violation or rejected write.
    #[error("constraint violation: {0}")]
    Constraint(String),

    /// Serialization failure while persisting.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A row is missing one of the declared primary key columns.
    #[error("row missing primary key column '{0}'")]
    MissingKey(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional upsert sink.
#[async_trait]
pub trait StorageSink: Send + Sync {
    /// Insert-or-update `rows` into `table`, keyed by `primary_key`.
    ///
    /// Must be all-or-nothing: either every row lands or none does. Safe to
    /// retry with the same rows; re-submitting an already-persisted batch
    /// affects the same keys and returns the same count.
    ///
    /// # Returns
    /// Number of rows affected.
    async fn upsert(&self, table: &str, rows: &[Row], primary_key: &[String])
        -> StoreResult<u64>;
}

/// Per-dataset watermark reader/writer.
#[async_trait]
pub trait WatermarkStore: Send + Sync {
    /// Latest durably persisted date key for a dataset, if any.
    async fn get_latest_key(&self, dataset: &str) -> StoreResult<Option<NaiveDate>>;

    /// Advance the watermark for a dataset.
    ///
    /// Implementations must keep the watermark monotonic: a `date` earlier
    /// than the stored value is ignored.
    async fn set_latest_key(&self, dataset: &str, date: NaiveDate) -> StoreResult<()>;
}

/// Composite key of one row under a dataset's primary key columns.
///
/// # Errors
/// [`StoreError::MissingKey`] when a declared key column is absent or null.
pub fn row_key(row: &Row, primary_key: &[String]) -> StoreResult<String> {
    let mut parts = Vec::with_capacity(primary_key.len());
    for column in primary_key {
        let value = row
            .get(column)
            .filter(|v| !v.is_null())
            .ok_or_else(|| StoreError::MissingKey(column.clone()))?;
        let part = match value {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        parts.push(part);
    }
    Ok(parts.join("\u{1f}"))
}
