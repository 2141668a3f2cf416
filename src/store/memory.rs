//! In-memory store for tests and examples.
//!
//! Implements both the upsert sink and the watermark store with plain maps
//! behind a mutex. Upserts are all-or-nothing: key extraction for every row
//! is checked before any row is applied.

use crate::store::{row_key, StorageSink, StoreError, StoreResult, WatermarkStore};
use crate::Row;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// Map-backed [`StorageSink`] and [`WatermarkStore`].
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, BTreeMap<String, Row>>>,
    watermarks: Mutex<HashMap<String, NaiveDate>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held in `table`.
    pub fn table_len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    /// Snapshot of the rows in `table`, ordered by key.
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageSink for MemoryStore {
    async fn upsert(
        &self,
        table: &str,
        rows: &[Row],
        primary_key: &[String],
    ) -> StoreResult<u64> {
        if primary_key.is_empty() {
            return Err(StoreError::Constraint(
                "primary key must not be empty".to_string(),
            ));
        }

        // Validate every key before touching the table so a bad row cannot
        // leave a partial write behind.
        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            keyed.push((row_key(row, primary_key)?, row.clone()));
        }

        let mut tables = self.tables.lock().unwrap_or_else(|p| p.into_inner());
        let entry = tables.entry(table.to_string()).or_default();
        let affected = keyed.len() as u64;
        for (key, row) in keyed {
            entry.insert(key, row);
        }
        Ok(affected)
    }
}

#[async_trait]
impl WatermarkStore for MemoryStore {
    async fn get_latest_key(&self, dataset: &str) -> StoreResult<Option<NaiveDate>> {
        Ok(self
            .watermarks
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(dataset)
            .copied())
    }

    async fn set_latest_key(&self, dataset: &str, date: NaiveDate) -> StoreResult<()> {
        let mut watermarks = self.watermarks.lock().unwrap_or_else(|p| p.into_inner());
        let entry = watermarks.entry(dataset.to_string()).or_insert(date);
        if date > *entry {
            *entry = date;
        }
        Ok(())
    }
}
