//! File-backed JSON store.
//!
//! One JSON file per destination table plus a `_watermarks.json` sidecar,
//! all under a single data directory. Each upsert loads the table, applies
//! the keyed rows in memory, then replaces the file atomically
//! (write-to-temp + rename), so a crash mid-write never leaves a torn
//! table. Suitable for local runs and integration tests; production
//! deployments implement [`StorageSink`] against a real database.

use crate::store::{row_key, StorageSink, StoreError, StoreResult, WatermarkStore};
use crate::Row;
use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

const WATERMARK_FILE: &str = "_watermarks.json";

/// Directory-of-JSON-files implementation of the store boundaries.
pub struct JsonStore {
    dir: PathBuf,
    // One writer at a time per store; the engine never issues two
    // concurrent writes for the same spec, but distinct batches may share a
    // table.
    write_lock: Mutex<()>,
}

impl JsonStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.json"))
    }

    fn load_map<T: serde::de::DeserializeOwned + Default>(path: &Path) -> StoreResult<T> {
        if !path.exists() {
            return Ok(T::default());
        }
        let bytes = std::fs::read(path).map_err(|e| StoreError::Io(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn write_atomic<T: serde::Serialize>(&self, path: &Path, value: &T) -> StoreResult<()> {
        let json = serde_json::to_vec_pretty(value)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        tmp.write_all(&json).map_err(|e| StoreError::Io(e.to_string()))?;
        tmp.persist(path)
            .map_err(|e| StoreError::Io(e.to_string()))?;
        Ok(())
    }

    /// Number of rows currently held in `table`.
    pub fn table_len(&self, table: &str) -> StoreResult<usize> {
        let table: BTreeMap<String, Row> = Self::load_map(&self.table_path(table))?;
        Ok(table.len())
    }
}

#[async_trait]
impl StorageSink for JsonStore {
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

        let mut keyed = Vec::with_capacity(rows.len());
        for row in rows {
            keyed.push((row_key(row, primary_key)?, row.clone()));
        }

        let _guard = self.write_lock.lock().await;
        let path = self.table_path(table);
        let mut existing: BTreeMap<String, Row> = Self::load_map(&path)?;
        let affected = keyed.len() as u64;
        for (key, row) in keyed {
            existing.insert(key, row);
        }
        self.write_atomic(&path, &existing)?;
        debug!(table, affected, total = existing.len(), "Upsert committed");
        Ok(affected)
    }
}

#[async_trait]
impl WatermarkStore for JsonStore {
    async fn get_latest_key(&self, dataset: &str) -> StoreResult<Option<NaiveDate>> {
        let path = self.dir.join(WATERMARK_FILE);
        let marks: HashMap<String, NaiveDate> = Self::load_map(&path)?;
        Ok(marks.get(dataset).copied())
    }

    async fn set_latest_key(&self, dataset: &str, date: NaiveDate) -> StoreResult<()> {
        let _guard = self.write_lock.lock().await;
        let path = self.dir.join(WATERMARK_FILE);
        let mut marks: HashMap<String, NaiveDate> = Self::load_map(&path)?;
        let entry = marks.entry(dataset.to_string()).or_insert(date);
        if date > *entry {
            *entry = date;
        }
        self.write_atomic(&path, &marks)
    }
}
