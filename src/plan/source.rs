//! Item sources.
//!
//! Where the raw partitionable items come from: a static list, a synthesized
//! contiguous day sequence, or an async query against the destination store
//! or the remote source (enumerating entity codes, for example). Enumeration
//! is the only I/O planning may perform.

use crate::plan::{PlanError, PlanItem};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::sync::Arc;

/// Async enumeration of plan items.
#[async_trait]
pub trait ItemQuery: Send + Sync {
    /// Fetch the items to partition.
    async fn fetch_items(&self) -> Result<Vec<PlanItem>, PlanError>;
}

/// Where partitionable items originate.
#[derive(Clone)]
pub enum ItemSource {
    /// A fixed list supplied at construction.
    Static(Vec<PlanItem>),
    /// Every calendar day in `[start, end]`, in order.
    DateRange {
        /// First day, inclusive.
        start: NaiveDate,
        /// Last day, inclusive.
        end: NaiveDate,
    },
    /// An async query (DB lookup, remote listing call).
    Query(Arc<dyn ItemQuery>),
}

impl ItemSource {
    /// Enumerate the items.
    ///
    /// # Errors
    /// [`PlanError::InvalidWindow`] for an inverted date range;
    /// [`PlanError::Source`] when a query fails.
    pub async fn items(&self) -> Result<Vec<PlanItem>, PlanError> {
        match self {
            ItemSource::Static(items) => Ok(items.clone()),
            ItemSource::DateRange { start, end } => {
                if start > end {
                    return Err(PlanError::InvalidWindow(format!(
                        "start {start} is after end {end}"
                    )));
                }
                let mut items = Vec::with_capacity((*end - *start).num_days() as usize + 1);
                let mut cursor = *start;
                while cursor <= *end {
                    items.push(PlanItem::Date(cursor));
                    match cursor.succ_opt() {
                        Some(next) => cursor = next,
                        None => break,
                    }
                }
                Ok(items)
            }
            ItemSource::Query(query) => query.fetch_items().await,
        }
    }
}
