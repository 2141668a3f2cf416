//! Batch planning.
//!
//! A plan is the pure composition of three pieces: an [`source::ItemSource`]
//! supplying the raw partitionable items, a [`partition::PartitionStrategy`]
//! splitting them into ordered sub-sequences, and a [`map::MapStrategy`]
//! turning each sub-sequence into the parameters of one batch. The output is
//! an ordered list of immutable [`BatchSpec`]s; given the same source
//! snapshot, planning is deterministic and order-stable.

use crate::remote::Params;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub mod map;
pub mod partition;
pub mod planner;
pub mod source;

pub use map::MapStrategy;
pub use partition::{smart_ranges, PartitionStrategy};
pub use planner::BatchPlanner;
pub use source::{ItemQuery, ItemSource};

/// Date format used in batch parameters (e.g. `20100101`).
pub const PARAM_DATE_FORMAT: &str = "%Y%m%d";

/// Planning errors.
#[derive(Debug, thiserror::Error)]
pub enum PlanError {
    /// The requested window is inverted or otherwise unusable.
    #[error("invalid window: {0}")]
    InvalidWindow(String),

    /// Item enumeration failed (the only I/O a plan may perform).
    #[error("item source error: {0}")]
    Source(String),

    /// A sub-sequence could not be mapped to parameters.
    #[error("map error: {0}")]
    Map(String),
}

/// One raw partitionable item.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanItem {
    /// A calendar day, for date-range partitioning.
    Date(NaiveDate),
    /// A bare entity code (stock code, fund code, index code).
    Code(String),
    /// A full record with attributes, for category partitioning.
    Record(crate::Row),
}

impl PlanItem {
    /// The date carried by this item, if any.
    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            PlanItem::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// Value of a named attribute, rendered as text.
    ///
    /// Dates render in parameter format; codes answer only to the `code`
    /// attribute; records look the attribute up by column name.
    pub fn attr(&self, name: &str) -> Option<String> {
        match self {
            PlanItem::Date(d) if name == "date" => {
                Some(d.format(PARAM_DATE_FORMAT).to_string())
            }
            PlanItem::Date(_) => None,
            PlanItem::Code(c) if name == "code" => Some(c.clone()),
            PlanItem::Code(_) => None,
            PlanItem::Record(row) => row.get(name).and_then(|v| match v {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Null => None,
                other => Some(other.to_string()),
            }),
        }
    }

    /// Default textual rendering used when no attribute is named.
    pub fn text(&self) -> String {
        match self {
            PlanItem::Date(d) => d.format(PARAM_DATE_FORMAT).to_string(),
            PlanItem::Code(c) => c.clone(),
            PlanItem::Record(row) => row
                .get("code")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string())
                .unwrap_or_else(|| serde_json::Value::Object(row.clone()).to_string()),
        }
    }
}

/// One bounded unit of fetch+persist work.
///
/// Produced once by the planner; consumed once per attempt by the processor.
/// Re-submission on retry is idempotent: same parameters, same outcome
/// contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSpec {
    /// Position in the plan; used for contiguous watermark advancement.
    pub seq: usize,
    /// Target endpoint identifier.
    pub endpoint: String,
    /// Named call parameters for this batch.
    pub params: Params,
    /// Human-readable label for progress and error reporting.
    pub label: String,
}

impl BatchSpec {
    /// Create a spec.
    pub fn new(
        seq: usize,
        endpoint: impl Into<String>,
        params: Params,
        label: impl Into<String>,
    ) -> Self {
        Self {
            seq,
            endpoint: endpoint.into(),
            params,
            label: label.into(),
        }
    }

    /// End date of this batch's sub-range, parsed from the named parameter.
    ///
    /// Used for watermark advancement; `None` for non-date batches.
    pub fn end_date(&self, end_field: &str) -> Option<NaiveDate> {
        self.params
            .get(end_field)
            .and_then(|v| NaiveDate::parse_from_str(v, PARAM_DATE_FORMAT).ok())
    }
}
