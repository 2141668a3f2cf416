//! Sync window resolution and watermark advancement.
//!
//! The watermark is the latest date known to be durably persisted for a
//! dataset. Before a run it determines the re-fetch window; after a run it
//! advances, but only past a contiguous prefix of committed sub-ranges so a
//! failed quarter is naturally re-attempted by the next smart run.

use crate::dataset::DatasetDescriptor;
use crate::store::{StoreError, WatermarkStore};
use crate::{BatchOutcome, BatchStatus, SyncMode};
use chrono::{Days, NaiveDate};
use tracing::debug;

/// Window resolution errors.
#[derive(Debug, thiserror::Error)]
pub enum WindowError {
    /// Incremental mode needs an explicit start date.
    #[error("incremental mode requires a start date")]
    MissingStart,

    /// The resolved window is inverted.
    #[error("window start {start} is after end {end}")]
    Inverted {
        /// Resolved start.
        start: NaiveDate,
        /// Resolved end.
        end: NaiveDate,
    },

    /// Watermark lookup failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Resolved fetch window, inclusive on both ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window {
    /// First day to fetch.
    pub start: NaiveDate,
    /// Last day to fetch.
    pub end: NaiveDate,
}

/// Resolve the fetch window for a run.
///
/// - Full: the dataset's earliest date through `today`.
/// - Incremental: caller-supplied `[start, end | today]`.
/// - Smart: `[watermark − safety lookback, today]`; without a watermark,
///   falls back to Full. The lookback re-fetches a few trailing days to
///   absorb late-arriving or corrected upstream data, and never reaches
///   before the dataset's earliest date.
pub async fn resolve_window(
    dataset: &DatasetDescriptor,
    mode: SyncMode,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
    watermarks: &dyn WatermarkStore,
    today: NaiveDate,
) -> Result<Window, WindowError> {
    let window = match mode {
        SyncMode::Full => Window {
            start: dataset.earliest,
            end: today,
        },
        SyncMode::Incremental => {
            let start = start.ok_or(WindowError::MissingStart)?;
            Window {
                start,
                end: end.unwrap_or(today),
            }
        }
        SyncMode::Smart => match watermarks.get_latest_key(&dataset.name).await? {
            None => {
                debug!(dataset = %dataset.name, "No watermark; smart mode falls back to full");
                Window {
                    start: dataset.earliest,
                    end: today,
                }
            }
            Some(watermark) => {
                let lookback = Days::new(dataset.safety_lookback_days as u64);
                let start = watermark
                    .checked_sub_days(lookback)
                    .unwrap_or(dataset.earliest)
                    .max(dataset.earliest)
                    // A watermark at or past today still re-fetches today.
                    .min(today);
                Window { start, end: today }
            }
        },
    };

    if window.start > window.end {
        return Err(WindowError::Inverted {
            start: window.start,
            end: window.end,
        });
    }
    Ok(window)
}

/// End of the longest contiguous prefix of successful date-range batches.
///
/// Outcomes must be in plan (chronological) order. The first non-success
/// stops the scan, so a gap is never jumped: if January and February
/// succeed, March fails, and April succeeds, the result is end-of-February.
pub fn contiguous_watermark(outcomes: &[BatchOutcome], end_field: &str) -> Option<NaiveDate> {
    let mut latest = None;
    for outcome in outcomes {
        if outcome.status != BatchStatus::Success {
            break;
        }
        match outcome.spec.end_date(end_field) {
            Some(end) => latest = Some(end),
            None => break,
        }
    }
    latest
}
