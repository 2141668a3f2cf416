//! Partition strategies.
//!
//! A strategy splits an ordered item list into ordered sub-sequences that
//! cover the input exactly once: no item is dropped, duplicated, or
//! reordered. The smart time strategy additionally picks its sub-range
//! length from the total span, so a ten-year backfill runs in annual chunks
//! while a two-week refresh stays a single call.

use crate::plan::PlanItem;
use chrono::{Datelike, Months, NaiveDate};

/// Sub-division frequency chosen by the smart time partitioner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    /// Whole span as one range.
    Single,
    /// One range per month.
    Monthly,
    /// One range per quarter.
    Quarterly,
    /// One range per half year.
    SemiAnnual,
    /// One range per year.
    Annual,
}

impl Frequency {
    /// Step length in months; zero for [`Frequency::Single`].
    pub fn months(&self) -> u32 {
        match self {
            Frequency::Single => 0,
            Frequency::Monthly => 1,
            Frequency::Quarterly => 3,
            Frequency::SemiAnnual => 6,
            Frequency::Annual => 12,
        }
    }

    /// Pick a frequency for a span.
    ///
    /// Spans up to a month stay a single call; short refresh windows keep
    /// monthly granularity; a multi-year backfill steps up through quarterly
    /// and semi-annual to annual so call count stays bounded. A three-year
    /// span must still partition quarterly, which fixes the quarterly tier
    /// at 36 whole months.
    pub fn for_span(start: NaiveDate, end: NaiveDate) -> Frequency {
        let days = (end - start).num_days();
        if days <= 31 {
            return Frequency::Single;
        }
        let months = span_months(start, end);
        if months <= 3 {
            Frequency::Monthly
        } else if months <= 36 {
            Frequency::Quarterly
        } else if months <= 120 {
            Frequency::SemiAnnual
        } else {
            Frequency::Annual
        }
    }
}

/// Whole months between two dates, rounding down.
fn span_months(start: NaiveDate, end: NaiveDate) -> i32 {
    let mut months = (end.year() - start.year()) * 12 + end.month() as i32 - start.month() as i32;
    if end.day() < start.day() {
        months -= 1;
    }
    months.max(0)
}

/// Split `[start, end]` into contiguous, exhaustive sub-ranges at the
/// frequency chosen for the span.
///
/// Boundaries step the chosen frequency from `start`; the final sub-range's
/// end clamps to `end`. A span landing exactly on a frequency boundary never
/// produces a trailing zero-length range, and a span within one day yields
/// exactly one sub-range. An inverted span yields no ranges.
pub fn smart_ranges(start: NaiveDate, end: NaiveDate) -> Vec<(NaiveDate, NaiveDate)> {
    if start > end {
        return Vec::new();
    }

    let frequency = Frequency::for_span(start, end);
    if frequency == Frequency::Single {
        return vec![(start, end)];
    }

    let step = Months::new(frequency.months());
    let mut ranges = Vec::new();
    let mut cursor = start;
    while cursor <= end {
        let next = cursor.checked_add_months(step).unwrap_or(NaiveDate::MAX);
        let sub_end = next
            .pred_opt()
            .map(|d| d.min(end))
            .unwrap_or(end);
        ranges.push((cursor, sub_end));
        match sub_end.succ_opt() {
            Some(d) => cursor = d,
            None => break,
        }
    }
    ranges
}

/// Closed set of partition strategies.
///
/// Selected at plan construction and dispatched by match, not reflection.
#[derive(Clone)]
pub enum PartitionStrategy {
    /// Chunks of at most `size` items, in order.
    FixedSize {
        /// Maximum items per chunk.
        size: usize,
    },
    /// Date items grouped into span-sized sub-ranges (see [`smart_ranges`]).
    SmartTime,
    /// Record items grouped by one attribute, one sub-sequence per distinct
    /// value in first-seen order.
    ByCategory {
        /// Attribute to group by (e.g. "exchange", "status").
        attr: String,
    },
    /// Strategies applied in sequence, producing the cross-product of
    /// groupings (e.g. by exchange, then by status within each exchange).
    Composite(Vec<PartitionStrategy>),
}

impl PartitionStrategy {
    /// Split `items` into ordered sub-sequences covering the input exactly
    /// once.
    pub fn partition(&self, items: Vec<PlanItem>) -> Vec<Vec<PlanItem>> {
        if items.is_empty() {
            return Vec::new();
        }
        match self {
            PartitionStrategy::FixedSize { size } => {
                let size = (*size).max(1);
                let mut groups = Vec::with_capacity(items.len().div_ceil(size));
                let mut iter = items.into_iter().peekable();
                while iter.peek().is_some() {
                    groups.push(iter.by_ref().take(size).collect());
                }
                groups
            }
            PartitionStrategy::SmartTime => partition_smart_time(items),
            PartitionStrategy::ByCategory { attr } => partition_by_category(items, attr),
            PartitionStrategy::Composite(strategies) => {
                let mut groups = vec![items];
                for strategy in strategies {
                    groups = groups
                        .into_iter()
                        .flat_map(|group| strategy.partition(group))
                        .collect();
                }
                groups
            }
        }
    }
}

/// Group date items into smart sub-ranges.
///
/// Items without a date (or an empty date domain) collapse into one group.
fn partition_smart_time(items: Vec<PlanItem>) -> Vec<Vec<PlanItem>> {
    let first = items.iter().find_map(PlanItem::as_date);
    let last = items.iter().rev().find_map(PlanItem::as_date);
    let (Some(first), Some(last)) = (first, last) else {
        return vec![items];
    };

    let ranges = smart_ranges(first, last);
    if ranges.len() <= 1 {
        return vec![items];
    }

    let mut groups: Vec<Vec<PlanItem>> = Vec::with_capacity(ranges.len());
    let mut range_idx = 0;
    let mut current: Vec<PlanItem> = Vec::new();
    for item in items {
        if let Some(date) = item.as_date() {
            while range_idx + 1 < ranges.len() && date > ranges[range_idx].1 {
                groups.push(std::mem::take(&mut current));
                range_idx += 1;
            }
        }
        current.push(item);
    }
    groups.push(current);
    // Trailing calendar gaps can leave empty groups; a batch with no items
    // has nothing to fetch.
    groups.retain(|g| !g.is_empty());
    groups
}

/// Group record items by one attribute, first-seen order, order preserved
/// within each group. Items without the attribute share an unlabelled group.
fn partition_by_category(items: Vec<PlanItem>, attr: &str) -> Vec<Vec<PlanItem>> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: std::collections::HashMap<String, Vec<PlanItem>> =
        std::collections::HashMap::new();
    for item in items {
        let key = item.attr(attr).unwrap_or_default();
        if !groups.contains_key(&key) {
            order.push(key.clone());
        }
        groups.entry(key).or_default().push(item);
    }
    order
        .into_iter()
        .filter_map(|key| groups.remove(&key))
        .collect()
}
