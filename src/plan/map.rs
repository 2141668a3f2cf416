//! Map strategies.
//!
//! A map strategy turns one partitioned sub-sequence into the named
//! parameters of a single batch. Like partitioning, the set of variants is
//! closed; bespoke parameter shapes go through [`MapStrategy::Custom`].

use crate::plan::{PlanError, PlanItem, PARAM_DATE_FORMAT};
use crate::remote::Params;
use std::sync::Arc;

/// Signature of a custom mapping function.
pub type MapFn = Arc<dyn Fn(&[PlanItem]) -> Result<Params, PlanError> + Send + Sync>;

/// Closed set of sub-sequence → parameter mappings.
#[derive(Clone)]
pub enum MapStrategy {
    /// One parameter holding the items' textual values, comma-joined.
    ///
    /// With `attr` set, record items contribute that attribute instead of
    /// their default rendering.
    ToDict {
        /// Parameter name to emit.
        field: String,
        /// Record attribute to read, if items are records.
        attr: Option<String>,
    },
    /// Start/end parameters from the first and last date in the group.
    ToDateRange {
        /// Parameter name for the sub-range start.
        start_field: String,
        /// Parameter name for the sub-range end.
        end_field: String,
    },
    /// Group-key parameters plus a comma-joined item list.
    ///
    /// Each `group_attrs` entry becomes one parameter taken from the first
    /// item (all items in a category group share it); `item_attr` values
    /// join into `list_field`.
    ToGroupedDict {
        /// Attributes identifying the group (e.g. exchange, status).
        group_attrs: Vec<String>,
        /// Attribute read from each item for the list.
        item_attr: String,
        /// Parameter name for the joined item list.
        list_field: String,
    },
    /// Caller-supplied mapping.
    Custom(MapFn),
}

impl MapStrategy {
    /// Map one sub-sequence to batch parameters.
    ///
    /// # Errors
    /// [`PlanError::Map`] when the group is empty or lacks the data the
    /// variant requires (no dates for a date range, a missing group
    /// attribute).
    pub fn map(&self, items: &[PlanItem]) -> Result<Params, PlanError> {
        if items.is_empty() {
            return Err(PlanError::Map("cannot map an empty group".to_string()));
        }
        match self {
            MapStrategy::ToDict { field, attr } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    let value = match attr {
                        Some(attr) => item.attr(attr).ok_or_else(|| {
                            PlanError::Map(format!("item missing attribute '{attr}'"))
                        })?,
                        None => item.text(),
                    };
                    values.push(value);
                }
                let mut params = Params::new();
                params.insert(field.clone(), values.join(","));
                Ok(params)
            }
            MapStrategy::ToDateRange {
                start_field,
                end_field,
            } => {
                let first = items.iter().find_map(PlanItem::as_date);
                let last = items.iter().rev().find_map(PlanItem::as_date);
                let (Some(first), Some(last)) = (first, last) else {
                    return Err(PlanError::Map(
                        "date range mapping requires date items".to_string(),
                    ));
                };
                let mut params = Params::new();
                params.insert(
                    start_field.clone(),
                    first.format(PARAM_DATE_FORMAT).to_string(),
                );
                params.insert(end_field.clone(), last.format(PARAM_DATE_FORMAT).to_string());
                Ok(params)
            }
            MapStrategy::ToGroupedDict {
                group_attrs,
                item_attr,
                list_field,
            } => {
                let mut params = Params::new();
                for attr in group_attrs {
                    let value = items[0].attr(attr).ok_or_else(|| {
                        PlanError::Map(format!("group missing attribute '{attr}'"))
                    })?;
                    params.insert(attr.clone(), value);
                }
                let mut codes = Vec::with_capacity(items.len());
                for item in items {
                    codes.push(item.attr(item_attr).ok_or_else(|| {
                        PlanError::Map(format!("item missing attribute '{item_attr}'"))
                    })?);
                }
                params.insert(list_field.clone(), codes.join(","));
                Ok(params)
            }
            MapStrategy::Custom(f) => f(items),
        }
    }
}
