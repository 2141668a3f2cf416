//! Row transformation.
//!
//! Applies a dataset's declarative transform rules to fetched rows: column
//! renames, numeric coercion, and date-format normalization. Remote sources
//! are inconsistent about date columns; a 6-digit value is a year-month and
//! an 8-digit value a year-month-day, detected by length and parsed
//! accordingly. Transformation is all-or-nothing for a batch: a value that
//! cannot be coerced fails the whole batch as a data error.

use crate::Row;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Normalized output format for date columns.
const OUTPUT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Transform errors; all fail the batch.
#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    /// A declared numeric column held a value that does not parse.
    #[error("column '{column}' is not numeric: {value}")]
    NotNumeric {
        /// Column name.
        column: String,
        /// Offending value.
        value: String,
    },

    /// A declared date column held a value in no recognized format.
    #[error("column '{column}' is not a date: {value}")]
    NotDate {
        /// Column name.
        column: String,
        /// Offending value.
        value: String,
    },
}

/// Declarative per-dataset transform rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformRules {
    /// Source column → destination column renames.
    #[serde(default)]
    pub renames: BTreeMap<String, String>,
    /// Columns coerced to numbers.
    #[serde(default)]
    pub numeric_columns: Vec<String>,
    /// Columns normalized to ISO dates.
    #[serde(default)]
    pub date_columns: Vec<String>,
}

impl TransformRules {
    /// Apply the rules to a batch of rows.
    ///
    /// # Errors
    /// The first coercion failure aborts the whole batch; no partially
    /// transformed rows escape.
    pub fn apply(&self, rows: Vec<Row>) -> Result<Vec<Row>, TransformError> {
        rows.into_iter().map(|row| self.apply_row(row)).collect()
    }

    fn apply_row(&self, mut row: Row) -> Result<Row, TransformError> {
        for (from, to) in &self.renames {
            if let Some(value) = row.remove(from) {
                row.insert(to.clone(), value);
            }
        }

        for column in &self.numeric_columns {
            if let Some(value) = row.get(column) {
                let coerced = coerce_numeric(column, value)?;
                row.insert(column.clone(), coerced);
            }
        }

        for column in &self.date_columns {
            if let Some(value) = row.get(column) {
                let coerced = coerce_date(column, value)?;
                row.insert(column.clone(), coerced);
            }
        }

        Ok(row)
    }
}

fn coerce_numeric(column: &str, value: &Value) -> Result<Value, TransformError> {
    match value {
        Value::Number(_) | Value::Null => Ok(value.clone()),
        Value::String(s) if s.trim().is_empty() => Ok(Value::Null),
        Value::String(s) => {
            let parsed: f64 = s.trim().parse().map_err(|_| TransformError::NotNumeric {
                column: column.to_string(),
                value: s.clone(),
            })?;
            serde_json::Number::from_f64(parsed)
                .map(Value::Number)
                .ok_or_else(|| TransformError::NotNumeric {
                    column: column.to_string(),
                    value: s.clone(),
                })
        }
        other => Err(TransformError::NotNumeric {
            column: column.to_string(),
            value: other.to_string(),
        }),
    }
}

/// Normalize a date value to `YYYY-MM-DD`.
///
/// Accepts 8-digit year-month-day, 6-digit year-month (normalized to the
/// first of the month), and already-ISO values; the digit forms may arrive
/// as JSON numbers.
fn coerce_date(column: &str, value: &Value) -> Result<Value, TransformError> {
    let text = match value {
        Value::Null => return Ok(Value::Null),
        Value::String(s) if s.trim().is_empty() => return Ok(Value::Null),
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        other => {
            return Err(TransformError::NotDate {
                column: column.to_string(),
                value: other.to_string(),
            })
        }
    };

    let parsed = if text.len() == 8 && text.chars().all(|c| c.is_ascii_digit()) {
        NaiveDate::parse_from_str(&text, "%Y%m%d").ok()
    } else if text.len() == 6 && text.chars().all(|c| c.is_ascii_digit()) {
        NaiveDate::parse_from_str(&format!("{text}01"), "%Y%m%d").ok()
    } else {
        NaiveDate::parse_from_str(&text, OUTPUT_DATE_FORMAT).ok()
    };

    match parsed {
        Some(date) => Ok(Value::String(date.format(OUTPUT_DATE_FORMAT).to_string())),
        None => Err(TransformError::NotDate {
            column: column.to_string(),
            value: text,
        }),
    }
}
