//! Row validation.
//!
//! A dataset declares a list of row-level predicates. Rows failing a
//! predicate are dropped and counted, not abandoned; the batch still
//! succeeds with the remaining rows. A predicate that cannot evaluate its
//! input (a type it does not understand) fails the whole batch as a data
//! error.

use crate::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Validation errors; raised only when a predicate cannot evaluate a row.
#[derive(Debug, thiserror::Error)]
pub enum ValidateError {
    /// A predicate met a value it cannot interpret.
    #[error("predicate {rule} cannot evaluate column '{column}': {value}")]
    Unevaluable {
        /// Rule description.
        rule: String,
        /// Column name.
        column: String,
        /// Offending value.
        value: String,
    },
}

/// Declarative row predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    /// Column must be present and non-null.
    Required {
        /// Column name.
        column: String,
    },
    /// Column, when present, must be a number ≥ 0.
    NonNegative {
        /// Column name.
        column: String,
    },
    /// Column, when present, must be a number > 0.
    Positive {
        /// Column name.
        column: String,
    },
}

impl ValidationRule {
    /// Evaluate the predicate on one row.
    ///
    /// # Returns
    /// `Ok(true)` when the row passes, `Ok(false)` when it should be
    /// dropped.
    ///
    /// # Errors
    /// [`ValidateError::Unevaluable`] for values the predicate cannot
    /// interpret (e.g. a string where a number is required); this fails the
    /// batch.
    pub fn evaluate(&self, row: &Row) -> Result<bool, ValidateError> {
        match self {
            ValidationRule::Required { column } => {
                Ok(row.get(column).is_some_and(|v| !v.is_null()))
            }
            ValidationRule::NonNegative { column } => self
                .numeric(row, column)
                .map(|n| n.map_or(true, |n| n >= 0.0)),
            ValidationRule::Positive { column } => self
                .numeric(row, column)
                .map(|n| n.map_or(true, |n| n > 0.0)),
        }
    }

    /// Numeric value of a column; `None` when absent or null.
    fn numeric(&self, row: &Row, column: &str) -> Result<Option<f64>, ValidateError> {
        match row.get(column) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::Number(n)) => Ok(n.as_f64()),
            Some(other) => Err(ValidateError::Unevaluable {
                rule: format!("{self:?}"),
                column: column.to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// Result of validating a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Validated {
    /// Rows that passed every predicate.
    pub rows: Vec<Row>,
    /// Rows dropped by a failing predicate.
    pub dropped: u64,
}

/// Apply every rule to every row.
///
/// Failing rows are dropped and counted; an unevaluable row aborts the
/// batch.
pub fn validate_rows(rows: Vec<Row>, rules: &[ValidationRule]) -> Result<Validated, ValidateError> {
    if rules.is_empty() {
        return Ok(Validated { rows, dropped: 0 });
    }

    let mut kept = Vec::with_capacity(rows.len());
    let mut dropped = 0u64;
    'rows: for row in rows {
        for rule in rules {
            if !rule.evaluate(&row)? {
                dropped += 1;
                continue 'rows;
            }
        }
        kept.push(row);
    }
    Ok(Validated { rows: kept, dropped })
}
