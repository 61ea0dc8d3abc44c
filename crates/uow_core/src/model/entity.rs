//! Entity mapping contract.
//!
//! # Responsibility
//! - Bind a Rust type to its table, key column and column list.
//! - Convert between rows and values without an external mapper.
//!
//! # Invariants
//! - `key()` returns the value stored under `KEY_COLUMN`.
//! - `from_row` reads columns by name, so column order in SELECT is free.

use rusqlite::types::Value;
use rusqlite::Row;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

/// A persistent type managed through a `Repository`.
///
/// The repository cache keys on the implementing type, so one entity type maps
/// to exactly one table per Unit of Work.
pub trait Entity: Clone + 'static {
    /// Primary-key type. Converted to a SQLite value for key lookups.
    type Key: Clone + Debug + Into<Value>;

    /// Table the entity lives in.
    const TABLE: &'static str;
    /// Primary-key column. Must appear in `COLUMNS`.
    const KEY_COLUMN: &'static str;
    /// Every persisted column, in the order `to_values` produces them.
    const COLUMNS: &'static [&'static str];

    /// Returns this entity's primary key.
    fn key(&self) -> Self::Key;

    /// Materializes one entity from a row containing every column in `COLUMNS`.
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;

    /// Returns the persisted values, aligned with `COLUMNS`.
    fn to_values(&self) -> Vec<Value>;

    /// Field-level checks run when the entity is staged for insert or update.
    ///
    /// An empty list accepts the entity.
    fn validate(&self) -> Vec<FieldViolation> {
        Vec::new()
    }
}

/// One rejected field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    pub field: String,
    pub message: String,
}

impl FieldViolation {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldViolation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Renders a key value for log lines and error text.
pub(crate) fn describe_key(key: &Value) -> String {
    match key {
        Value::Null => "NULL".to_string(),
        Value::Integer(value) => value.to_string(),
        Value::Real(value) => value.to_string(),
        Value::Text(value) => format!("`{value}`"),
        Value::Blob(value) => format!("<blob {} bytes>", value.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::{describe_key, FieldViolation};
    use rusqlite::types::Value;

    #[test]
    fn violation_displays_field_then_message() {
        let violation = FieldViolation::new("company_name", "must not be empty");
        assert_eq!(violation.to_string(), "company_name: must not be empty");
    }

    #[test]
    fn describe_key_quotes_text_keys() {
        assert_eq!(describe_key(&Value::Text("A1".to_string())), "`A1`");
        assert_eq!(describe_key(&Value::Integer(7)), "7");
        assert_eq!(describe_key(&Value::Null), "NULL");
    }
}
