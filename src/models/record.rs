//! Tabular record types
//!
//! A [`Record`] is one row as a field-name-to-value mapping. A [`RecordSet`] is the
//! full dataset for one entity: the header (column order as read) plus its rows.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntityType;

/// One row: field name to value
pub type Record = serde_json::Map<String, Value>;

/// All rows of one entity together with the header they were read under
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSet {
    /// Entity the rows belong to
    pub entity: EntityType,
    /// Column names in header order
    pub columns: Vec<String>,
    /// Rows
    pub rows: Vec<Record>,
    /// Where the rows came from (file path, "memory", ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    /// SHA-256 of the source content, when the source is a file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

impl RecordSet {
    /// Create a record set with an explicit header
    pub fn new(entity: EntityType, columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self {
            entity,
            columns,
            rows,
            origin: None,
            fingerprint: None,
        }
    }

    /// Create a record set whose header is the union of the rows' field names,
    /// in first-seen order
    pub fn from_rows(entity: EntityType, rows: Vec<Record>) -> Self {
        let mut columns: Vec<String> = Vec::new();
        for row in &rows {
            for key in row.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }
        Self::new(entity, columns, rows)
    }

    /// Create an empty record set with the given header
    pub fn empty(entity: EntityType, columns: Vec<String>) -> Self {
        Self::new(entity, columns, Vec::new())
    }

    /// Attach an origin description
    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Attach a content fingerprint
    pub fn with_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.fingerprint = Some(fingerprint.into());
        self
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check if the header contains a column
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }
}

/// Type a delimited-text cell the way the prepared files are meant to be read:
/// empty is null, then integer, then finite decimal, otherwise text.
pub fn parse_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Value::Number(i.into());
    }
    if let Ok(f) = trimmed.parse::<f64>()
        && f.is_finite()
        && let Some(n) = serde_json::Number::from_f64(f)
    {
        return Value::Number(n);
    }
    Value::String(trimmed.to_string())
}

/// Render a value back to a delimited-text cell
pub fn format_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
