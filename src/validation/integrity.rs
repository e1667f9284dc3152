//! Batch integrity validation
//!
//! Checks a mapped refresh batch against the warehouse schema before any row is
//! written: every primary key present, integer-valued and unique within its table,
//! and every foreign key resolving to a key of the referenced table in the same batch.
//! Violations name the table and the zero-based row.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{LoadError, LoadResult};
use crate::models::Record;
use crate::warehouse::WarehouseSchema;
use crate::warehouse::refresh::RefreshBatch;

/// Normalized key value used to compare primary and foreign keys
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeyValue {
    /// Integer key (`7`, `7.0` and `"7"` all normalize here)
    Int(i64),
    /// Anything that is not integer-like
    Text(String),
}

impl KeyValue {
    /// Normalize a record value; `None` for null
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(KeyValue::Int(i))
                } else if let Some(f) = n.as_f64()
                    && f.fract() == 0.0
                    && f >= i64::MIN as f64
                    && f <= i64::MAX as f64
                {
                    Some(KeyValue::Int(f as i64))
                } else {
                    Some(KeyValue::Text(n.to_string()))
                }
            }
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    None
                } else {
                    Some(
                        trimmed
                            .parse::<i64>()
                            .map(KeyValue::Int)
                            .unwrap_or_else(|_| KeyValue::Text(trimmed.to_string())),
                    )
                }
            }
            other => Some(KeyValue::Text(other.to_string())),
        }
    }

    /// Look up and normalize a field of a record
    pub fn from_record(record: &Record, field: &str) -> Option<Self> {
        record.get(field).and_then(Self::from_value)
    }
}

impl std::fmt::Display for KeyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyValue::Int(i) => write!(f, "{}", i),
            KeyValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

/// Counts from a successful validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    /// Rows whose primary key was checked
    pub rows_checked: usize,
    /// Foreign-key references resolved
    pub references_checked: usize,
}

/// Validates key and foreign-key rules of a refresh batch
pub struct IntegrityValidator<'a> {
    schema: &'a WarehouseSchema,
}

impl<'a> IntegrityValidator<'a> {
    /// Create a validator for the given schema
    pub fn new(schema: &'a WarehouseSchema) -> Self {
        Self { schema }
    }

    /// Validate the batch; the first violation found is returned as
    /// [`LoadError::IntegrityViolation`]
    pub fn validate(&self, batch: &RefreshBatch) -> LoadResult<IntegrityReport> {
        let mut report = IntegrityReport::default();
        let mut keys_by_table: HashMap<&str, HashSet<KeyValue>> = HashMap::new();

        for table in self.schema.insertion_order()? {
            let rows = batch.rows(table.entity);

            for fk in table.foreign_keys {
                let parent_keys = keys_by_table.get(fk.references_table).ok_or_else(|| {
                    LoadError::schema(
                        table.name,
                        format!("referenced table '{}' is not loaded", fk.references_table),
                    )
                })?;
                for (idx, row) in rows.iter().enumerate() {
                    match KeyValue::from_record(row, fk.column) {
                        None => {
                            return Err(LoadError::integrity(
                                table.name,
                                Some(idx),
                                format!("{} is missing", fk.column),
                            ));
                        }
                        Some(key) if !parent_keys.contains(&key) => {
                            return Err(LoadError::integrity(
                                table.name,
                                Some(idx),
                                format!(
                                    "{} {} not found in {}",
                                    fk.column, key, fk.references_table
                                ),
                            ));
                        }
                        Some(_) => report.references_checked += 1,
                    }
                }
            }

            let keys = check_primary_keys(table.name, table.primary_key, rows)?;
            report.rows_checked += keys.len();
            keys_by_table.insert(table.name, keys);
        }

        Ok(report)
    }
}

fn check_primary_keys(
    table: &str,
    primary_key: &str,
    rows: &[Record],
) -> LoadResult<HashSet<KeyValue>> {
    let mut first_seen: HashMap<KeyValue, usize> = HashMap::with_capacity(rows.len());

    for (idx, row) in rows.iter().enumerate() {
        let key = KeyValue::from_record(row, primary_key).ok_or_else(|| {
            LoadError::integrity(table, Some(idx), format!("{} is missing", primary_key))
        })?;
        if let KeyValue::Text(_) = key {
            return Err(LoadError::integrity(
                table,
                Some(idx),
                format!("{} {} is not an integer", primary_key, key),
            ));
        }
        if let Some(first) = first_seen.get(&key) {
            return Err(LoadError::integrity(
                table,
                Some(idx),
                format!(
                    "duplicate {} {} (first seen at row {})",
                    primary_key, key, first
                ),
            ));
        }
        first_seen.insert(key, idx);
    }

    Ok(first_seen.into_keys().collect())
}
