//! Caller-supplied cleaning rules
//!
//! Preparation runs its stages in a fixed order. Exact-duplicate removal is built in;
//! the other stages call into a [`CleaningPolicy`]. Every method defaults to returning
//! the set unchanged, so a policy only overrides the stages it has rules for.

use serde_json::Value;

use super::PrepareError;
use crate::models::RecordSet;

/// Preparation stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    RemoveDuplicates,
    HandleMissing,
    StandardizeFormats,
    RemoveOutliers,
    Validate,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::RemoveDuplicates,
        Stage::HandleMissing,
        Stage::StandardizeFormats,
        Stage::RemoveOutliers,
        Stage::Validate,
    ];
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Stage::RemoveDuplicates => "remove duplicates",
            Stage::HandleMissing => "handle missing values",
            Stage::StandardizeFormats => "standardize formats",
            Stage::RemoveOutliers => "remove outliers",
            Stage::Validate => "validate",
        })
    }
}

/// Business rules applied while preparing raw extracts.
///
/// Cells arrive as text (`Value::String`) or null, exactly as read from the raw file.
/// Returning an error aborts preparation of that entity.
pub trait CleaningPolicy {
    /// Fill or drop rows with missing values
    fn handle_missing(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        Ok(set)
    }

    /// Normalize formatting of individual cells
    fn standardize_formats(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        Ok(set)
    }

    /// Drop rows outside accepted ranges
    fn remove_outliers(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        Ok(set)
    }

    /// Reject or filter rows breaking business rules
    fn validate(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        Ok(set)
    }
}

/// Policy with no rules: every stage passes rows through
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCleaning;

impl CleaningPolicy for NoCleaning {}

impl<P: CleaningPolicy + ?Sized> CleaningPolicy for &P {
    fn handle_missing(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        (**self).handle_missing(set)
    }

    fn standardize_formats(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        (**self).standardize_formats(set)
    }

    fn remove_outliers(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        (**self).remove_outliers(set)
    }

    fn validate(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
        (**self).validate(set)
    }
}

/// Count of null cells per header column, in header order
pub fn missing_by_column(set: &RecordSet) -> Vec<(String, usize)> {
    set.columns
        .iter()
        .map(|column| {
            let missing = set
                .rows
                .iter()
                .filter(|row| row.get(column).is_none_or(Value::is_null))
                .count();
            (column.clone(), missing)
        })
        .collect()
}
