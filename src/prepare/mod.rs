//! Raw-to-prepared extract preparation
//!
//! [`Preparer`] turns `<raw_dir>/<entity>_data.csv` into
//! `<prepared_dir>/<entity>_data_prepared.csv`, running the stages listed in
//! [`Stage::ALL`] and logging how many rows each one removed.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::models::{EntityType, RecordSet, format_cell};
use crate::source::{SourceError, read_delimited};

pub mod policy;

pub use policy::{CleaningPolicy, NoCleaning, Stage, missing_by_column};

/// Error preparing an extract
#[derive(Debug, thiserror::Error)]
pub enum PrepareError {
    /// Raw extract missing or unreadable
    #[error(transparent)]
    Source(#[from] SourceError),

    /// Prepared extract could not be written
    #[error("Failed to write {path}: {reason}")]
    Write { path: String, reason: String },

    /// A cleaning rule rejected the data
    #[error("{stage} failed for {entity}: {reason}")]
    Policy {
        entity: EntityType,
        stage: Stage,
        reason: String,
    },
}

/// Rows before and after one stage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageCount {
    pub stage: Stage,
    pub rows_before: usize,
    pub rows_after: usize,
}

impl StageCount {
    pub fn removed(&self) -> usize {
        self.rows_before.saturating_sub(self.rows_after)
    }
}

/// Outcome of preparing one entity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparationReport {
    pub entity: EntityType,
    pub input: String,
    pub output: String,
    /// SHA-256 of the raw file
    pub input_fingerprint: String,
    pub rows_read: usize,
    pub rows_written: usize,
    pub stages: Vec<StageCount>,
}

/// Reads raw extracts, applies a [`CleaningPolicy`] and writes prepared extracts
pub struct Preparer<P: CleaningPolicy = NoCleaning> {
    raw_dir: PathBuf,
    prepared_dir: PathBuf,
    delimiter: u8,
    policy: P,
}

impl Preparer<NoCleaning> {
    /// Preparer without cleaning rules (duplicate removal only)
    pub fn new(raw_dir: impl Into<PathBuf>, prepared_dir: impl Into<PathBuf>) -> Self {
        Self::with_policy(raw_dir, prepared_dir, NoCleaning)
    }
}

impl<P: CleaningPolicy> Preparer<P> {
    pub fn with_policy(
        raw_dir: impl Into<PathBuf>,
        prepared_dir: impl Into<PathBuf>,
        policy: P,
    ) -> Self {
        Self {
            raw_dir: raw_dir.into(),
            prepared_dir: prepared_dir.into(),
            delimiter: b',',
            policy,
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Raw extract path of an entity
    pub fn input_path(&self, entity: EntityType) -> PathBuf {
        self.raw_dir.join(entity.raw_file_name())
    }

    /// Prepared extract path of an entity
    pub fn output_path(&self, entity: EntityType) -> PathBuf {
        self.prepared_dir.join(entity.prepared_file_name())
    }

    /// Prepare every entity, stopping at the first failure
    pub fn prepare_all(&self) -> Result<Vec<PreparationReport>, PrepareError> {
        EntityType::ALL
            .into_iter()
            .map(|entity| self.prepare(entity))
            .collect()
    }

    /// Prepare one entity
    pub fn prepare(&self, entity: EntityType) -> Result<PreparationReport, PrepareError> {
        let input = self.input_path(entity);
        let (set, input_fingerprint) = read_delimited(entity, &input, self.delimiter, text_cell)?;
        info!(
            "Read {} {} rows with {} columns from {}",
            set.len(),
            entity,
            set.columns.len(),
            input.display()
        );
        let rows_read = set.len();

        let mut stages = Vec::with_capacity(Stage::ALL.len());
        let mut current = set;
        for stage in Stage::ALL {
            let before = current.len();
            current = self.run_stage(stage, current)?;
            let count = StageCount {
                stage,
                rows_before: before,
                rows_after: current.len(),
            };
            info!(
                "{} ({}): removed {} rows, {} remaining",
                stage,
                entity,
                count.removed(),
                count.rows_after
            );
            stages.push(count);
        }

        let output = self.output_path(entity);
        write_delimited(&output, &current, self.delimiter)?;
        info!("Wrote {} {} rows to {}", current.len(), entity, output.display());

        Ok(PreparationReport {
            entity,
            input: input.display().to_string(),
            output: output.display().to_string(),
            input_fingerprint,
            rows_read,
            rows_written: current.len(),
            stages,
        })
    }

    fn run_stage(&self, stage: Stage, set: RecordSet) -> Result<RecordSet, PrepareError> {
        match stage {
            Stage::RemoveDuplicates => Ok(remove_exact_duplicates(set)),
            Stage::HandleMissing => {
                log_missing("before", &set);
                let set = self.policy.handle_missing(set)?;
                log_missing("after", &set);
                Ok(set)
            }
            Stage::StandardizeFormats => self.policy.standardize_formats(set),
            Stage::RemoveOutliers => self.policy.remove_outliers(set),
            Stage::Validate => self.policy.validate(set),
        }
    }
}

fn log_missing(when: &str, set: &RecordSet) {
    let missing: Vec<String> = missing_by_column(set)
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(column, n)| format!("{}={}", column, n))
        .collect();
    debug!(
        "Missing values {} handling ({}): {}",
        when,
        set.entity,
        if missing.is_empty() {
            "none".to_string()
        } else {
            missing.join(", ")
        }
    );
}

/// Raw cells stay text; empty is null
fn text_cell(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Value::Null
    } else {
        Value::String(trimmed.to_string())
    }
}

/// Drop rows identical in every header column, keeping the first occurrence
pub fn remove_exact_duplicates(mut set: RecordSet) -> RecordSet {
    let columns = set.columns.clone();
    let mut seen: HashSet<Vec<Option<String>>> = HashSet::with_capacity(set.rows.len());
    set.rows.retain(|row| {
        let key: Vec<Option<String>> = columns
            .iter()
            .map(|c| match row.get(c) {
                None | Some(Value::Null) => None,
                Some(value) => Some(format_cell(value)),
            })
            .collect();
        seen.insert(key)
    });
    set
}

fn write_delimited(path: &Path, set: &RecordSet, delimiter: u8) -> Result<(), PrepareError> {
    let write_error = |reason: String| PrepareError::Write {
        path: path.display().to_string(),
        reason,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|e| write_error(e.to_string()))?;
    }

    let mut writer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_path(path)
        .map_err(|e| write_error(e.to_string()))?;
    writer
        .write_record(&set.columns)
        .map_err(|e| write_error(e.to_string()))?;
    for row in &set.rows {
        let cells = set.columns.iter().map(|c| match row.get(c) {
            Some(value) => format_cell(value),
            None => String::new(),
        });
        writer
            .write_record(cells)
            .map_err(|e| write_error(e.to_string()))?;
    }
    writer.flush().map_err(|e| write_error(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{CsvRecordSource, RecordSource};
    use serde_json::json;
    use tempfile::TempDir;

    fn setup(raw: &str) -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let raw_dir = dir.path().join("raw");
        let prepared_dir = dir.path().join("prepared");
        std::fs::create_dir_all(&raw_dir).unwrap();
        std::fs::write(raw_dir.join("customers_data.csv"), raw).unwrap();
        (dir, raw_dir, prepared_dir)
    }

    #[test]
    fn test_removes_exact_duplicates_and_writes_prepared_file() {
        let (_dir, raw_dir, prepared_dir) = setup(
            " CustomerID ,Name,Region\n1,Ada,East\n2,Bo,West\n1,Ada,East\n1,Ada,North\n",
        );
        let report = Preparer::new(&raw_dir, &prepared_dir)
            .prepare(EntityType::Customer)
            .unwrap();

        assert_eq!(report.rows_read, 4);
        assert_eq!(report.rows_written, 3);
        assert_eq!(report.stages[0].removed(), 1);
        assert!(report.stages[1..].iter().all(|s| s.removed() == 0));

        let content =
            std::fs::read_to_string(prepared_dir.join("customers_data_prepared.csv")).unwrap();
        assert_eq!(content, "CustomerID,Name,Region\n1,Ada,East\n2,Bo,West\n1,Ada,North\n");
    }

    #[test]
    fn test_keeps_leading_zeros_and_empty_cells() {
        let (_dir, raw_dir, prepared_dir) = setup("CustomerID,Name,Region\n007,Ada,\n");
        Preparer::new(&raw_dir, &prepared_dir)
            .prepare(EntityType::Customer)
            .unwrap();
        let content =
            std::fs::read_to_string(prepared_dir.join("customers_data_prepared.csv")).unwrap();
        assert_eq!(content, "CustomerID,Name,Region\n007,Ada,\n");
    }

    struct DropUnnamed;

    impl CleaningPolicy for DropUnnamed {
        fn handle_missing(&self, mut set: RecordSet) -> Result<RecordSet, PrepareError> {
            set.rows
                .retain(|row| row.get("Name").is_some_and(|v| !v.is_null()));
            Ok(set)
        }

        fn validate(&self, set: RecordSet) -> Result<RecordSet, PrepareError> {
            if set.rows.is_empty() {
                return Err(PrepareError::Policy {
                    entity: set.entity,
                    stage: Stage::Validate,
                    reason: "no rows left".to_string(),
                });
            }
            Ok(set)
        }
    }

    #[test]
    fn test_policy_stages_are_applied_in_order() {
        let (_dir, raw_dir, prepared_dir) = setup("CustomerID,Name\n1,Ada\n2,\n");
        let preparer = Preparer::with_policy(&raw_dir, &prepared_dir, DropUnnamed);
        let report = preparer.prepare(EntityType::Customer).unwrap();
        assert_eq!(report.stages[1].stage, Stage::HandleMissing);
        assert_eq!(report.stages[1].removed(), 1);

        let prepared = CsvRecordSource::new(&prepared_dir)
            .load(EntityType::Customer)
            .unwrap();
        assert_eq!(prepared.len(), 1);
        assert_eq!(prepared.rows[0].get("CustomerID"), Some(&json!(1)));
    }

    #[test]
    fn test_policy_error_aborts_without_output() {
        let (_dir, raw_dir, prepared_dir) = setup("CustomerID,Name\n2,\n");
        let err = Preparer::with_policy(&raw_dir, &prepared_dir, DropUnnamed)
            .prepare(EntityType::Customer)
            .unwrap_err();
        assert!(err.to_string().contains("validate failed for customers"));
        assert!(!prepared_dir.join("customers_data_prepared.csv").exists());
    }

    #[test]
    fn test_missing_raw_file() {
        let (_dir, raw_dir, prepared_dir) = setup("CustomerID\n1\n");
        let err = Preparer::new(&raw_dir, &prepared_dir)
            .prepare(EntityType::Product)
            .unwrap_err();
        assert!(matches!(
            err,
            PrepareError::Source(SourceError::NotFound { entity: EntityType::Product, .. })
        ));
    }
}
