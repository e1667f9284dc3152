//! Delimited-text record source
//!
//! Reads `<dir>/<entity>_data_prepared.csv`. The first row is the header of
//! source-system field names; cells are typed with [`parse_cell`]. Every file read is
//! fingerprinted with SHA-256 so a load report can name exactly what was loaded.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::Value;
use tracing::debug;

use super::{RecordSource, SourceError, compute_hash};
use crate::models::{EntityType, Record, RecordSet, parse_cell};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads prepared extracts from a directory
#[derive(Debug, Clone)]
pub struct CsvRecordSource {
    dir: PathBuf,
    delimiter: u8,
}

impl CsvRecordSource {
    /// Source reading comma-separated files from `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            delimiter: b',',
        }
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the prepared file for an entity
    pub fn path_for(&self, entity: EntityType) -> PathBuf {
        self.dir.join(entity.prepared_file_name())
    }
}

/// Read and parse a delimited file, typing each cell with `cell`
pub fn read_delimited(
    entity: EntityType,
    path: &Path,
    delimiter: u8,
    cell: fn(&str) -> Value,
) -> Result<(RecordSet, String), SourceError> {
    let location = path.display().to_string();
    if !path.is_file() {
        return Err(SourceError::NotFound { entity, location });
    }

    let content = std::fs::read(path).map_err(|e| SourceError::Unreadable {
        entity,
        location: location.clone(),
        reason: e.to_string(),
    })?;
    let fingerprint = compute_hash(&content);
    let set = parse_delimited(entity, &location, &content, delimiter, cell)?;
    Ok((set.with_origin(location), fingerprint))
}

fn parse_delimited(
    entity: EntityType,
    location: &str,
    content: &[u8],
    delimiter: u8,
    cell: fn(&str) -> Value,
) -> Result<RecordSet, SourceError> {
    let unreadable = |reason: String| SourceError::Unreadable {
        entity,
        location: location.to_string(),
        reason,
    };

    let content = content.strip_prefix(UTF8_BOM).unwrap_or(content);
    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .trim(Trim::All)
        .from_reader(content);

    let headers = reader
        .headers()
        .map_err(|e| unreadable(format!("failed to read header: {}", e)))?
        .clone();
    let columns = header_names(&headers).map_err(unreadable)?;

    let mut rows = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            // records() starts after the header and lines are 1-based
            let line = e
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(idx + 2);
            unreadable(format!("line {}: {}", line, e))
        })?;
        let row: Record = columns
            .iter()
            .zip(record.iter())
            .map(|(name, raw)| (name.clone(), cell(raw)))
            .collect();
        rows.push(row);
    }

    Ok(RecordSet::new(entity, columns, rows))
}

fn header_names(headers: &StringRecord) -> Result<Vec<String>, String> {
    let mut names: Vec<String> = Vec::with_capacity(headers.len());
    for (i, raw) in headers.iter().enumerate() {
        let name = raw.trim();
        if name.is_empty() {
            return Err(format!("header column {} has no name", i + 1));
        }
        if names.iter().any(|n| n == name) {
            return Err(format!("header repeats column '{}'", name));
        }
        names.push(name.to_string());
    }
    Ok(names)
}

impl RecordSource for CsvRecordSource {
    fn load(&self, entity: EntityType) -> Result<RecordSet, SourceError> {
        let (set, fingerprint) =
            read_delimited(entity, &self.path_for(entity), self.delimiter, parse_cell)?;
        debug!(
            "Read {} rows ({} columns) for {} from {}",
            set.len(),
            set.columns.len(),
            entity,
            set.origin.as_deref().unwrap_or_default()
        );
        Ok(set.with_fingerprint(fingerprint))
    }

    fn describe(&self, entity: EntityType) -> String {
        self.path_for(entity).display().to_string()
    }
}
