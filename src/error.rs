//! Load pipeline error types
//!
//! Every failure that aborts a run is a [`LoadError`]. Module-level errors
//! ([`SourceError`](crate::source::SourceError), [`MappingError`](crate::mapping::MappingError),
//! [`ConfigError`](crate::config::ConfigError)) convert into it so `?` composes across
//! the pipeline.

use serde::{Deserialize, Serialize};

use crate::models::EntityType;

/// Error kinds surfaced to callers of the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadErrorKind {
    /// A prepared file is missing or unreadable
    SourceUnavailable,
    /// The warehouse structure or the input header is incompatible
    SchemaMismatch,
    /// Dangling foreign key, duplicate or missing primary key
    IntegrityViolation,
    /// The store rejected the transaction
    TransactionFailure,
    /// Configuration could not be read or is invalid
    Config,
}

impl LoadErrorKind {
    /// Process exit code used by the command line wrapper
    pub fn exit_code(&self) -> i32 {
        match self {
            LoadErrorKind::SourceUnavailable => 2,
            LoadErrorKind::SchemaMismatch => 3,
            LoadErrorKind::IntegrityViolation => 4,
            LoadErrorKind::TransactionFailure => 5,
            LoadErrorKind::Config => 6,
        }
    }
}

impl std::fmt::Display for LoadErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LoadErrorKind::SourceUnavailable => "SourceUnavailable",
            LoadErrorKind::SchemaMismatch => "SchemaMismatch",
            LoadErrorKind::IntegrityViolation => "IntegrityViolation",
            LoadErrorKind::TransactionFailure => "TransactionFailure",
            LoadErrorKind::Config => "Config",
        };
        f.write_str(name)
    }
}

/// Error type for a load run
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// A prepared dataset could not be read
    #[error("Source unavailable for {entity} ({location}): {reason}")]
    SourceUnavailable {
        entity: EntityType,
        location: String,
        reason: String,
    },

    /// Warehouse structure or input header does not match what the loader writes
    #[error("Schema mismatch on table '{table}': {detail}")]
    SchemaMismatch { table: String, detail: String },

    /// The batch breaks a key or foreign-key rule
    #[error("Integrity violation in table '{table}'{}: {detail}", row_suffix(.row))]
    IntegrityViolation {
        table: String,
        /// Zero-based row index within the table's batch
        row: Option<usize>,
        detail: String,
    },

    /// The store failed or rejected the transaction
    #[error("Transaction failed during {stage}: {reason}")]
    TransactionFailure { stage: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

fn row_suffix(row: &Option<usize>) -> String {
    row.map(|r| format!(" at row {}", r)).unwrap_or_default()
}

impl LoadError {
    /// Machine-readable kind of this error
    pub fn kind(&self) -> LoadErrorKind {
        match self {
            LoadError::SourceUnavailable { .. } => LoadErrorKind::SourceUnavailable,
            LoadError::SchemaMismatch { .. } => LoadErrorKind::SchemaMismatch,
            LoadError::IntegrityViolation { .. } => LoadErrorKind::IntegrityViolation,
            LoadError::TransactionFailure { .. } => LoadErrorKind::TransactionFailure,
            LoadError::Config(_) => LoadErrorKind::Config,
        }
    }

    pub(crate) fn schema(table: impl Into<String>, detail: impl Into<String>) -> Self {
        LoadError::SchemaMismatch {
            table: table.into(),
            detail: detail.into(),
        }
    }

    pub(crate) fn integrity(
        table: impl Into<String>,
        row: Option<usize>,
        detail: impl Into<String>,
    ) -> Self {
        LoadError::IntegrityViolation {
            table: table.into(),
            row,
            detail: detail.into(),
        }
    }

    pub(crate) fn transaction(stage: impl Into<String>, err: impl std::fmt::Display) -> Self {
        LoadError::TransactionFailure {
            stage: stage.into(),
            reason: err.to_string(),
        }
    }
}

/// Result type for load operations
pub type LoadResult<T> = Result<T, LoadError>;
