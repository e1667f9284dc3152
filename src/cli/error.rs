//! CLI-specific error types

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::error::{LoadError, LoadErrorKind};
use crate::prepare::PrepareError;
use crate::source::SourceError;

/// CLI-specific error type
#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("Preparation failed: {0}")]
    Prepare(#[from] PrepareError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Warehouse not found at {0}. Run 'load' first.")]
    WarehouseNotFound(PathBuf),

    #[error("Failed to write file {0}: {1}")]
    FileWriteError(PathBuf, String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CliError {
    /// Process exit code; load failures use the code of their kind
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Load(err) => err.kind().exit_code(),
            CliError::Prepare(PrepareError::Source(_)) => {
                LoadErrorKind::SourceUnavailable.exit_code()
            }
            CliError::Config(_) => LoadErrorKind::Config.exit_code(),
            _ => 1,
        }
    }
}

impl From<SourceError> for CliError {
    fn from(err: SourceError) -> Self {
        CliError::Load(err.into())
    }
}
