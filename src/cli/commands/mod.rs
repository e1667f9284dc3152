//! CLI command implementations

pub mod init_config;
pub mod load;
pub mod prepare;
pub mod query;
pub mod status;

use std::path::{Path, PathBuf};

use crate::cli::error::CliError;
use crate::config::PipelineConfig;
use crate::warehouse::{OutputFormat, SqliteWarehouse};

/// Warehouse path from `--db`, falling back to the project configuration
pub(crate) fn resolve_db_path(
    project_dir: &Path,
    db: Option<&Path>,
) -> Result<PathBuf, CliError> {
    match db {
        Some(path) => Ok(path.to_path_buf()),
        None => Ok(PipelineConfig::load(project_dir)?.db_path(project_dir)),
    }
}

/// Open an existing warehouse without creating a new file
pub(crate) fn open_existing(db_path: &Path) -> Result<SqliteWarehouse, CliError> {
    if !db_path.is_file() {
        return Err(CliError::WarehouseNotFound(db_path.to_path_buf()));
    }
    Ok(SqliteWarehouse::open(db_path)?)
}

pub(crate) fn parse_format(format: &str) -> Result<OutputFormat, CliError> {
    format.parse().map_err(CliError::InvalidArgument)
}
