//! Pipeline configuration file support
//!
//! Handles `.sales-warehouse.toml` and the environment variables that override it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoadError;
use crate::mapping::{MappingConfig, MappingError};

/// Default configuration filename
pub const CONFIG_FILENAME: &str = ".sales-warehouse.toml";

/// Default warehouse database path (relative to the project directory)
pub const DEFAULT_DB_PATH: &str = "data/dw/smart_sales.db";

/// Default directory of prepared extracts
pub const DEFAULT_PREPARED_DIR: &str = "data/prepared";

/// Default directory of raw extracts
pub const DEFAULT_RAW_DIR: &str = "data/raw";

/// Environment variable for the warehouse path
pub const ENV_DB_PATH: &str = "SALES_WAREHOUSE_DB_PATH";

/// Environment variable for the prepared directory
pub const ENV_PREPARED_DIR: &str = "SALES_WAREHOUSE_PREPARED_DIR";

/// Environment variable for the raw directory
pub const ENV_RAW_DIR: &str = "SALES_WAREHOUSE_RAW_DIR";

/// Error reading or interpreting configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Failed to serialize config: {0}")]
    Serialize(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl From<ConfigError> for LoadError {
    fn from(err: ConfigError) -> Self {
        LoadError::Config(err.to_string())
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// `[warehouse]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WarehouseSection {
    /// Database file (relative to the project directory, or absolute)
    #[serde(default = "default_db_path")]
    pub path: String,
}

fn default_db_path() -> String {
    DEFAULT_DB_PATH.to_string()
}

impl Default for WarehouseSection {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

/// `[source]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSection {
    #[serde(default = "default_prepared_dir")]
    pub prepared_dir: String,

    #[serde(default = "default_raw_dir")]
    pub raw_dir: String,

    /// Single-character field delimiter
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
}

fn default_prepared_dir() -> String {
    DEFAULT_PREPARED_DIR.to_string()
}

fn default_raw_dir() -> String {
    DEFAULT_RAW_DIR.to_string()
}

fn default_delimiter() -> String {
    ",".to_string()
}

impl Default for SourceSection {
    fn default() -> Self {
        Self {
            prepared_dir: default_prepared_dir(),
            raw_dir: default_raw_dir(),
            delimiter: default_delimiter(),
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub warehouse: WarehouseSection,

    #[serde(default)]
    pub source: SourceSection,

    /// Per-entity mapping overrides: entity name to (source field, warehouse column)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mapping: BTreeMap<String, BTreeMap<String, String>>,
}

impl PipelineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a project directory.
    ///
    /// Falls back to defaults when `.sales-warehouse.toml` is absent, then applies
    /// environment overrides.
    pub fn load(project_dir: &Path) -> ConfigResult<Self> {
        let config_path = project_dir.join(CONFIG_FILENAME);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path).map_err(|e| {
                ConfigError::Io(format!("Failed to read {}: {}", config_path.display(), e))
            })?;
            Self::parse(&content)?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string and validate it
    pub fn parse(content: &str) -> ConfigResult<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.delimiter()?;
        Ok(config)
    }

    /// Save configuration to a project directory
    pub fn save(&self, project_dir: &Path) -> ConfigResult<()> {
        let config_path = project_dir.join(CONFIG_FILENAME);
        let content = self.to_toml()?;
        std::fs::write(&config_path, content).map_err(|e| {
            ConfigError::Io(format!("Failed to write {}: {}", config_path.display(), e))
        })
    }

    /// Convert configuration to a TOML string
    pub fn to_toml(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(ENV_DB_PATH)
            && !path.is_empty()
        {
            self.warehouse.path = path;
        }
        if let Ok(dir) = std::env::var(ENV_PREPARED_DIR)
            && !dir.is_empty()
        {
            self.source.prepared_dir = dir;
        }
        if let Ok(dir) = std::env::var(ENV_RAW_DIR)
            && !dir.is_empty()
        {
            self.source.raw_dir = dir;
        }
    }

    /// Warehouse database path resolved against the project directory
    pub fn db_path(&self, project_dir: &Path) -> PathBuf {
        resolve(project_dir, &self.warehouse.path, DEFAULT_DB_PATH)
    }

    /// Prepared-data directory resolved against the project directory
    pub fn prepared_dir(&self, project_dir: &Path) -> PathBuf {
        resolve(project_dir, &self.source.prepared_dir, DEFAULT_PREPARED_DIR)
    }

    /// Raw-data directory resolved against the project directory
    pub fn raw_dir(&self, project_dir: &Path) -> PathBuf {
        resolve(project_dir, &self.source.raw_dir, DEFAULT_RAW_DIR)
    }

    /// Field delimiter as a byte
    pub fn delimiter(&self) -> ConfigResult<u8> {
        match self.source.delimiter.as_bytes() {
            [b] if b.is_ascii() && *b != b'"' && *b != b'\n' && *b != b'\r' => Ok(*b),
            _ => Err(ConfigError::Invalid(format!(
                "source.delimiter must be a single ASCII character, got {:?}",
                self.source.delimiter
            ))),
        }
    }

    /// Column maps with this configuration's overrides applied
    pub fn mapping_config(&self) -> Result<MappingConfig, MappingError> {
        MappingConfig::with_overrides(&self.mapping)
    }

    /// Check if a configuration file exists in a project directory
    pub fn exists(project_dir: &Path) -> bool {
        project_dir.join(CONFIG_FILENAME).exists()
    }
}

fn resolve(project_dir: &Path, value: &str, default: &str) -> PathBuf {
    let value = if value.trim().is_empty() { default } else { value };
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project_dir.join(path)
    }
}

/// Sample configuration file content
pub fn sample_config() -> &'static str {
    r#"# Sales warehouse loader configuration

[warehouse]
# SQLite database file (relative to this directory, or absolute)
path = "data/dw/smart_sales.db"

[source]
# Prepared extracts read by `load`
prepared_dir = "data/prepared"
# Raw extracts read by `prepare`
raw_dir = "data/raw"
# Field delimiter of both
delimiter = ","

# Optional per-entity overrides of the default column mapping.
# An entry replaces any default entry with the same source field or warehouse column.
# [mapping.customer]
# CustID = "customer_id"
"#
}
