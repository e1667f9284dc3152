//! Sales Warehouse - full-refresh loader for the sales data warehouse
//!
//! Moves prepared customer, product and sales extracts into a relational warehouse:
//! - Record sources (prepared CSV extracts, in-memory sets)
//! - Column mapping from source-system names to warehouse columns
//! - Schema creation and verification
//! - A single-transaction full refresh with parent/child ordering
//! - Preparation of raw extracts with caller-supplied cleaning rules
//!
//! ```no_run
//! use std::path::Path;
//! use sales_warehouse::{Loader, PipelineConfig};
//!
//! let project = Path::new(".");
//! let config = PipelineConfig::load(project)?;
//! let report = Loader::from_config(&config, project)?.run()?;
//! println!("loaded {} rows", report.total_rows());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod config;
pub mod error;
pub mod loader;
pub mod mapping;
pub mod models;
pub mod prepare;
pub mod source;
pub mod validation;
pub mod warehouse;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::{ConfigError, PipelineConfig};
pub use error::{LoadError, LoadErrorKind, LoadResult};
pub use loader::{LoadReport, Loader, TableLoadStats};
pub use mapping::{ColumnMap, ColumnMapper, MappingConfig, MappingError};
pub use models::{EntityType, Record, RecordSet};
pub use prepare::{CleaningPolicy, NoCleaning, PreparationReport, PrepareError, Preparer};
pub use source::{CsvRecordSource, InMemoryRecordSource, RecordSource, SourceError};
pub use validation::{IntegrityReport, IntegrityValidator};
pub use warehouse::{
    OutputFormat, QueryResult, RefreshBatch, RefreshCoordinator, RefreshSummary, SchemaManager,
    SchemaReport, SqliteWarehouse, WarehouseSchema, format_query_result,
};
