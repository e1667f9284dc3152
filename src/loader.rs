//! The load run
//!
//! [`Loader::run`] reads the three prepared datasets, maps them to warehouse naming,
//! opens the warehouse, makes sure its tables exist and replaces their contents in a
//! single transaction. The connection lives only for the run.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::error::LoadResult;
use crate::mapping::{ColumnMapper, MappingConfig};
use crate::models::{EntityType, RecordSet};
use crate::source::{CsvRecordSource, RecordSource};
use crate::warehouse::{RefreshBatch, RefreshCoordinator, SqliteWarehouse, WarehouseSchema};

/// What was loaded into one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableLoadStats {
    pub table: String,
    pub entity: EntityType,
    /// Rows in the table after the run
    pub rows_loaded: usize,
    /// Rows the run replaced
    pub rows_replaced: usize,
    /// Where the rows came from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// SHA-256 of the source file
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
}

/// Outcome of a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Database file, or `:memory:`
    pub warehouse: String,
    /// Tables created by this run's schema step
    pub tables_created: Vec<String>,
    /// Per-table results in insertion order
    pub tables: Vec<TableLoadStats>,
}

impl LoadReport {
    /// Rows loaded into a table
    pub fn rows_loaded(&self, table: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows_loaded)
    }

    /// Rows loaded across all tables
    pub fn total_rows(&self) -> usize {
        self.tables.iter().map(|t| t.rows_loaded).sum()
    }
}

/// Loads prepared data from a [`RecordSource`] into the warehouse
pub struct Loader<S: RecordSource> {
    source: S,
    mapping: MappingConfig,
    schema: WarehouseSchema,
    db_path: PathBuf,
}

impl Loader<CsvRecordSource> {
    /// Loader reading CSV extracts as configured for `project_dir`
    pub fn from_config(config: &PipelineConfig, project_dir: &Path) -> LoadResult<Self> {
        let source = CsvRecordSource::new(config.prepared_dir(project_dir))
            .with_delimiter(config.delimiter()?);
        let mapping = config.mapping_config()?;
        Ok(Self::new(source, mapping, config.db_path(project_dir)))
    }
}

impl<S: RecordSource> Loader<S> {
    pub fn new(source: S, mapping: MappingConfig, db_path: impl Into<PathBuf>) -> Self {
        Self {
            source,
            mapping,
            schema: WarehouseSchema::standard(),
            db_path: db_path.into(),
        }
    }

    /// Warehouse file this loader writes
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn schema(&self) -> &WarehouseSchema {
        &self.schema
    }

    /// Run a full refresh against the configured warehouse file.
    ///
    /// The warehouse is opened only after every dataset has been read, mapped and
    /// checked, and the connection is dropped on every exit path. A failed run leaves
    /// no trace: tables are created inside the refresh transaction, and a database
    /// file (or directory) the run itself created is removed again.
    pub fn run(&self) -> LoadResult<LoadReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("load", %run_id);
        let _guard = span.enter();

        let result = self.read_batch().and_then(|batch| {
            RefreshCoordinator::new(&self.schema).check(&batch)?;

            let new_paths = missing_paths(&self.db_path);
            let outcome = SqliteWarehouse::open(&self.db_path).and_then(|mut warehouse| {
                self.apply(&mut warehouse, &batch, run_id, started_at)
            });
            if outcome.is_err() {
                remove_paths(&new_paths);
            }
            outcome
        });
        if let Err(err) = &result {
            error!("Load failed ({}): {}", err.kind(), err);
        }
        result
    }

    /// Run a full refresh against a warehouse the caller already holds
    pub fn load_into(&self, warehouse: &mut SqliteWarehouse) -> LoadResult<LoadReport> {
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let span = info_span!("load", %run_id);
        let _guard = span.enter();

        let batch = self.read_batch()?;
        self.apply(warehouse, &batch, run_id, started_at)
    }

    fn read_batch(&self) -> LoadResult<RefreshBatch> {
        let mapper = ColumnMapper::new(&self.mapping);
        let customers = self.read_mapped(&mapper, EntityType::Customer)?;
        let products = self.read_mapped(&mapper, EntityType::Product)?;
        let sales = self.read_mapped(&mapper, EntityType::Sale)?;
        Ok(RefreshBatch::new(customers, products, sales))
    }

    fn read_mapped(&self, mapper: &ColumnMapper<'_>, entity: EntityType) -> LoadResult<RecordSet> {
        let set = self.source.load(entity)?;
        info!(
            "Read {} {} rows from {}",
            set.len(),
            entity,
            set.origin
                .clone()
                .unwrap_or_else(|| self.source.describe(entity))
        );
        Ok(mapper.map_record_set(&set)?)
    }

    fn apply(
        &self,
        warehouse: &mut SqliteWarehouse,
        batch: &RefreshBatch,
        run_id: Uuid,
        started_at: DateTime<Utc>,
    ) -> LoadResult<LoadReport> {
        let summary = warehouse.refresh(&self.schema, batch)?;

        let tables = summary
            .tables
            .iter()
            .filter_map(|t| {
                let entity = EntityType::from_table_name(&t.table)?;
                let set = batch.record_set(entity);
                Some(TableLoadStats {
                    table: t.table.clone(),
                    entity,
                    rows_loaded: t.rows_inserted,
                    rows_replaced: t.rows_deleted,
                    source: set.and_then(|s| s.origin.clone()),
                    fingerprint: set.and_then(|s| s.fingerprint.clone()),
                })
            })
            .collect();

        let finished_at = Utc::now();
        let report = LoadReport {
            run_id,
            started_at,
            finished_at,
            duration_ms: (finished_at - started_at).num_milliseconds().max(0) as u64,
            warehouse: warehouse
                .db_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            tables_created: summary.schema.created.clone(),
            tables,
        };
        info!(
            "Load complete: {} rows in {}ms",
            report.total_rows(),
            report.duration_ms
        );
        Ok(report)
    }
}

/// The database file and its missing ancestor directories, deepest first
fn missing_paths(db_path: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    let mut current = Some(db_path);
    while let Some(path) = current {
        if path.as_os_str().is_empty() || path.exists() {
            break;
        }
        paths.push(path.to_path_buf());
        current = path.parent();
    }
    paths
}

fn remove_paths(paths: &[PathBuf]) {
    for (i, path) in paths.iter().enumerate() {
        let removed = if i == 0 {
            std::fs::remove_file(path)
        } else {
            std::fs::remove_dir(path)
        };
        match removed {
            Ok(()) => debug!("Removed {} created by the failed run", path.display()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove {}: {}", path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{LoadError, LoadErrorKind};
    use crate::models::Record;
    use crate::source::InMemoryRecordSource;
    use serde_json::{Value, json};

    fn set(entity: EntityType, rows: Value) -> RecordSet {
        let rows: Vec<Record> = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect();
        RecordSet::from_rows(entity, rows)
    }

    fn source() -> InMemoryRecordSource {
        InMemoryRecordSource::new()
            .with_set(set(
                EntityType::Customer,
                json!([{
                    "CustomerID": 1, "Name": "Ada", "Region": "East", "JoinDate": "2023-01-05",
                    "LoyaltyPoints": 120, "PreferredContactMethod": "Email"
                }]),
            ))
            .with_set(set(
                EntityType::Product,
                json!([{
                    "ProductID": 10, "ProductName": "Laptop", "Category": "Electronics",
                    "UnitPrice": 799.99, "StockQuantity": 4, "Supplier": "Acme"
                }]),
            ))
            .with_set(set(
                EntityType::Sale,
                json!([{
                    "TransactionID": 100, "CustomerID": 1, "ProductID": 10,
                    "SaleAmount": 799.99, "SaleDate": "2024-02-01", "StoreID": 3,
                    "CampaignID": 0, "DiscountPercent": 0, "State": "OH"
                }]),
            ))
    }

    #[test]
    fn test_load_into_in_memory_warehouse() {
        let loader = Loader::new(source(), MappingConfig::standard().unwrap(), "unused.db");
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();

        let report = loader.load_into(&mut warehouse).unwrap();
        assert_eq!(report.tables_created, vec!["customer", "product", "sale"]);
        assert_eq!(report.rows_loaded("customer"), Some(1));
        assert_eq!(report.rows_loaded("sale"), Some(1));
        assert_eq!(report.total_rows(), 3);
        assert_eq!(report.warehouse, ":memory:");

        let second = loader.load_into(&mut warehouse).unwrap();
        assert!(second.tables_created.is_empty());
        assert_ne!(second.run_id, report.run_id);
        assert_eq!(second.tables[0].rows_replaced, 1);
    }

    #[test]
    fn test_missing_dataset_is_source_unavailable() {
        let partial = InMemoryRecordSource::new().with_set(RecordSet::empty(EntityType::Customer, vec![]));
        let loader = Loader::new(partial, MappingConfig::standard().unwrap(), "unused.db");
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();

        let err = loader.load_into(&mut warehouse).unwrap_err();
        assert_eq!(err.kind(), LoadErrorKind::SourceUnavailable);
        match err {
            LoadError::SourceUnavailable { entity, .. } => assert_eq!(entity, EntityType::Product),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_report_serializes_camel_case() {
        let loader = Loader::new(source(), MappingConfig::standard().unwrap(), "unused.db");
        let mut warehouse = SqliteWarehouse::in_memory().unwrap();
        let report = loader.load_into(&mut warehouse).unwrap();

        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("runId").is_some());
        assert!(value.get("tablesCreated").is_some());
        assert_eq!(value["tables"][0]["rowsLoaded"], 1);
        assert_eq!(value["tables"][0]["entity"], "customer");
    }
}
