//! SQLite warehouse handle
//!
//! Owns the connection to the warehouse database file. Foreign-key enforcement is
//! switched on for every connection this type opens.

use std::path::{Path, PathBuf};
use std::time::Instant;

use rusqlite::Connection;
use rusqlite::types::ValueRef;
use serde_json::Value;
use tracing::{debug, info};

use super::refresh::{RefreshBatch, RefreshCoordinator, RefreshSummary};
use super::schema::{SchemaManager, SchemaReport, WarehouseSchema, table_exists};
use super::{QueryResult, quote_identifier};
use crate::error::{LoadError, LoadResult};

/// A warehouse stored in an SQLite database
pub struct SqliteWarehouse {
    /// Database file (None for in-memory)
    db_path: Option<PathBuf>,
    connection: Connection,
}

impl SqliteWarehouse {
    /// Open (or create) the warehouse file, creating parent directories as needed
    pub fn open(db_path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = db_path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                LoadError::transaction(format!("open ({})", parent.display()), e)
            })?;
        }

        let connection = Connection::open(&path)
            .map_err(|e| LoadError::transaction(format!("open ({})", path.display()), e))?;
        info!("Opened warehouse at {}", path.display());
        Self::with_connection(Some(path), connection)
    }

    /// Open a throwaway in-memory warehouse
    pub fn in_memory() -> LoadResult<Self> {
        let connection = Connection::open_in_memory()
            .map_err(|e| LoadError::transaction("open (memory)", e))?;
        Self::with_connection(None, connection)
    }

    fn with_connection(db_path: Option<PathBuf>, connection: Connection) -> LoadResult<Self> {
        connection
            .execute_batch("PRAGMA foreign_keys = ON;")
            .map_err(|e| LoadError::transaction("open (enable foreign keys)", e))?;
        Ok(Self {
            db_path,
            connection,
        })
    }

    /// Database file path (None for in-memory)
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.is_none()
    }

    /// Backend name shown by `status`
    pub fn backend_type(&self) -> &'static str {
        "sqlite"
    }

    /// Direct access to the connection
    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Create missing tables and verify existing ones in a transaction of their own
    pub fn ensure_schema(&mut self, schema: &WarehouseSchema) -> LoadResult<SchemaReport> {
        let tx = self
            .connection
            .transaction()
            .map_err(|e| LoadError::transaction("schema", e))?;
        let report = SchemaManager::new(schema).ensure_schema(&tx)?;
        tx.commit()
            .map_err(|e| LoadError::transaction("schema commit", e))?;
        Ok(report)
    }

    /// Replace the warehouse contents with a batch in one transaction, creating
    /// missing tables in the same transaction
    pub fn refresh(
        &mut self,
        schema: &WarehouseSchema,
        batch: &RefreshBatch,
    ) -> LoadResult<RefreshSummary> {
        RefreshCoordinator::new(schema).refresh(&mut self.connection, batch)
    }

    /// Number of rows in a table
    pub fn row_count(&self, table: &str) -> LoadResult<u64> {
        self.connection
            .query_row(
                &format!("SELECT COUNT(*) FROM {}", quote_identifier(table)),
                [],
                |row| row.get::<_, i64>(0),
            )
            .map(|n| n.max(0) as u64)
            .map_err(|e| LoadError::transaction(format!("count {}", table), e))
    }

    /// Row counts of every schema table that exists, in declaration order
    pub fn table_counts(&self, schema: &WarehouseSchema) -> LoadResult<Vec<(String, Option<u64>)>> {
        let mut counts = Vec::with_capacity(schema.tables().len());
        for table in schema.tables() {
            let exists = table_exists(&self.connection, table.name)
                .map_err(|e| LoadError::transaction("status", e))?;
            let count = if exists {
                Some(self.row_count(table.name)?)
            } else {
                None
            };
            counts.push((table.name.to_string(), count));
        }
        Ok(counts)
    }

    /// Run an SQL statement and collect its rows as JSON objects
    pub fn execute_query(&self, sql: &str) -> LoadResult<QueryResult> {
        let start = Instant::now();
        let mut stmt = self
            .connection
            .prepare(sql)
            .map_err(|e| LoadError::transaction("query (prepare)", e))?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let mut rows = Vec::new();
        let mut cursor = stmt
            .query([])
            .map_err(|e| LoadError::transaction("query", e))?;
        while let Some(row) = cursor
            .next()
            .map_err(|e| LoadError::transaction("query (fetch)", e))?
        {
            let mut object = serde_json::Map::new();
            for (i, name) in columns.iter().enumerate() {
                let value = row.get_ref(i).map(value_ref_to_json).unwrap_or(Value::Null);
                object.insert(name.clone(), value);
            }
            rows.push(Value::Object(object));
        }

        let mut result = QueryResult::new(columns, rows);
        result.execution_time_ms = start.elapsed().as_millis() as u64;
        debug!(
            "Query returned {} rows in {}ms",
            result.row_count(),
            result.execution_time_ms
        );
        Ok(result)
    }

    /// Check that the database answers a trivial query
    pub fn health_check(&self) -> bool {
        self.connection
            .query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }
}

impl Drop for SqliteWarehouse {
    fn drop(&mut self) {
        debug!("Warehouse connection released");
    }
}

fn value_ref_to_json(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(bytes) => Value::String(format!("<{} bytes>", bytes.len())),
    }
}
