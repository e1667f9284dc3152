//! Full-refresh transaction coordinator
//!
//! A refresh replaces the contents of every warehouse table with a new batch inside
//! one explicit transaction:
//!
//! 1. delete all rows, children before parents (`sale`, `product`, `customer`)
//! 2. insert all rows, parents before children (`customer`, `product`, `sale`)
//! 3. commit
//!
//! Both orders come from the foreign-key graph of the [`WarehouseSchema`]
//! ([`WarehouseSchema::insertion_order`] and its reverse), so the store's own
//! foreign-key checks never fire on a correct batch. Any failure rolls the whole
//! transaction back and the warehouse keeps its previous contents. There is no
//! per-row skipping: one bad row fails the batch.

use std::collections::BTreeMap;

use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, Transaction, params_from_iter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::quote_identifier;
use super::schema::{SchemaManager, SchemaReport, TableDef, WarehouseSchema};
use crate::error::{LoadError, LoadResult};
use crate::models::{EntityType, Record, RecordSet};
use crate::validation::integrity::{IntegrityReport, IntegrityValidator};

/// The record sets of one refresh, already in warehouse naming
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshBatch {
    sets: BTreeMap<EntityType, RecordSet>,
}

impl RefreshBatch {
    /// Build a batch from the three mapped record sets
    pub fn new(customers: RecordSet, products: RecordSet, sales: RecordSet) -> Self {
        let mut sets = BTreeMap::new();
        sets.insert(EntityType::Customer, customers);
        sets.insert(EntityType::Product, products);
        sets.insert(EntityType::Sale, sales);
        Self { sets }
    }

    /// Record set for an entity
    pub fn record_set(&self, entity: EntityType) -> Option<&RecordSet> {
        self.sets.get(&entity)
    }

    /// Rows for an entity (empty when absent)
    pub fn rows(&self, entity: EntityType) -> &[Record] {
        self.sets
            .get(&entity)
            .map(|s| s.rows.as_slice())
            .unwrap_or(&[])
    }

    /// Number of rows for an entity
    pub fn row_count(&self, entity: EntityType) -> usize {
        self.rows(entity).len()
    }
}

/// Rows removed and written for one table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRefresh {
    pub table: String,
    pub rows_deleted: usize,
    pub rows_inserted: usize,
}

/// Outcome of a committed refresh
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshSummary {
    /// Tables created or verified in the same transaction
    pub schema: SchemaReport,
    /// Per-table counts in insertion order
    pub tables: Vec<TableRefresh>,
}

impl RefreshSummary {
    /// Rows inserted into a table
    pub fn inserted(&self, table: &str) -> Option<usize> {
        self.tables
            .iter()
            .find(|t| t.table == table)
            .map(|t| t.rows_inserted)
    }

    /// Total rows inserted
    pub fn total_inserted(&self) -> usize {
        self.tables.iter().map(|t| t.rows_inserted).sum()
    }
}

/// Runs delete-then-insert for all tables as one atomic unit
pub struct RefreshCoordinator<'a> {
    schema: &'a WarehouseSchema,
}

impl<'a> RefreshCoordinator<'a> {
    /// Create a coordinator for the given schema
    pub fn new(schema: &'a WarehouseSchema) -> Self {
        Self { schema }
    }

    /// Check a batch without touching the store: columns known to each table, keys
    /// present and unique, foreign keys resolvable within the batch.
    pub fn check(&self, batch: &RefreshBatch) -> LoadResult<IntegrityReport> {
        for table in self.schema.insertion_order()? {
            check_columns(table, batch)?;
        }
        let integrity = IntegrityValidator::new(self.schema).validate(batch)?;
        debug!(
            "Batch validated: {} keys, {} references",
            integrity.rows_checked, integrity.references_checked
        );
        Ok(integrity)
    }

    /// Replace the warehouse contents with `batch`.
    ///
    /// The batch is checked first. Only then is the transaction opened; missing tables
    /// are created inside it, so on any error the rollback leaves the store exactly as
    /// it was, tables included.
    pub fn refresh(
        &self,
        conn: &mut Connection,
        batch: &RefreshBatch,
    ) -> LoadResult<RefreshSummary> {
        let insert_order = self.schema.insertion_order()?;
        let delete_order = self.schema.deletion_order()?;
        self.check(batch)?;

        let tx = conn
            .transaction()
            .map_err(|e| LoadError::transaction("begin", e))?;

        let result = SchemaManager::new(self.schema)
            .ensure_schema(&tx)
            .and_then(|schema| {
                let mut summary = apply(&tx, &delete_order, &insert_order, batch)?;
                summary.schema = schema;
                Ok(summary)
            });

        match result {
            Ok(summary) => {
                tx.commit()
                    .map_err(|e| LoadError::transaction("commit", e))?;
                info!(
                    "Refresh committed: {} rows across {} tables",
                    summary.total_inserted(),
                    summary.tables.len()
                );
                Ok(summary)
            }
            Err(err) => {
                match tx.rollback() {
                    Ok(()) => warn!("Refresh rolled back: {}", err),
                    Err(rb) => warn!("Refresh failed ({}) and rollback reported: {}", err, rb),
                }
                Err(err)
            }
        }
    }
}

fn check_columns(table: &TableDef, batch: &RefreshBatch) -> LoadResult<()> {
    let Some(set) = batch.record_set(table.entity) else {
        return Err(LoadError::schema(table.name, "no record set supplied"));
    };
    if let Some(unknown) = set.columns.iter().find(|c| !table.has_column(c)) {
        return Err(LoadError::schema(
            table.name,
            format!("column '{}' does not exist in the warehouse table", unknown),
        ));
    }
    if set.columns.is_empty() && !set.rows.is_empty() {
        return Err(LoadError::schema(table.name, "rows supplied without columns"));
    }
    Ok(())
}

fn apply(
    tx: &Transaction<'_>,
    delete_order: &[&TableDef],
    insert_order: &[&TableDef],
    batch: &RefreshBatch,
) -> LoadResult<RefreshSummary> {
    let mut deleted: BTreeMap<&str, usize> = BTreeMap::new();
    for table in delete_order {
        let count = tx
            .execute(&format!("DELETE FROM {}", quote_identifier(table.name)), [])
            .map_err(|e| store_error(table.name, None, format!("delete from {}", table.name), e))?;
        debug!("Deleted {} rows from {}", count, table.name);
        deleted.insert(table.name, count);
    }

    let mut summary = RefreshSummary::default();
    for table in insert_order {
        let inserted = match batch.record_set(table.entity) {
            Some(set) if !set.rows.is_empty() => insert_rows(tx, table, set)?,
            _ => 0,
        };
        debug!("Inserted {} rows into {}", inserted, table.name);
        summary.tables.push(TableRefresh {
            table: table.name.to_string(),
            rows_deleted: deleted.get(table.name).copied().unwrap_or(0),
            rows_inserted: inserted,
        });
    }

    Ok(summary)
}

fn insert_rows(tx: &Transaction<'_>, table: &TableDef, set: &RecordSet) -> LoadResult<usize> {
    let column_list = set
        .columns
        .iter()
        .map(|c| quote_identifier(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=set.columns.len())
        .map(|i| format!("?{}", i))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        quote_identifier(table.name),
        column_list,
        placeholders
    );

    let mut stmt = tx
        .prepare(&sql)
        .map_err(|e| store_error(table.name, None, format!("prepare insert into {}", table.name), e))?;

    for (idx, row) in set.rows.iter().enumerate() {
        let values: Vec<SqlValue> = set
            .columns
            .iter()
            .map(|c| to_sql_value(row.get(c.as_str()).unwrap_or(&Value::Null)))
            .collect();
        stmt.execute(params_from_iter(values.iter())).map_err(|e| {
            store_error(
                table.name,
                Some(idx),
                format!("insert into {} (row {})", table.name, idx),
                e,
            )
        })?;
    }

    Ok(set.rows.len())
}

/// Constraint failures from the store are integrity violations; everything else is a
/// transaction failure.
fn store_error(table: &str, row: Option<usize>, stage: String, err: rusqlite::Error) -> LoadError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
            LoadError::integrity(table, row, err.to_string())
        }
        _ => LoadError::transaction(stage, err),
    }
}

/// Convert a record value to an SQLite value
pub fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                SqlValue::Text(n.to_string())
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        other => SqlValue::Text(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::schema::SchemaManager;
    use serde_json::json;

    fn set(entity: EntityType, rows: Value) -> RecordSet {
        let rows = rows
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r.as_object().cloned().unwrap())
            .collect();
        RecordSet::from_rows(entity, rows)
    }

    fn setup() -> (Connection, WarehouseSchema) {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        let schema = WarehouseSchema::standard();
        let tx = conn.transaction().unwrap();
        SchemaManager::new(&schema).ensure_schema(&tx).unwrap();
        tx.commit().unwrap();
        (conn, schema)
    }

    fn count(conn: &Connection, table: &str) -> i64 {
        conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |r| r.get(0))
            .unwrap()
    }

    fn good_batch() -> RefreshBatch {
        RefreshBatch::new(
            set(
                EntityType::Customer,
                json!([{"customer_id": 1, "name": "Ada", "region": "East"}]),
            ),
            set(
                EntityType::Product,
                json!([{"product_id": 10, "product_name": "Laptop", "unit_price": 799.99}]),
            ),
            set(
                EntityType::Sale,
                json!([{"sale_id": 100, "customer_id": 1, "product_id": 10, "sale_amount": 799.99}]),
            ),
        )
    }

    #[test]
    fn test_refresh_inserts_batch() {
        let (mut conn, schema) = setup();
        let summary = RefreshCoordinator::new(&schema)
            .refresh(&mut conn, &good_batch())
            .unwrap();

        assert_eq!(summary.inserted("customer"), Some(1));
        assert_eq!(summary.inserted("sale"), Some(1));
        assert_eq!(summary.total_inserted(), 3);
        assert_eq!(count(&conn, "customer"), 1);
        assert_eq!(count(&conn, "product"), 1);
        assert_eq!(count(&conn, "sale"), 1);
    }

    #[test]
    fn test_refresh_replaces_previous_contents() {
        let (mut conn, schema) = setup();
        let coordinator = RefreshCoordinator::new(&schema);
        coordinator.refresh(&mut conn, &good_batch()).unwrap();

        let next = RefreshBatch::new(
            set(EntityType::Customer, json!([{"customer_id": 2}, {"customer_id": 3}])),
            set(EntityType::Product, json!([{"product_id": 20}])),
            set(EntityType::Sale, json!([])),
        );
        let summary = coordinator.refresh(&mut conn, &next).unwrap();

        let customer = &summary.tables[0];
        assert_eq!(customer.table, "customer");
        assert_eq!(customer.rows_deleted, 1);
        assert_eq!(customer.rows_inserted, 2);
        assert_eq!(count(&conn, "customer"), 2);
        assert_eq!(count(&conn, "sale"), 0);
    }

    #[test]
    fn test_refresh_same_keys_twice() {
        let (mut conn, schema) = setup();
        let coordinator = RefreshCoordinator::new(&schema);
        coordinator.refresh(&mut conn, &good_batch()).unwrap();
        coordinator.refresh(&mut conn, &good_batch()).unwrap();
        assert_eq!(count(&conn, "customer"), 1);
        assert_eq!(count(&conn, "sale"), 1);
    }

    #[test]
    fn test_dangling_reference_leaves_store_unchanged() {
        let (mut conn, schema) = setup();
        let coordinator = RefreshCoordinator::new(&schema);
        coordinator.refresh(&mut conn, &good_batch()).unwrap();

        let bad = RefreshBatch::new(
            set(EntityType::Customer, json!([{"customer_id": 5}])),
            set(EntityType::Product, json!([{"product_id": 50}])),
            set(
                EntityType::Sale,
                json!([{"sale_id": 500, "customer_id": 6, "product_id": 50}]),
            ),
        );
        let err = coordinator.refresh(&mut conn, &bad).unwrap_err();
        assert!(matches!(err, LoadError::IntegrityViolation { .. }));

        let name: String = conn
            .query_row("SELECT name FROM customer WHERE customer_id = 1", [], |r| r.get(0))
            .unwrap();
        assert_eq!(name, "Ada");
        assert_eq!(count(&conn, "customer"), 1);
    }

    #[test]
    fn test_store_failure_mid_transaction_rolls_back() {
        let (mut conn, schema) = setup();
        let coordinator = RefreshCoordinator::new(&schema);
        coordinator.refresh(&mut conn, &good_batch()).unwrap();

        // A trigger rejects sale inserts, so the failure happens after the deletes
        // and the parent inserts have already run inside the transaction.
        conn.execute_batch(
            "CREATE TRIGGER reject_sales BEFORE INSERT ON sale \
             BEGIN SELECT RAISE(ABORT, 'sales are frozen'); END;",
        )
        .unwrap();

        let err = coordinator.refresh(&mut conn, &good_batch()).unwrap_err();
        match err {
            LoadError::IntegrityViolation { table, row, .. } => {
                assert_eq!(table, "sale");
                assert_eq!(row, Some(0));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(count(&conn, "customer"), 1);
        assert_eq!(count(&conn, "product"), 1);
        assert_eq!(count(&conn, "sale"), 1);
    }

    #[test]
    fn test_unknown_column_is_schema_mismatch() {
        let (mut conn, schema) = setup();
        let batch = RefreshBatch::new(
            set(
                EntityType::Customer,
                json!([{"customer_id": 1, "customer_segment": "Gold"}]),
            ),
            set(EntityType::Product, json!([])),
            set(EntityType::Sale, json!([])),
        );
        let err = RefreshCoordinator::new(&schema)
            .refresh(&mut conn, &batch)
            .unwrap_err();
        match err {
            LoadError::SchemaMismatch { table, detail } => {
                assert_eq!(table, "customer");
                assert!(detail.contains("customer_segment"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_to_sql_value() {
        assert_eq!(to_sql_value(&json!(null)), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(3)), SqlValue::Integer(3));
        assert_eq!(to_sql_value(&json!(2.5)), SqlValue::Real(2.5));
        assert_eq!(to_sql_value(&json!("x")), SqlValue::Text("x".to_string()));
        assert_eq!(to_sql_value(&json!(true)), SqlValue::Integer(1));
    }

    #[test]
    fn test_first_refresh_creates_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let schema = WarehouseSchema::standard();
        let summary = RefreshCoordinator::new(&schema)
            .refresh(&mut conn, &good_batch())
            .unwrap();
        assert_eq!(summary.schema.created, vec!["customer", "product", "sale"]);
        assert_eq!(count(&conn, "sale"), 1);

        let again = RefreshCoordinator::new(&schema)
            .refresh(&mut conn, &good_batch())
            .unwrap();
        assert!(again.schema.is_noop());
    }

    #[test]
    fn test_rejected_batch_creates_no_tables() {
        let mut conn = Connection::open_in_memory().unwrap();
        let schema = WarehouseSchema::standard();
        let dangling = RefreshBatch::new(
            set(EntityType::Customer, json!([{"customer_id": 1}])),
            set(EntityType::Product, json!([{"product_id": 10}])),
            set(
                EntityType::Sale,
                json!([{"sale_id": 100, "customer_id": 9, "product_id": 10}]),
            ),
        );

        let err = RefreshCoordinator::new(&schema)
            .refresh(&mut conn, &dangling)
            .unwrap_err();
        assert!(matches!(err, LoadError::IntegrityViolation { .. }));
        assert!(user_tables(&conn).is_empty());
    }

    #[test]
    fn test_rollback_drops_tables_created_by_the_run() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        // Only `sale` exists; its inserts fail after customer and product were
        // created and filled inside the transaction.
        conn.execute_batch(
            r#"
            CREATE TABLE sale (
                sale_id INTEGER PRIMARY KEY, customer_id INTEGER, product_id INTEGER,
                sale_amount REAL, sale_date TEXT, store_id INTEGER, campaign_id INTEGER,
                discount_percent NUMERIC, state TEXT,
                FOREIGN KEY (customer_id) REFERENCES customer (customer_id),
                FOREIGN KEY (product_id) REFERENCES product (product_id)
            );
            CREATE TRIGGER reject_sales BEFORE INSERT ON sale
            BEGIN SELECT RAISE(ABORT, 'sales are frozen'); END;
            "#,
        )
        .unwrap();
        let schema = WarehouseSchema::standard();

        assert!(
            RefreshCoordinator::new(&schema)
                .refresh(&mut conn, &good_batch())
                .is_err()
        );
        assert_eq!(user_tables(&conn), vec!["sale"]);
    }

    fn user_tables(conn: &Connection) -> Vec<String> {
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }
}
