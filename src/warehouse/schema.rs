//! Warehouse schema definitions and the schema manager
//!
//! The three tables are declared once as static [`TableDef`]s. The same definitions
//! drive `CREATE TABLE` generation, verification of an existing store, and the
//! parent/child ordering the refresh coordinator relies on.

use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use rusqlite::{Connection, Transaction};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::quote_identifier;
use crate::error::{LoadError, LoadResult};
use crate::models::EntityType;

/// A column declared by the loader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub sql_type: &'static str,
}

/// A foreign key from a column of one table to the key of another
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub column: &'static str,
    pub references_table: &'static str,
    pub references_column: &'static str,
}

/// Structure of one warehouse table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableDef {
    pub entity: EntityType,
    pub name: &'static str,
    /// Single-column integer primary key
    pub primary_key: &'static str,
    pub columns: &'static [ColumnDef],
    pub foreign_keys: &'static [ForeignKeyDef],
}

impl TableDef {
    /// Column names in declaration order
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    /// Check if the table declares a column
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// `CREATE TABLE IF NOT EXISTS` statement for this table
    pub fn create_sql(&self) -> String {
        let mut parts: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                if c.name == self.primary_key {
                    format!("    {} {} PRIMARY KEY", quote_identifier(c.name), c.sql_type)
                } else {
                    format!("    {} {}", quote_identifier(c.name), c.sql_type)
                }
            })
            .collect();
        for fk in self.foreign_keys {
            parts.push(format!(
                "    FOREIGN KEY ({}) REFERENCES {} ({})",
                quote_identifier(fk.column),
                quote_identifier(fk.references_table),
                quote_identifier(fk.references_column)
            ));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n);\n",
            quote_identifier(self.name),
            parts.join(",\n")
        )
    }
}

const fn col(name: &'static str, sql_type: &'static str) -> ColumnDef {
    ColumnDef { name, sql_type }
}

/// `customer` table
pub const CUSTOMER_TABLE: TableDef = TableDef {
    entity: EntityType::Customer,
    name: "customer",
    primary_key: "customer_id",
    columns: &[
        col("customer_id", "INTEGER"),
        col("name", "TEXT"),
        col("region", "TEXT"),
        col("join_date", "TEXT"),
        col("loyalty_points", "INTEGER"),
        col("preferred_contact_method", "TEXT"),
    ],
    foreign_keys: &[],
};

/// `product` table
pub const PRODUCT_TABLE: TableDef = TableDef {
    entity: EntityType::Product,
    name: "product",
    primary_key: "product_id",
    columns: &[
        col("product_id", "INTEGER"),
        col("product_name", "TEXT"),
        col("category", "TEXT"),
        col("unit_price", "NUMERIC"),
        col("stock_quantity", "INTEGER"),
        col("supplier", "TEXT"),
    ],
    foreign_keys: &[],
};

/// `sale` table
pub const SALE_TABLE: TableDef = TableDef {
    entity: EntityType::Sale,
    name: "sale",
    primary_key: "sale_id",
    columns: &[
        col("sale_id", "INTEGER"),
        col("customer_id", "INTEGER"),
        col("product_id", "INTEGER"),
        col("sale_amount", "REAL"),
        col("sale_date", "TEXT"),
        col("store_id", "INTEGER"),
        col("campaign_id", "INTEGER"),
        col("discount_percent", "NUMERIC"),
        col("state", "TEXT"),
    ],
    foreign_keys: &[
        ForeignKeyDef {
            column: "customer_id",
            references_table: "customer",
            references_column: "customer_id",
        },
        ForeignKeyDef {
            column: "product_id",
            references_table: "product",
            references_column: "product_id",
        },
    ],
};

/// The warehouse schema: the set of tables the loader owns
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarehouseSchema {
    tables: Vec<TableDef>,
}

impl Default for WarehouseSchema {
    fn default() -> Self {
        Self::standard()
    }
}

impl WarehouseSchema {
    /// customer, product and sale
    pub fn standard() -> Self {
        Self {
            tables: vec![CUSTOMER_TABLE, PRODUCT_TABLE, SALE_TABLE],
        }
    }

    /// Table definitions in declaration order
    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Definition of the table holding an entity
    pub fn table(&self, entity: EntityType) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.entity == entity)
    }

    /// Definition by table name
    pub fn table_by_name(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    /// SQL creating every table
    pub fn create_tables_sql(&self) -> String {
        self.tables
            .iter()
            .map(TableDef::create_sql)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Tables ordered so every referenced table precedes the tables referencing it.
    ///
    /// Among tables with no ordering constraint between them, declaration order is
    /// kept. This is the insertion order of a refresh; [`deletion_order`] is its
    /// reverse.
    ///
    /// [`deletion_order`]: WarehouseSchema::deletion_order
    pub fn insertion_order(&self) -> LoadResult<Vec<&TableDef>> {
        let mut graph = DiGraph::<usize, ()>::new();
        let nodes: Vec<NodeIndex> = (0..self.tables.len()).map(|i| graph.add_node(i)).collect();

        for (child, table) in self.tables.iter().enumerate() {
            for fk in table.foreign_keys {
                let parent = self
                    .tables
                    .iter()
                    .position(|t| t.name == fk.references_table)
                    .ok_or_else(|| {
                        LoadError::schema(
                            table.name,
                            format!(
                                "foreign key {} references undeclared table '{}'",
                                fk.column, fk.references_table
                            ),
                        )
                    })?;
                if parent != child {
                    graph.add_edge(nodes[parent], nodes[child], ());
                }
            }
        }

        let mut placed: Vec<NodeIndex> = Vec::with_capacity(nodes.len());
        while placed.len() < nodes.len() {
            let next = nodes.iter().copied().find(|n| {
                !placed.contains(n)
                    && graph
                        .neighbors_directed(*n, Direction::Incoming)
                        .all(|parent| placed.contains(&parent))
            });
            match next {
                Some(n) => placed.push(n),
                None => {
                    let stuck = nodes
                        .iter()
                        .find(|n| !placed.contains(n))
                        .map(|n| self.tables[graph[*n]].name)
                        .unwrap_or_default();
                    return Err(LoadError::schema(stuck, "foreign keys form a cycle"));
                }
            }
        }

        Ok(placed.into_iter().map(|n| &self.tables[graph[n]]).collect())
    }

    /// Tables ordered children first
    pub fn deletion_order(&self) -> LoadResult<Vec<&TableDef>> {
        let mut order = self.insertion_order()?;
        order.reverse();
        Ok(order)
    }
}

/// Outcome of [`SchemaManager::ensure_schema`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaReport {
    /// Tables that did not exist and were created
    pub created: Vec<String>,
    /// Tables that existed and matched
    pub verified: Vec<String>,
}

impl SchemaReport {
    /// True when nothing had to be created
    pub fn is_noop(&self) -> bool {
        self.created.is_empty()
    }
}

/// A column as found in the store
#[derive(Debug, Clone)]
struct ExistingColumn {
    name: String,
    sql_type: String,
    pk: i64,
}

/// A foreign key as found in the store
#[derive(Debug, Clone)]
struct ExistingForeignKey {
    table: String,
    from: String,
    to: Option<String>,
}

/// Creates missing tables and verifies existing ones
pub struct SchemaManager<'a> {
    schema: &'a WarehouseSchema,
}

impl<'a> SchemaManager<'a> {
    /// Create a schema manager for the given schema
    pub fn new(schema: &'a WarehouseSchema) -> Self {
        Self { schema }
    }

    /// Create absent tables and verify present ones inside the caller's transaction.
    ///
    /// Idempotent: against a matching store nothing changes. An existing table that
    /// lacks a column the loader writes, has a different primary key, or is missing a
    /// declared foreign key is a [`LoadError::SchemaMismatch`]; nothing is dropped or
    /// altered. Nothing is committed here, so rolling `tx` back also removes the tables
    /// created by this call.
    pub fn ensure_schema(&self, tx: &Transaction<'_>) -> LoadResult<SchemaReport> {
        let mut report = SchemaReport::default();
        let mut missing = Vec::new();

        for table in self.schema.tables() {
            if table_exists(tx, table.name).map_err(|e| LoadError::transaction("schema", e))? {
                verify_table(tx, table)?;
                debug!("Verified existing table {}", table.name);
                report.verified.push(table.name.to_string());
            } else {
                missing.push(table);
            }
        }

        for table in missing {
            tx.execute_batch(&table.create_sql()).map_err(|e| {
                LoadError::transaction(format!("schema (create {})", table.name), e)
            })?;
            info!("Created table {}", table.name);
            report.created.push(table.name.to_string());
        }

        Ok(report)
    }
}

/// Table lookup by name; SQLite table names are case-insensitive
pub(crate) fn table_exists(conn: &Connection, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
        [name],
        |row| row.get::<_, i64>(0),
    )
    .map(|count| count > 0)
}

fn existing_columns(conn: &Connection, table: &str) -> rusqlite::Result<Vec<ExistingColumn>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_identifier(table)))?;
    let rows = stmt.query_map([], |row| {
        Ok(ExistingColumn {
            name: row.get(1)?,
            sql_type: row.get::<_, Option<String>>(2)?.unwrap_or_default(),
            pk: row.get(5)?,
        })
    })?;
    rows.collect()
}

fn existing_foreign_keys(
    conn: &Connection,
    table: &str,
) -> rusqlite::Result<Vec<ExistingForeignKey>> {
    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_list({})",
        quote_identifier(table)
    ))?;
    let rows = stmt.query_map([], |row| {
        Ok(ExistingForeignKey {
            table: row.get(2)?,
            from: row.get(3)?,
            to: row.get(4)?,
        })
    })?;
    rows.collect()
}

fn verify_table(conn: &Connection, table: &TableDef) -> LoadResult<()> {
    let columns =
        existing_columns(conn, table.name).map_err(|e| LoadError::transaction("schema", e))?;

    let missing: Vec<&str> = table
        .columns
        .iter()
        .filter(|c| !columns.iter().any(|e| e.name.eq_ignore_ascii_case(c.name)))
        .map(|c| c.name)
        .collect();
    if !missing.is_empty() {
        return Err(LoadError::schema(
            table.name,
            format!("missing column(s): {}", missing.join(", ")),
        ));
    }

    let key_columns: Vec<&ExistingColumn> = columns.iter().filter(|c| c.pk > 0).collect();
    match key_columns.as_slice() {
        [key] if key.name.eq_ignore_ascii_case(table.primary_key) => {
            if !key.sql_type.to_uppercase().contains("INT") {
                return Err(LoadError::schema(
                    table.name,
                    format!(
                        "primary key {} has type '{}', expected an integer type",
                        key.name, key.sql_type
                    ),
                ));
            }
        }
        [] => {
            return Err(LoadError::schema(
                table.name,
                format!("no primary key, expected {}", table.primary_key),
            ));
        }
        other => {
            let names: Vec<&str> = other.iter().map(|c| c.name.as_str()).collect();
            return Err(LoadError::schema(
                table.name,
                format!(
                    "primary key is ({}), expected ({})",
                    names.join(", "),
                    table.primary_key
                ),
            ));
        }
    }

    if !table.foreign_keys.is_empty() {
        let existing = existing_foreign_keys(conn, table.name)
            .map_err(|e| LoadError::transaction("schema", e))?;
        for fk in table.foreign_keys {
            let found = existing.iter().any(|e| {
                e.from.eq_ignore_ascii_case(fk.column)
                    && e.table.eq_ignore_ascii_case(fk.references_table)
                    && e
                        .to
                        .as_deref()
                        .is_none_or(|to| to.eq_ignore_ascii_case(fk.references_column))
            });
            if !found {
                return Err(LoadError::schema(
                    table.name,
                    format!(
                        "missing foreign key {} -> {}.{}",
                        fk.column, fk.references_table, fk.references_column
                    ),
                ));
            }
        }
    }

    Ok(())
}
