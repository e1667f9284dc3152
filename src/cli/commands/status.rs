//! Status CLI command
//!
//! Shows the row count of every warehouse table and how many sales fail to resolve
//! their customer or product.

use std::path::PathBuf;

use serde_json::{Value, json};

use super::query::queries;
use super::{open_existing, parse_format, resolve_db_path};
use crate::cli::error::CliError;
use crate::warehouse::{OutputFormat, QueryResult, WarehouseSchema, format_query_result};

/// Status command arguments
#[derive(Debug, Clone)]
pub struct StatusArgs {
    pub project_dir: PathBuf,
    pub db: Option<PathBuf>,
    pub format: String,
}

/// Print table counts of the warehouse
pub fn handle_status(args: &StatusArgs) -> Result<QueryResult, CliError> {
    let format = parse_format(&args.format)?;
    let db_path = resolve_db_path(&args.project_dir, args.db.as_deref())?;
    let warehouse = open_existing(&db_path)?;
    let schema = WarehouseSchema::standard();

    let counts = warehouse.table_counts(&schema)?;
    let rows = counts
        .iter()
        .map(|(table, count)| {
            json!({
                "table": table,
                "rows": count.map(Value::from).unwrap_or(Value::Null),
            })
        })
        .collect();
    let result = QueryResult::new(vec!["table".to_string(), "rows".to_string()], rows);
    println!("{}", format_query_result(&result, format));

    if format != OutputFormat::Json {
        eprintln!(
            "\nBackend: {} ({})",
            warehouse.backend_type(),
            db_path.display()
        );
        if counts.iter().all(|(_, c)| c.is_some()) {
            let orphans = warehouse.execute_query(queries::ORPHAN_SALES)?;
            eprintln!("Unresolved sales: {}", orphans.row_count());
        }
    }

    Ok(result)
}
