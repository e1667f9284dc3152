//! SQL query CLI command
//!
//! Executes an ad-hoc SQL statement against the warehouse.

use std::path::PathBuf;

use super::{open_existing, parse_format, resolve_db_path};
use crate::cli::error::CliError;
use crate::warehouse::{OutputFormat, QueryResult, format_query_result};

/// Query command arguments
#[derive(Debug, Clone)]
pub struct QueryArgs {
    /// SQL to execute
    pub sql: String,
    pub project_dir: PathBuf,
    pub db: Option<PathBuf>,
    /// Output format
    pub format: String,
}

/// Execute a SQL query against the warehouse and print the rows
pub fn handle_query(args: &QueryArgs) -> Result<QueryResult, CliError> {
    let format = parse_format(&args.format)?;
    let db_path = resolve_db_path(&args.project_dir, args.db.as_deref())?;
    let warehouse = open_existing(&db_path)?;

    let result = warehouse.execute_query(&args.sql)?;
    println!("{}", format_query_result(&result, format));

    if format != OutputFormat::Json {
        eprintln!("\nExecution time: {}ms", result.execution_time_ms);
    }

    Ok(result)
}

/// Canned warehouse queries
pub mod queries {
    /// Row count per table
    pub const TABLE_COUNTS: &str = r#"
SELECT 'customer' AS "table", COUNT(*) AS "rows" FROM customer
UNION ALL SELECT 'product', COUNT(*) FROM product
UNION ALL SELECT 'sale', COUNT(*) FROM sale
"#;

    /// Sales whose customer or product is not in the warehouse
    pub const ORPHAN_SALES: &str = r#"
SELECT s.sale_id, s.customer_id, s.product_id
FROM sale s
LEFT JOIN customer c ON c.customer_id = s.customer_id
LEFT JOIN product p ON p.product_id = s.product_id
WHERE c.customer_id IS NULL OR p.product_id IS NULL
ORDER BY s.sale_id
"#;

    /// Revenue per customer region
    pub const SALES_BY_REGION: &str = r#"
SELECT c.region, COUNT(*) AS sales, ROUND(SUM(s.sale_amount), 2) AS revenue
FROM sale s
JOIN customer c ON c.customer_id = s.customer_id
GROUP BY c.region
ORDER BY revenue DESC
"#;

    /// Best-selling products by revenue
    pub fn top_products(limit: usize) -> String {
        format!(
            r#"
SELECT p.product_name, p.category, COUNT(*) AS sales, ROUND(SUM(s.sale_amount), 2) AS revenue
FROM sale s
JOIN product p ON p.product_id = s.product_id
GROUP BY p.product_id, p.product_name, p.category
ORDER BY revenue DESC
LIMIT {}
"#,
            limit.max(1)
        )
    }

    /// Sales of one customer
    pub fn sales_for_customer(customer_id: i64) -> String {
        format!(
            "SELECT sale_id, sale_date, product_id, sale_amount FROM sale WHERE customer_id = {} ORDER BY sale_date",
            customer_id
        )
    }
}
