//! Load CLI command
//!
//! Runs a full refresh of the warehouse from the prepared extracts.

use std::path::{Path, PathBuf};

use serde_json::json;

use crate::cli::error::CliError;
use crate::config::PipelineConfig;
use crate::loader::{LoadReport, Loader};
use crate::warehouse::{OutputFormat, QueryResult, format_query_result};

/// Load command arguments
#[derive(Debug, Clone)]
pub struct LoadArgs {
    /// Directory holding `.sales-warehouse.toml`; relative paths resolve against it
    pub project_dir: PathBuf,
    /// Warehouse file override
    pub db: Option<PathBuf>,
    /// Prepared-data directory override
    pub prepared_dir: Option<PathBuf>,
    /// Print the report as JSON
    pub json: bool,
}

/// Run the loader and print its report
pub fn handle_load(args: &LoadArgs) -> Result<LoadReport, CliError> {
    let mut config = PipelineConfig::load(&args.project_dir)?;
    if let Some(db) = &args.db {
        config.warehouse.path = cli_path(db)?;
    }
    if let Some(dir) = &args.prepared_dir {
        config.source.prepared_dir = cli_path(dir)?;
    }

    let report = Loader::from_config(&config, &args.project_dir)?.run()?;

    if args.json {
        let output = serde_json::to_string_pretty(&report)
            .map_err(|e| CliError::Serialization(e.to_string()))?;
        println!("{}", output);
    } else {
        println!("{}", format_query_result(&report_table(&report), OutputFormat::Table));
        eprintln!(
            "\nLoaded {} rows into {} in {}ms (run {})",
            report.total_rows(),
            report.warehouse,
            report.duration_ms,
            report.run_id
        );
    }

    Ok(report)
}

/// Command-line paths are relative to the working directory, not the project
fn cli_path(path: &Path) -> Result<String, CliError> {
    std::path::absolute(path)
        .map(|p| p.display().to_string())
        .map_err(|e| CliError::InvalidArgument(format!("{}: {}", path.display(), e)))
}

fn report_table(report: &LoadReport) -> QueryResult {
    let columns = ["table", "rows_loaded", "rows_replaced", "fingerprint"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows = report
        .tables
        .iter()
        .map(|t| {
            json!({
                "table": t.table,
                "rows_loaded": t.rows_loaded,
                "rows_replaced": t.rows_replaced,
                "fingerprint": t.fingerprint.as_deref().map(|f| &f[..f.len().min(12)]),
            })
        })
        .collect();
    QueryResult::new(columns, rows)
}
