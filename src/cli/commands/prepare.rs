//! Prepare CLI command
//!
//! Turns raw extracts into prepared extracts. The command line applies no cleaning
//! rules beyond exact-duplicate removal; library callers supply a `CleaningPolicy`.

use std::path::PathBuf;

use serde_json::json;

use crate::cli::error::CliError;
use crate::config::PipelineConfig;
use crate::prepare::{PreparationReport, Preparer};
use crate::warehouse::{OutputFormat, QueryResult, format_query_result};

/// Prepare command arguments
#[derive(Debug, Clone)]
pub struct PrepareArgs {
    pub project_dir: PathBuf,
    pub raw_dir: Option<PathBuf>,
    pub prepared_dir: Option<PathBuf>,
}

/// Prepare all three entities and print the per-stage counts
pub fn handle_prepare(args: &PrepareArgs) -> Result<Vec<PreparationReport>, CliError> {
    let config = PipelineConfig::load(&args.project_dir)?;
    let raw_dir = args
        .raw_dir
        .clone()
        .unwrap_or_else(|| config.raw_dir(&args.project_dir));
    let prepared_dir = args
        .prepared_dir
        .clone()
        .unwrap_or_else(|| config.prepared_dir(&args.project_dir));

    let reports = Preparer::new(raw_dir, prepared_dir)
        .with_delimiter(config.delimiter()?)
        .prepare_all()?;

    let columns = ["entity", "rows_read", "duplicates", "rows_written", "output"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    let rows = reports
        .iter()
        .map(|r| {
            json!({
                "entity": r.entity.logical_name(),
                "rows_read": r.rows_read,
                "duplicates": r.stages.first().map(|s| s.removed()).unwrap_or(0),
                "rows_written": r.rows_written,
                "output": r.output,
            })
        })
        .collect();
    println!(
        "{}",
        format_query_result(&QueryResult::new(columns, rows), OutputFormat::Table)
    );

    Ok(reports)
}
