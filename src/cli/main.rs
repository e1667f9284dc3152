//! CLI binary entry point for sales-warehouse

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};
#[cfg(feature = "cli")]
use sales_warehouse::cli::commands::init_config::{InitConfigArgs, handle_init_config};
#[cfg(feature = "cli")]
use sales_warehouse::cli::commands::load::{LoadArgs, handle_load};
#[cfg(feature = "cli")]
use sales_warehouse::cli::commands::prepare::{PrepareArgs, handle_prepare};
#[cfg(feature = "cli")]
use sales_warehouse::cli::commands::query::{QueryArgs, handle_query};
#[cfg(feature = "cli")]
use sales_warehouse::cli::commands::status::{StatusArgs, handle_status};
#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "sales-warehouse")]
#[command(about = "Full-refresh loader for the customer, product and sales warehouse")]
#[command(version)]
struct Cli {
    /// Log at debug level (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand)]
enum Commands {
    /// Replace the warehouse contents with the prepared extracts
    Load {
        /// Project directory holding .sales-warehouse.toml
        #[arg(short = 'C', long = "config", default_value = ".")]
        project_dir: PathBuf,
        /// Warehouse file (defaults to the configured path)
        #[arg(long)]
        db: Option<PathBuf>,
        /// Directory of prepared extracts (defaults to the configured path)
        #[arg(long)]
        prepared_dir: Option<PathBuf>,
        /// Print the load report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Produce prepared extracts from the raw extracts
    Prepare {
        #[arg(short = 'C', long = "config", default_value = ".")]
        project_dir: PathBuf,
        /// Directory of raw extracts
        #[arg(long)]
        raw_dir: Option<PathBuf>,
        /// Directory to write prepared extracts into
        #[arg(long)]
        prepared_dir: Option<PathBuf>,
    },
    /// Show row counts of the warehouse tables
    Status {
        #[arg(short = 'C', long = "config", default_value = ".")]
        project_dir: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Run SQL against the warehouse
    Query {
        /// SQL to execute
        sql: String,
        #[arg(short = 'C', long = "config", default_value = ".")]
        project_dir: PathBuf,
        #[arg(long)]
        db: Option<PathBuf>,
        /// Output format: table, json, csv
        #[arg(short, long, default_value = "table")]
        format: String,
    },
    /// Write a sample .sales-warehouse.toml
    InitConfig {
        /// Directory to write the file into
        #[arg(default_value = ".")]
        dir: PathBuf,
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

#[cfg(feature = "cli")]
fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Load {
            project_dir,
            db,
            prepared_dir,
            json,
        } => handle_load(&LoadArgs {
            project_dir,
            db,
            prepared_dir,
            json,
        })
        .map(|_| ()),
        Commands::Prepare {
            project_dir,
            raw_dir,
            prepared_dir,
        } => handle_prepare(&PrepareArgs {
            project_dir,
            raw_dir,
            prepared_dir,
        })
        .map(|_| ()),
        Commands::Status {
            project_dir,
            db,
            format,
        } => handle_status(&StatusArgs {
            project_dir,
            db,
            format,
        })
        .map(|_| ()),
        Commands::Query {
            sql,
            project_dir,
            db,
            format,
        } => handle_query(&QueryArgs {
            sql,
            project_dir,
            db,
            format,
        })
        .map(|_| ()),
        Commands::InitConfig { dir, force } => {
            handle_init_config(&InitConfigArgs { dir, force }).map(|_| ())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
