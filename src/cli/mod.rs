//! Command-line interface support for the `sales-warehouse` binary

pub mod commands;
pub mod error;

pub use error::CliError;
