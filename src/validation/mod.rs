//! Validation of refresh batches
//!
//! Checks run before any row reaches the warehouse, so violations can name the table
//! and row instead of surfacing as a store constraint error.

pub mod integrity;

pub use integrity::{IntegrityReport, IntegrityValidator, KeyValue};
