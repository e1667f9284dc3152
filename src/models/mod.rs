//! Data models for the load pipeline
//!
//! - [`EntityType`]: the three warehouse entities
//! - [`Record`] / [`RecordSet`]: rows as field-name-to-value mappings

pub mod entity;
pub mod record;

pub use entity::EntityType;
pub use record::{Record, RecordSet, format_cell, parse_cell};
