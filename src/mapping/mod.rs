//! Column mapping from source-system field names to warehouse columns

pub mod column_map;

pub use column_map::{ColumnMap, ColumnMapper, MappingConfig, is_snake_case};

use crate::error::LoadError;
use crate::models::EntityType;

/// Errors building or applying column maps
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MappingError {
    /// Some warehouse columns have no source field
    #[error("Mapping for {entity} has no source for column(s): {}", .missing.join(", "))]
    IncompleteMapping {
        entity: EntityType,
        missing: Vec<String>,
    },

    /// Destination is not a snake_case identifier
    #[error("Mapping for {entity} has invalid destination '{destination}'")]
    InvalidDestination {
        entity: EntityType,
        destination: String,
    },

    /// The same source field is listed twice
    #[error("Mapping for {entity} lists source '{field}' more than once")]
    DuplicateSource { entity: EntityType, field: String },

    /// Two source fields share one destination
    #[error("Mapping for {entity} sends {} to '{destination}'", .sources.join(" and "))]
    DuplicateDestination {
        entity: EntityType,
        destination: String,
        sources: Vec<String>,
    },

    /// Override keyed by a name that is not an entity
    #[error("Unknown entity in mapping overrides: {0}")]
    UnknownEntity(String),

    /// A map was supplied for the wrong entity
    #[error("Expected a mapping for {expected}, got one for {found}")]
    WrongEntity {
        expected: EntityType,
        found: EntityType,
    },

    /// The mapped header cannot be loaded into the table
    #[error("Mapped {entity} header does not fit the warehouse: {detail}")]
    SchemaMismatch { entity: EntityType, detail: String },
}

impl From<MappingError> for LoadError {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::SchemaMismatch { entity, detail } => LoadError::SchemaMismatch {
                table: entity.table_name().to_string(),
                detail,
            },
            other => LoadError::Config(other.to_string()),
        }
    }
}
