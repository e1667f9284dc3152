//! Record sources
//!
//! A [`RecordSource`] yields the prepared record set of one entity. The loader only
//! depends on this trait, so tests and callers can swap the CSV reader for an
//! in-memory source.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

use crate::error::LoadError;
use crate::models::{EntityType, RecordSet};

pub mod csv_file;

pub use csv_file::{CsvRecordSource, read_delimited};

/// Failure to produce a record set
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SourceError {
    /// The dataset does not exist
    #[error("{entity} data not found at {location}")]
    NotFound { entity: EntityType, location: String },

    /// The dataset exists but cannot be read or parsed
    #[error("{entity} data at {location} is unreadable: {reason}")]
    Unreadable {
        entity: EntityType,
        location: String,
        reason: String,
    },
}

impl From<SourceError> for LoadError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::NotFound { entity, location } => LoadError::SourceUnavailable {
                entity,
                location,
                reason: "not found".to_string(),
            },
            SourceError::Unreadable {
                entity,
                location,
                reason,
            } => LoadError::SourceUnavailable {
                entity,
                location,
                reason,
            },
        }
    }
}

/// Supplies the prepared records of an entity
pub trait RecordSource {
    /// Load the full record set for `entity`
    fn load(&self, entity: EntityType) -> Result<RecordSet, SourceError>;

    /// Human-readable location of the entity's data, used in logs
    fn describe(&self, entity: EntityType) -> String {
        entity.logical_name().to_string()
    }
}

impl<T: RecordSource + ?Sized> RecordSource for &T {
    fn load(&self, entity: EntityType) -> Result<RecordSet, SourceError> {
        (**self).load(entity)
    }

    fn describe(&self, entity: EntityType) -> String {
        (**self).describe(entity)
    }
}

/// Record sets held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordSource {
    sets: BTreeMap<EntityType, RecordSet>,
}

impl InMemoryRecordSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) the record set for its entity
    pub fn with_set(mut self, set: RecordSet) -> Self {
        self.sets.insert(set.entity, set);
        self
    }

    pub fn insert(&mut self, set: RecordSet) {
        self.sets.insert(set.entity, set);
    }
}

impl RecordSource for InMemoryRecordSource {
    fn load(&self, entity: EntityType) -> Result<RecordSet, SourceError> {
        self.sets
            .get(&entity)
            .cloned()
            .ok_or_else(|| SourceError::NotFound {
                entity,
                location: format!("memory:{}", entity.logical_name()),
            })
    }

    fn describe(&self, entity: EntityType) -> String {
        format!("memory:{}", entity.logical_name())
    }
}

/// SHA-256 of content as lowercase hex
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}
