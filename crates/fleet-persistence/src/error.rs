//! Persistence layer error types

use thiserror::Error;

/// Persistence layer errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PersistenceError {
    #[error("Entity not found: {entity_type} with key {key}")]
    NotFound { entity_type: &'static str, key: String },

    #[error("Entity already exists: {entity_type} with key {key}")]
    AlreadyExists { entity_type: &'static str, key: String },

    #[error("Concurrent update on {entity_type} {key}: expected version {expected}, found {found}")]
    ConcurrentUpdateConflict {
        entity_type: &'static str,
        key: String,
        expected: u64,
        found: u64,
    },
}

impl PersistenceError {
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentUpdateConflict { .. })
    }
}

pub type Result<T> = std::result::Result<T, PersistenceError>;
