//! Domain-level errors

use thiserror::Error;

/// Domain-level errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DomainError {
    #[error("Entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("Invalid sample: {0}")]
    InvalidSample(String),

    #[error("Trip {trip_id} is not active (status: {status})")]
    TripNotActive { trip_id: String, status: String },

    #[error("Unknown geofence geometry for geofence {geofence_id}")]
    UnknownGeometry { geofence_id: String },

    #[error("Invariant violated: {0}")]
    InvariantViolation(String),

    #[error("Invalid {entity} transition from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: String,
        to: String,
    },
}

impl DomainError {
    pub(crate) fn transition(entity: &'static str, from: impl ToString, to: impl ToString) -> Self {
        Self::InvalidTransition {
            entity,
            from: from.to_string(),
            to: to.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, DomainError>;
