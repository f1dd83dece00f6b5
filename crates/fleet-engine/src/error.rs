//! # Engine Error Types
//!
//! Unified error handling for the processing services.

use thiserror::Error;
use uuid::Uuid;

use fleet_domain::DomainError;
use fleet_persistence::PersistenceError;

/// Engine-level errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Vehicle {0} is not registered with the pipeline")]
    UnknownVehicle(Uuid),

    #[error("GPS tracking is disabled for vehicle {0}")]
    TrackingDisabled(Uuid),

    #[error("Worker for vehicle {0} is not running")]
    WorkerUnavailable(Uuid),
}

impl EngineError {
    pub(crate) fn not_found(entity_type: &str, id: Uuid) -> Self {
        Self::Domain(DomainError::NotFound {
            entity_type: entity_type.to_string(),
            id: id.to_string(),
        })
    }

    /// Whether the failure was a lost compare-and-swap race.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Persistence(e) if e.is_conflict())
    }

    /// Stable machine-readable code
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Domain(e) => match e {
                DomainError::NotFound { .. } => "NOT_FOUND",
                DomainError::InvalidSample(_) => "INVALID_SAMPLE",
                DomainError::TripNotActive { .. } => "TRIP_NOT_ACTIVE",
                DomainError::UnknownGeometry { .. } => "UNKNOWN_GEOMETRY",
                DomainError::InvariantViolation(_) => "INVARIANT_VIOLATION",
                DomainError::InvalidTransition { .. } => "INVALID_TRANSITION",
            },
            Self::Persistence(e) => match e {
                PersistenceError::NotFound { .. } => "NOT_FOUND",
                PersistenceError::AlreadyExists { .. } => "ALREADY_EXISTS",
                PersistenceError::ConcurrentUpdateConflict { .. } => "CONCURRENT_UPDATE_CONFLICT",
            },
            Self::UnknownVehicle(_) => "UNKNOWN_VEHICLE",
            Self::TrackingDisabled(_) => "TRACKING_DISABLED",
            Self::WorkerUnavailable(_) => "WORKER_UNAVAILABLE",
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err: EngineError = DomainError::InvalidSample("speed 400".into()).into();
        assert_eq!(err.error_code(), "INVALID_SAMPLE");

        let conflict: EngineError = PersistenceError::ConcurrentUpdateConflict {
            entity_type: "invoice",
            key: "x".into(),
            expected: 1,
            found: 2,
        }
        .into();
        assert!(conflict.is_conflict());
        assert_eq!(conflict.error_code(), "CONCURRENT_UPDATE_CONFLICT");

        assert_eq!(EngineError::UnknownVehicle(Uuid::nil()).error_code(), "UNKNOWN_VEHICLE");
    }
}
