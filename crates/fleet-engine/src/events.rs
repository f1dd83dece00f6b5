//! Outbound event stream.
//!
//! Everything the engine wants collaborators to see (behavior events,
//! geofence alerts, trip lifecycle, score changes, invoice settlement) goes
//! through one `tokio::sync::broadcast` channel. Publishing never blocks and
//! never fails the caller; lagging subscribers lose the oldest events.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use fleet_domain::{DriverEvent, Grade, Trip};

use crate::geofence::GeofenceTransition;

/// Event published by the engine
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum FleetEvent {
    Behavior(DriverEvent),
    Geofence(GeofenceTransition),
    TripStarted {
        trip_id: Uuid,
        vehicle_id: Uuid,
        driver_id: Option<Uuid>,
        at: DateTime<Utc>,
    },
    TripCompleted(Box<Trip>),
    TripCancelled {
        trip_id: Uuid,
        vehicle_id: Uuid,
        at: DateTime<Utc>,
    },
    ScoreUpdated {
        driver_id: Uuid,
        safety_score: f64,
        overall_score: f64,
        grade: Grade,
    },
    InvoicePaid {
        invoice_id: Uuid,
        company_id: Uuid,
        at: DateTime<Utc>,
    },
}

impl FleetEvent {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Behavior(_) => "behavior",
            Self::Geofence(_) => "geofence",
            Self::TripStarted { .. } => "trip_started",
            Self::TripCompleted(_) => "trip_completed",
            Self::TripCancelled { .. } => "trip_cancelled",
            Self::ScoreUpdated { .. } => "score_updated",
            Self::InvoicePaid { .. } => "invoice_paid",
        }
    }
}

/// Cloneable handle on the broadcast channel
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<FleetEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.tx.subscribe()
    }

    /// Send to all current subscribers. Having none is not an error.
    pub fn publish(&self, event: FleetEvent) {
        let kind = event.kind();
        if let Ok(receivers) = self.tx.send(event) {
            tracing::trace!(kind, receivers, "Event published");
        } else {
            tracing::trace!(kind, "Event dropped, no subscribers");
        }
    }
}
