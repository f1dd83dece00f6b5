//! # Fleet Telemetry Core - Domain Model
//!
//! Entities, value objects and state machines for GPS fleet tracking:
//! vehicles, drivers, trips, geofences, maintenance and fuel records,
//! performance logs and the subscription billing ledger.
//! These types are the single source of truth for the persistence layer,
//! the processing engine and the simulator.
//!
//! Every operation that depends on wall-clock time takes `now` explicitly.

pub mod billing;
pub mod documents;
pub mod driver;
pub mod error;
pub mod geodesy;
pub mod performance;
pub mod tracking;
pub mod vehicle;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use billing::{
    BillingCycle, Invoice, InvoiceStatus, Payment, PaymentMethod, PaymentStatus, PaymentType, PlanLimits,
    Subscription, SubscriptionPlan, SubscriptionStatus,
};
pub use documents::DocumentKind;
pub use driver::{Driver, DriverDocuments, DriverEvent, DriverStatus, EmploymentStatus, Grade};
pub use error::{DomainError, Result};
pub use geodesy::Coordinates;
pub use performance::{PerformanceLog, PerformancePeriod};
pub use tracking::{
    BehaviorFlags, EventType, Geofence, GeofenceEventKind, GeofenceGeometry, GeofenceMembership,
    GpsTrack, RoadClass, Severity, SpeedViolation, Trip, TripStatus,
};
pub use vehicle::{Company, FuelLog, MaintenanceLog, MaintenanceType, Vehicle, VehicleStatus};

// =============================================================================
// LEADERBOARD TYPES
// =============================================================================

/// Driver leaderboard entry, ranked by overall score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub driver_id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    pub overall_score: f64,
    pub grade: Grade,
    pub total_trips: u32,
    pub total_distance_km: f64,
    pub rank: u32,
    pub updated_at: DateTime<Utc>,
}

// =============================================================================
// QUERY/FILTER TYPES
// =============================================================================

/// Time range filter for queries, half-open `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    #[must_use]
    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }
}

/// Pagination parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    pub limit: usize,
    pub offset: usize,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}
