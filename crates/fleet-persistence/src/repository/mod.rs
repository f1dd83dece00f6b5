//! # Repository Module
//!
//! Repository traits for domain entity persistence and the in-memory store
//! that implements them.

pub mod memory;
pub mod traits;

pub use memory::InMemoryStore;
pub use traits::{
    DriverEventRepository, DriverRepository, GeofenceRepository, InvoiceRepository,
    PaymentRepository, PerformanceLogRepository, SubscriptionRepository, TelemetryRepository,
    TripRepository, VehicleLogRepository, VehicleRepository, Versioned,
};
