//! # Fleet Persistence Library
//!
//! Repository layer for the fleet telemetry core.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Engine (pipeline, scoring, ledger)             │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Repository Traits                          │
//! │   (VehicleRepository, DriverRepository, InvoiceRepository)   │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │          InMemoryStore (versioned rows, CAS writes)          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! Storage backends plug in by implementing the traits; the engine only
//! ever holds `Arc<dyn ...Repository>`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use fleet_persistence::{InMemoryStore, InvoiceRepository};
//!
//! let store = Arc::new(InMemoryStore::new());
//! let invoices: Arc<dyn InvoiceRepository> = store.clone();
//! ```

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod repository;

// Re-export commonly used types
pub use error::{PersistenceError, Result};
pub use repository::{
    DriverEventRepository, DriverRepository, GeofenceRepository, InMemoryStore, InvoiceRepository,
    PaymentRepository, PerformanceLogRepository, SubscriptionRepository, TelemetryRepository,
    TripRepository, VehicleLogRepository, VehicleRepository, Versioned,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
