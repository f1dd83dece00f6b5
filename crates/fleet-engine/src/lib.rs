//! # Fleet Engine
//!
//! Processing services for the fleet telemetry core.
//!
//! ## Features
//!
//! - Telemetry validation and incremental distance
//! - Driving behavior and speeding detection with severity tiers
//! - Circle, polygon and rectangle geofences with enter/exit tracking
//! - Trip aggregation over the trip state machine
//! - Per-driver serialized scoring and leaderboards
//! - Daily, weekly and monthly driver performance logs
//! - Vehicle maintenance, refuel and fuel efficiency records
//! - Billing ledger over subscriptions, payments and invoices
//! - Per-vehicle ordered worker pipeline with a broadcast event stream
//!
//! Everything here is transport-agnostic. HTTP, WebSocket fan-out and
//! payment gateways sit outside and talk to [`TelemetryPipeline`],
//! [`BillingLedger`] and [`EventBus`].

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod detector;
pub mod error;
pub mod events;
pub mod geofence;
pub mod ledger;
pub mod performance;
pub mod pipeline;
pub mod scoring;
pub mod trip;
pub mod validator;

pub use config::{PipelineConfig, TelemetryConfig};
pub use detector::{BehaviorDetector, DetectedBehavior, Detection};
pub use error::{EngineError, Result};
pub use events::{EventBus, FleetEvent};
pub use geofence::{GeofenceEngine, GeofenceEvaluation, GeofenceState, GeofenceTransition};
pub use ledger::BillingLedger;
pub use performance::PerformanceReporter;
pub use pipeline::{PipelineStores, ProcessedSample, TelemetryPipeline, TripAttachment};
pub use scoring::ScoringService;
pub use trip::TripAggregator;
pub use validator::{TelemetrySample, TelemetryValidator, Validated};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
