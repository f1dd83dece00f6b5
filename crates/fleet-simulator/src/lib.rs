//! # Fleet Simulator
//!
//! Synthetic fleet driving for exercising the telemetry engine end to end.
//!
//! ## Features
//!
//! - Depot-centered delivery route generation
//! - Noisy telemetry with speeding bursts, hard stops and idling
//! - Subscription-limited fleet setup with a depot geofence
//! - Month-end billing and the resulting driver leaderboard

#![forbid(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod fleet;
pub mod route;
pub mod telemetry;

pub use config::SimulatorConfig;
pub use fleet::{FleetOptions, FleetSimulator, SampleStats, SimulationReport};
pub use route::{RouteGenerator, Waypoint};
pub use telemetry::{DrivingProfile, SampleGenerator};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
