//! # Simulator Configuration
//!
//! Environment-based configuration. `.env` is loaded by the binary before
//! [`SimulatorConfig::from_env`] runs.

use std::env;

use fleet_engine::{PipelineConfig, TelemetryConfig};

/// Default tracing filter when neither `RUST_LOG` nor `LOG_LEVEL` is set
pub const DEFAULT_LOG_FILTER: &str = "fleet_simulator=info,fleet_engine=info";

/// Simulator configuration
#[derive(Debug, Clone)]
pub struct SimulatorConfig {
    /// Engine thresholds and limits
    pub telemetry: TelemetryConfig,

    /// Per-vehicle queue depth
    pub queue_capacity: usize,

    /// Tracing filter directive
    pub log_level: String,

    /// Emit logs as JSON lines
    pub json_logs: bool,
}

impl SimulatorConfig {
    /// Load configuration from environment variables
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Unset or unparsable values fall back to
    /// the engine defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = TelemetryConfig::default();
        let number = |key: &str, default: f64| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .unwrap_or(default)
        };

        let telemetry = TelemetryConfig {
            gps_accuracy_threshold_m: number("GPS_ACCURACY_THRESHOLD", defaults.gps_accuracy_threshold_m),
            default_speed_limit_kmh: number("DEFAULT_SPEED_LIMIT", defaults.default_speed_limit_kmh),
            highway_speed_limit_kmh: number("HIGHWAY_SPEED_LIMIT", defaults.highway_speed_limit_kmh),
            city_speed_limit_kmh: number("CITY_SPEED_LIMIT", defaults.city_speed_limit_kmh),
            harsh_braking_threshold_g: number("HARSH_BRAKING_THRESHOLD", defaults.harsh_braking_threshold_g),
            rapid_acceleration_threshold_g: number(
                "RAPID_ACCELERATION_THRESHOLD",
                defaults.rapid_acceleration_threshold_g,
            ),
            sharp_cornering_threshold_g: number("SHARP_CORNERING_THRESHOLD", defaults.sharp_cornering_threshold_g),
            idle_speed_kmh: number("IDLE_SPEED_THRESHOLD", defaults.idle_speed_kmh),
            emit_inside_heartbeat: lookup("GEOFENCE_INSIDE_HEARTBEAT")
                .is_some_and(|v| v == "true" || v == "1"),
        };

        Self {
            telemetry,
            queue_capacity: lookup("VEHICLE_QUEUE_CAPACITY")
                .and_then(|v| v.parse().ok())
                .unwrap_or_else(|| PipelineConfig::default().queue_capacity),
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string()),
            json_logs: lookup("LOG_FORMAT").is_some_and(|v| v.eq_ignore_ascii_case("json")),
        }
    }

    #[must_use]
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            queue_capacity: self.queue_capacity,
            telemetry: self.telemetry.clone(),
            ..PipelineConfig::default()
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
