//! # Engine Configuration
//!
//! Plain configuration values for the processing engine. The engine never
//! reads the environment; binaries build these and hand them in.

use serde::{Deserialize, Serialize};

use fleet_domain::RoadClass;

/// Default per-vehicle command queue depth
const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Broadcast channel capacity
const CHANNEL_CAPACITY: usize = 1024;

/// Thresholds and limits used by the validator and detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Reported accuracy (m) above which a fix is marked low-accuracy
    pub gps_accuracy_threshold_m: f64,

    /// Speed limits by road class, km/h
    pub default_speed_limit_kmh: f64,
    pub highway_speed_limit_kmh: f64,
    pub city_speed_limit_kmh: f64,

    /// Kinematic thresholds, in g
    pub harsh_braking_threshold_g: f64,
    pub rapid_acceleration_threshold_g: f64,
    pub sharp_cornering_threshold_g: f64,

    /// Speed under which a running vehicle is idling, km/h
    pub idle_speed_kmh: f64,

    /// Emit an `inside` event on every sample that stays inside a geofence
    pub emit_inside_heartbeat: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            gps_accuracy_threshold_m: 5.0,
            default_speed_limit_kmh: 100.0,
            highway_speed_limit_kmh: 120.0,
            city_speed_limit_kmh: 60.0,
            harsh_braking_threshold_g: 0.4,
            rapid_acceleration_threshold_g: 0.3,
            sharp_cornering_threshold_g: 0.4,
            idle_speed_kmh: fleet_domain::tracking::DEFAULT_IDLE_SPEED_KMH,
            emit_inside_heartbeat: false,
        }
    }
}

impl TelemetryConfig {
    /// Configured limit for a road class.
    #[must_use]
    pub const fn speed_limit_for(&self, road: RoadClass) -> f64 {
        match road {
            RoadClass::City => self.city_speed_limit_kmh,
            RoadClass::Highway => self.highway_speed_limit_kmh,
            RoadClass::Unclassified => self.default_speed_limit_kmh,
        }
    }

    /// Explicit limit when positive, else the road-class limit, else unknown.
    #[must_use]
    pub fn resolve_speed_limit(&self, explicit: Option<f64>, road: Option<RoadClass>) -> Option<f64> {
        explicit
            .filter(|limit| *limit > 0.0)
            .or_else(|| road.map(|r| self.speed_limit_for(r)))
            .filter(|limit| *limit > 0.0)
    }
}

/// Pipeline sizing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Commands buffered per vehicle worker before `ingest` waits
    pub queue_capacity: usize,

    /// Capacity of the outbound event broadcast channel
    pub event_channel_capacity: usize,

    pub telemetry: TelemetryConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            event_channel_capacity: CHANNEL_CAPACITY,
            telemetry: TelemetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.gps_accuracy_threshold_m, 5.0);
        assert_eq!(cfg.speed_limit_for(RoadClass::City), 60.0);
        assert_eq!(cfg.speed_limit_for(RoadClass::Highway), 120.0);
        assert_eq!(cfg.speed_limit_for(RoadClass::Unclassified), 100.0);
        assert_eq!(cfg.idle_speed_kmh, 5.0);
    }

    #[test]
    fn test_resolve_speed_limit_precedence() {
        let cfg = TelemetryConfig::default();
        assert_eq!(cfg.resolve_speed_limit(Some(40.0), Some(RoadClass::Highway)), Some(40.0));
        assert_eq!(cfg.resolve_speed_limit(Some(0.0), Some(RoadClass::City)), Some(60.0));
        assert_eq!(cfg.resolve_speed_limit(None, None), None);
    }

    #[test]
    fn test_partial_deserialize_keeps_defaults() {
        let cfg: PipelineConfig =
            serde_json::from_str(r#"{"queue_capacity":8,"telemetry":{"city_speed_limit_kmh":50}}"#)
                .unwrap();
        assert_eq!(cfg.queue_capacity, 8);
        assert_eq!(cfg.event_channel_capacity, 1024);
        assert_eq!(cfg.telemetry.city_speed_limit_kmh, 50.0);
        assert_eq!(cfg.telemetry.harsh_braking_threshold_g, 0.4);
    }
}
