//! # Telemetry Validator
//!
//! First stage of the pipeline. Rejects impossible readings and
//! out-of-order samples, flags poor fixes, and measures the distance
//! travelled since the vehicle's previous accepted sample.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use fleet_domain::tracking::{MAX_SPEED_KMH, is_valid_reading};
use fleet_domain::{Coordinates, DomainError, GpsTrack, RoadClass, geodesy};

use crate::config::TelemetryConfig;

/// Raw inbound reading from a vehicle device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    pub vehicle_id: Uuid,
    #[serde(default)]
    pub driver_id: Option<Uuid>,
    #[serde(default)]
    pub trip_id: Option<Uuid>,

    pub latitude: f64,
    pub longitude: f64,
    #[serde(default)]
    pub altitude_m: f64,
    pub speed_kmh: f64,
    #[serde(default)]
    pub heading_deg: f64,

    #[serde(default)]
    pub accuracy_m: Option<f64>,
    #[serde(default)]
    pub satellites: u8,
    #[serde(default)]
    pub hdop: Option<f64>,

    pub ignition_on: bool,
    #[serde(default)]
    pub engine_on: bool,
    #[serde(default)]
    pub fuel_level_l: Option<f64>,

    /// Posted limit reported by the device, if any
    #[serde(default)]
    pub speed_limit_kmh: Option<f64>,
    #[serde(default)]
    pub road_class: Option<RoadClass>,

    pub timestamp: DateTime<Utc>,
}

impl TelemetrySample {
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }
}

/// Outcome of validating one sample against the previous accepted one
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validated {
    /// Great-circle distance from the previous sample, 0 for the first
    pub distance_km: f64,
    /// Seconds since the previous sample, 0 for the first
    pub elapsed_s: f64,
    pub low_accuracy: bool,
}

/// Stateless range and ordering checks
#[derive(Debug, Clone)]
pub struct TelemetryValidator {
    accuracy_threshold_m: f64,
}

impl TelemetryValidator {
    #[must_use]
    pub const fn new(config: &TelemetryConfig) -> Self {
        Self {
            accuracy_threshold_m: config.gps_accuracy_threshold_m,
        }
    }

    /// Validate `sample` given the vehicle's last accepted track.
    ///
    /// # Errors
    ///
    /// `InvalidSample` when coordinates or speed are out of range or the
    /// timestamp precedes the previous sample.
    pub fn validate(
        &self,
        sample: &TelemetrySample,
        previous: Option<&GpsTrack>,
    ) -> Result<Validated, DomainError> {
        if !is_valid_reading(sample.latitude, sample.longitude, sample.speed_kmh) {
            return Err(DomainError::InvalidSample(format!(
                "reading out of range: lat={}, lon={}, speed={} (max {MAX_SPEED_KMH})",
                sample.latitude, sample.longitude, sample.speed_kmh
            )));
        }
        if !sample.heading_deg.is_finite() {
            return Err(DomainError::InvalidSample(format!(
                "heading is not finite: {}",
                sample.heading_deg
            )));
        }

        let (distance_km, elapsed_s) = match previous {
            Some(prev) => {
                if sample.timestamp < prev.timestamp {
                    return Err(DomainError::InvalidSample(format!(
                        "timestamp {} precedes previous sample at {}",
                        sample.timestamp, prev.timestamp
                    )));
                }
                let distance = geodesy::distance_km(
                    prev.latitude,
                    prev.longitude,
                    sample.latitude,
                    sample.longitude,
                );
                #[allow(clippy::cast_precision_loss)]
                let elapsed = (sample.timestamp - prev.timestamp).num_milliseconds() as f64 / 1000.0;
                (distance, elapsed)
            }
            None => (0.0, 0.0),
        };

        let low_accuracy = sample
            .accuracy_m
            .is_some_and(|accuracy| accuracy > self.accuracy_threshold_m);

        Ok(Validated {
            distance_km,
            elapsed_s,
            low_accuracy,
        })
    }
}
