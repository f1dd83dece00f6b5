//! # Behavior & Violation Detector
//!
//! Classifies a validated sample into zero or more behavior events.
//!
//! Longitudinal acceleration is the speed change between consecutive
//! samples, `Δv[m/s] / Δt[s]`, expressed in g. Lateral acceleration for
//! cornering is approximated as `v[m/s] * Δheading[rad] / Δt[s]`, also in g.
//! Kinematic checks need a previous sample, a positive time delta, and a
//! fix that is not marked low-accuracy.

use uuid::Uuid;

use fleet_domain::{
    BehaviorFlags, DriverEvent, EventType, GpsTrack, Severity, SpeedViolation,
};

use crate::config::TelemetryConfig;
use crate::validator::{TelemetrySample, Validated};

/// Standard gravity, m/s²
const G: f64 = 9.806_65;

const KMH_TO_MS: f64 = 1.0 / 3.6;

/// One raised behavior flag with its measurement
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedBehavior {
    pub event_type: EventType,
    pub severity: Severity,
    pub measured: f64,
    pub threshold: f64,
}

impl DetectedBehavior {
    fn description(&self) -> String {
        match self.event_type {
            EventType::Speeding => format!(
                "{:.1} km/h in a {:.0} km/h zone",
                self.measured, self.threshold
            ),
            EventType::Idling => format!("idling at {:.1} km/h with ignition on", self.measured),
            EventType::HarshBraking | EventType::RapidAcceleration | EventType::SharpCornering => {
                format!(
                    "{} at {:.2} g (threshold {:.2} g)",
                    self.event_type.as_str().replace('_', " "),
                    self.measured,
                    self.threshold
                )
            }
        }
    }

    /// Geo-tag and timestamp the behavior with its sample, attributed to
    /// `driver_id`.
    #[must_use]
    pub fn to_event(&self, sample: &TelemetrySample, driver_id: Uuid, trip_id: Option<Uuid>) -> DriverEvent {
        DriverEvent {
            id: Uuid::new_v4(),
            driver_id,
            vehicle_id: sample.vehicle_id,
            trip_id,
            event_type: self.event_type,
            severity: self.severity,
            description: self.description(),
            latitude: sample.latitude,
            longitude: sample.longitude,
            speed_kmh: sample.speed_kmh,
            measured: self.measured,
            threshold: self.threshold,
            occurred_at: sample.timestamp,
        }
    }
}

/// Everything the detector found for one sample
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Detection {
    pub flags: BehaviorFlags,
    pub speed_limit_kmh: Option<f64>,
    pub behaviors: Vec<DetectedBehavior>,
}

impl Detection {
    /// Highest severity among violations, ignoring idling.
    #[must_use]
    pub fn worst_severity(&self) -> Option<Severity> {
        self.behaviors
            .iter()
            .filter(|b| b.event_type.is_violation())
            .map(|b| b.severity)
            .max()
    }
}

/// Smallest absolute angle between two headings, in degrees `[0, 180]`.
fn heading_delta_deg(from: f64, to: f64) -> f64 {
    (((to - from).rem_euclid(360.0) + 180.0).rem_euclid(360.0) - 180.0).abs()
}

/// Behavior detector
#[derive(Debug, Clone)]
pub struct BehaviorDetector {
    config: TelemetryConfig,
}

impl BehaviorDetector {
    #[must_use]
    pub const fn new(config: TelemetryConfig) -> Self {
        Self { config }
    }

    /// Speed below which an ignition-on vehicle counts as idling.
    #[must_use]
    pub const fn idle_speed_kmh(&self) -> f64 {
        self.config.idle_speed_kmh
    }

    #[must_use]
    pub fn detect(
        &self,
        sample: &TelemetrySample,
        previous: Option<&GpsTrack>,
        validated: &Validated,
    ) -> Detection {
        let mut detection = Detection {
            speed_limit_kmh: self
                .config
                .resolve_speed_limit(sample.speed_limit_kmh, sample.road_class),
            ..Detection::default()
        };

        if let Some(prev) = previous.filter(|_| validated.elapsed_s > 0.0 && !validated.low_accuracy) {
            self.detect_kinematics(sample, prev, validated.elapsed_s, &mut detection);
        }

        if let Some(violation) = detection
            .speed_limit_kmh
            .and_then(|limit| SpeedViolation::evaluate(sample.speed_kmh, limit))
        {
            detection.flags.speeding = true;
            detection.behaviors.push(DetectedBehavior {
                event_type: EventType::Speeding,
                severity: violation.severity,
                measured: violation.speed_kmh,
                threshold: violation.limit_kmh,
            });
        }

        if sample.speed_kmh < self.config.idle_speed_kmh && sample.ignition_on {
            detection.flags.idling = true;
            detection.behaviors.push(DetectedBehavior {
                event_type: EventType::Idling,
                severity: Severity::Low,
                measured: sample.speed_kmh,
                threshold: self.config.idle_speed_kmh,
            });
        }

        if !detection.behaviors.is_empty() {
            tracing::debug!(
                vehicle_id = %sample.vehicle_id,
                flags = ?detection.flags.raised(),
                "Behavior detected"
            );
        }
        detection
    }

    fn detect_kinematics(
        &self,
        sample: &TelemetrySample,
        prev: &GpsTrack,
        elapsed_s: f64,
        detection: &mut Detection,
    ) {
        let accel_g = (sample.speed_kmh - prev.speed_kmh) * KMH_TO_MS / elapsed_s / G;

        let braking = self.config.harsh_braking_threshold_g;
        if -accel_g > braking {
            detection.flags.harsh_braking = true;
            detection.behaviors.push(DetectedBehavior {
                event_type: EventType::HarshBraking,
                severity: Severity::for_exceedance(-accel_g, braking),
                measured: -accel_g,
                threshold: braking,
            });
        }

        let accel = self.config.rapid_acceleration_threshold_g;
        if accel_g > accel {
            detection.flags.rapid_acceleration = true;
            detection.behaviors.push(DetectedBehavior {
                event_type: EventType::RapidAcceleration,
                severity: Severity::for_exceedance(accel_g, accel),
                measured: accel_g,
                threshold: accel,
            });
        }

        let turn_rad = heading_delta_deg(prev.heading_deg, sample.heading_deg).to_radians();
        let lateral_g = sample.speed_kmh * KMH_TO_MS * turn_rad / elapsed_s / G;
        let cornering = self.config.sharp_cornering_threshold_g;
        if lateral_g > cornering {
            detection.flags.sharp_cornering = true;
            detection.behaviors.push(DetectedBehavior {
                event_type: EventType::SharpCornering,
                severity: Severity::for_exceedance(lateral_g, cornering),
                measured: lateral_g,
                threshold: cornering,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::TelemetryValidator;
    use crate::validator::tests::sample;
    use chrono::{Duration, Utc};
    use fleet_domain::RoadClass;

    fn previous_track(speed: f64, heading: f64, at: chrono::DateTime<Utc>) -> GpsTrack {
        GpsTrack {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::nil(),
            driver_id: None,
            trip_id: None,
            latitude: -6.2,
            longitude: 106.8,
            altitude_m: 0.0,
            heading_deg: heading,
            speed_kmh: speed,
            accuracy_m: Some(3.0),
            satellites: 9,
            hdop: None,
            low_accuracy: false,
            ignition_on: true,
            engine_on: true,
            moving: true,
            fuel_level_l: None,
            distance_km: 0.0,
            odometer_km: 0.0,
            flags: BehaviorFlags::default(),
            speed_limit_kmh: None,
            violation_severity: None,
            geofence: None,
            timestamp: at,
            processed_at: at,
        }
    }

    fn run(sample: &TelemetrySample, prev: Option<&GpsTrack>) -> Detection {
        let cfg = TelemetryConfig::default();
        let validated = TelemetryValidator::new(&cfg).validate(sample, prev).unwrap();
        BehaviorDetector::new(cfg).detect(sample, prev, &validated)
    }

    #[test]
    fn test_heading_delta_wraps() {
        assert!((heading_delta_deg(350.0, 10.0) - 20.0).abs() < 1e-9);
        assert!((heading_delta_deg(10.0, 350.0) - 20.0).abs() < 1e-9);
        assert!((heading_delta_deg(0.0, 180.0) - 180.0).abs() < 1e-9);
    }

    #[test]
    fn test_speeding_in_city() {
        let mut s = sample(Uuid::nil(), -6.2, 106.8, 90.0, Utc::now());
        s.road_class = Some(RoadClass::City);

        let d = run(&s, None);
        assert!(d.flags.speeding);
        assert_eq!(d.speed_limit_kmh, Some(60.0));
        assert_eq!(d.behaviors.len(), 1);
        assert_eq!(d.behaviors[0].severity, Severity::Critical);
        assert_eq!(d.worst_severity(), Some(Severity::Critical));
    }

    #[test]
    fn test_no_speeding_without_known_limit() {
        let s = sample(Uuid::nil(), -6.2, 106.8, 250.0, Utc::now());
        let d = run(&s, None);
        assert!(!d.flags.speeding);
        assert!(d.behaviors.is_empty());
    }

    #[test]
    fn test_harsh_braking() {
        let t0 = Utc::now();
        let prev = previous_track(60.0, 0.0, t0);
        // 60 -> 20 km/h in 2 s is about 0.57 g
        let s = sample(Uuid::nil(), -6.2, 106.8, 20.0, t0 + Duration::seconds(2));

        let d = run(&s, Some(&prev));
        assert!(d.flags.harsh_braking);
        assert!(!d.flags.rapid_acceleration);
        let braking = &d.behaviors[0];
        assert_eq!(braking.event_type, EventType::HarshBraking);
        assert!((braking.measured - 0.566).abs() < 0.01);
        assert_eq!(braking.severity, Severity::High);
    }

    #[test]
    fn test_rapid_acceleration() {
        let t0 = Utc::now();
        let prev = previous_track(10.0, 0.0, t0);
        let s = sample(Uuid::nil(), -6.2, 106.8, 40.0, t0 + Duration::seconds(2));

        let d = run(&s, Some(&prev));
        assert!(d.flags.rapid_acceleration);
        assert_eq!(d.behaviors[0].event_type, EventType::RapidAcceleration);
    }

    #[test]
    fn test_sharp_cornering() {
        let t0 = Utc::now();
        let prev = previous_track(40.0, 0.0, t0);
        let mut s = sample(Uuid::nil(), -6.2, 106.8, 40.0, t0 + Duration::seconds(1));
        s.heading_deg = 45.0;

        let d = run(&s, Some(&prev));
        assert!(d.flags.sharp_cornering);
        assert!(!d.flags.harsh_braking);
    }

    #[test]
    fn test_low_accuracy_skips_kinematics() {
        let t0 = Utc::now();
        let prev = previous_track(60.0, 0.0, t0);
        let mut s = sample(Uuid::nil(), -6.2, 106.8, 20.0, t0 + Duration::seconds(2));
        s.accuracy_m = Some(50.0);

        let d = run(&s, Some(&prev));
        assert!(!d.flags.harsh_braking);
    }

    #[test]
    fn test_idling_is_low_and_not_a_violation() {
        let s = sample(Uuid::nil(), -6.2, 106.8, 2.0, Utc::now());
        let d = run(&s, None);
        assert!(d.flags.idling);
        assert_eq!(d.behaviors[0].severity, Severity::Low);
        assert_eq!(d.worst_severity(), None);
    }

    #[test]
    fn test_event_is_geotagged() {
        let mut s = sample(Uuid::new_v4(), -6.3, 106.9, 130.0, Utc::now());
        s.road_class = Some(RoadClass::Highway);
        let d = run(&s, None);

        let driver_id = Uuid::new_v4();
        let trip_id = Uuid::new_v4();
        let event = d.behaviors[0].to_event(&s, driver_id, Some(trip_id));
        assert_eq!(event.vehicle_id, s.vehicle_id);
        assert_eq!(event.driver_id, driver_id);
        assert_eq!(event.trip_id, Some(trip_id));
        assert_eq!(event.latitude, -6.3);
        assert_eq!(event.occurred_at, s.timestamp);
        assert_eq!(event.severity, Severity::Low);
    }
}
