//! Trip aggregation.
//!
//! Wraps a [`Trip`] with the bits of per-trip memory needed to turn a
//! stream of tracks into running totals: when the previous sample arrived
//! and what the fuel gauge read then.

use chrono::{DateTime, Utc};

use fleet_domain::{Coordinates, EventType, GpsTrack, Result, Trip};

/// Running aggregation for one trip
#[derive(Debug, Clone)]
pub struct TripAggregator {
    trip: Trip,
    last_sample_at: Option<DateTime<Utc>>,
    last_fuel_l: Option<f64>,
}

impl TripAggregator {
    #[must_use]
    pub const fn new(trip: Trip) -> Self {
        Self {
            trip,
            last_sample_at: None,
            last_fuel_l: None,
        }
    }

    #[must_use]
    pub const fn trip(&self) -> &Trip {
        &self.trip
    }

    pub fn start(
        &mut self,
        at: DateTime<Utc>,
        location: Coordinates,
        fuel_level_l: Option<f64>,
    ) -> Result<()> {
        self.trip.start(at, location, fuel_level_l)?;
        self.last_sample_at = Some(at);
        self.last_fuel_l = fuel_level_l;
        Ok(())
    }

    /// Fold an accepted track and the behaviors detected on it into the trip.
    /// Behaviors count whether or not a driver was attached.
    ///
    /// Fails with `TripNotActive` before touching anything if the trip is not
    /// running.
    pub fn ingest(&mut self, track: &GpsTrack, detected: &[EventType]) -> Result<()> {
        let idle_s = match self.last_sample_at {
            Some(prev) if track.flags.idling && track.timestamp > prev => {
                (track.timestamp - prev).num_seconds()
            }
            _ => 0,
        };

        let fuel_used_l = match (self.last_fuel_l, track.fuel_level_l) {
            (Some(before), Some(now)) if now < before => before - now,
            _ => 0.0,
        };

        self.trip.record_movement(
            track.distance_km,
            track.speed_kmh,
            idle_s,
            fuel_used_l,
            track.timestamp,
        )?;
        for kind in detected {
            self.trip.add_violation(*kind)?;
        }

        self.last_sample_at = Some(track.timestamp);
        if track.fuel_level_l.is_some() {
            self.last_fuel_l = track.fuel_level_l;
        }
        Ok(())
    }

    pub fn end(
        &mut self,
        at: DateTime<Utc>,
        location: Coordinates,
        fuel_level_l: Option<f64>,
    ) -> Result<&Trip> {
        self.trip.end(at, location, fuel_level_l)?;
        tracing::info!(
            trip_id = %self.trip.id,
            vehicle_id = %self.trip.vehicle_id,
            distance_km = self.trip.total_distance_km,
            duration_s = self.trip.total_duration_s,
            violations = self.trip.violations,
            "Trip completed"
        );
        Ok(&self.trip)
    }

    pub fn cancel(&mut self, at: DateTime<Utc>) -> Result<&Trip> {
        self.trip.cancel(at)?;
        Ok(&self.trip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use fleet_domain::{BehaviorFlags, DomainError, TripStatus};
    use uuid::Uuid;

    fn track(at: DateTime<Utc>, speed: f64, distance: f64, fuel: Option<f64>, idling: bool) -> GpsTrack {
        GpsTrack {
            id: Uuid::new_v4(),
            vehicle_id: Uuid::nil(),
            driver_id: None,
            trip_id: None,
            latitude: -6.2,
            longitude: 106.8,
            altitude_m: 0.0,
            heading_deg: 0.0,
            speed_kmh: speed,
            accuracy_m: None,
            satellites: 8,
            hdop: None,
            low_accuracy: false,
            ignition_on: true,
            engine_on: true,
            moving: !idling,
            fuel_level_l: fuel,
            distance_km: distance,
            odometer_km: 0.0,
            flags: BehaviorFlags {
                idling,
                ..BehaviorFlags::default()
            },
            speed_limit_kmh: None,
            violation_severity: None,
            geofence: None,
            timestamp: at,
            processed_at: at,
        }
    }

    fn planned() -> TripAggregator {
        TripAggregator::new(Trip::planned(Uuid::new_v4(), Uuid::nil(), None, "Route 7", Utc::now()))
    }

    #[test]
    fn test_sample_before_start_rejected() {
        let mut agg = planned();
        let err = agg.ingest(&track(Utc::now(), 30.0, 1.0, None, false), &[]).unwrap_err();
        assert!(matches!(err, DomainError::TripNotActive { .. }));
        assert_eq!(agg.trip().total_distance_km, 0.0);
    }

    #[test]
    fn test_idle_time_and_fuel() {
        let t0 = Utc::now();
        let mut agg = planned();
        agg.start(t0, Coordinates::default(), Some(40.0)).unwrap();

        agg.ingest(&track(t0 + Duration::seconds(60), 50.0, 0.8, Some(39.8), false), &[])
            .unwrap();
        agg.ingest(&track(t0 + Duration::seconds(120), 1.0, 0.0, Some(39.7), true), &[EventType::Idling])
            .unwrap();
        // Refuel does not count as consumption
        agg.ingest(&track(t0 + Duration::seconds(180), 40.0, 0.7, Some(45.0), false), &[])
            .unwrap();

        let trip = agg.trip();
        assert_eq!(trip.idle_time_s, 60);
        assert!((trip.fuel_consumed_l - 0.3).abs() < 1e-9);
        assert!((trip.total_distance_km - 1.5).abs() < 1e-9);
        assert_eq!(trip.violations, 0);
    }

    #[test]
    fn test_end_freezes_totals() {
        let t0 = Utc::now();
        let mut agg = planned();
        agg.start(t0, Coordinates::default(), Some(40.0)).unwrap();
        agg.ingest(
            &track(t0 + Duration::seconds(600), 60.0, 10.0, Some(39.0), false),
            &[EventType::Speeding, EventType::HarshBraking],
        )
        .unwrap();

        let trip = agg
            .end(t0 + Duration::seconds(900), Coordinates::default(), Some(39.0))
            .unwrap();
        assert_eq!(trip.status, TripStatus::Completed);
        assert_eq!(trip.total_duration_s, 900);
        assert!((trip.fuel_efficiency_km_l - 10.0).abs() < 1e-9);
        assert_eq!(trip.violations, 2);

        assert!(agg.ingest(&track(Utc::now(), 10.0, 1.0, None, false), &[]).is_err());
    }

    #[test]
    fn test_second_start_changes_nothing() {
        let t0 = Utc::now();
        let mut agg = planned();
        agg.start(t0, Coordinates::default(), None).unwrap();
        assert!(matches!(
            agg.start(t0 + Duration::seconds(5), Coordinates::default(), None),
            Err(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(agg.trip().start_time, Some(t0));
    }
}
