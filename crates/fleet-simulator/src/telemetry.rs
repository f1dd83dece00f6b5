//! Telemetry sample generation for one simulated vehicle.
//!
//! Drives along a route at road-appropriate speeds with sensor noise, and
//! now and then misbehaves: speeding bursts on open road, hard stops, and
//! idling at delivery stops.

use chrono::{DateTime, Duration, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, StandardNormal};
use uuid::Uuid;

use fleet_domain::{Coordinates, RoadClass, geodesy};
use fleet_engine::TelemetrySample;

use crate::route::Waypoint;

/// Litres burned per kilometre
const FUEL_PER_KM_L: f64 = 0.1;

/// Comfortable speed change per second, km/h (about 0.07 g)
const EASE_KMH_PER_S: f64 = 2.4;

/// Standard deviation of speed sensor noise, km/h
const SPEED_NOISE_KMH: f64 = 1.5;

/// Behavior knobs for a generator
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrivingProfile {
    /// Per-tick chance of starting a speeding burst
    pub speeding_chance: f64,
    /// Per-tick chance of a hard stop
    pub hard_stop_chance: f64,
    /// Per-tick chance of a poor GPS fix
    pub poor_fix_chance: f64,
}

impl Default for DrivingProfile {
    fn default() -> Self {
        Self {
            speeding_chance: 0.02,
            hard_stop_chance: 0.01,
            poor_fix_chance: 0.03,
        }
    }
}

/// Sample generator for a single vehicle
pub struct SampleGenerator {
    vehicle_id: Uuid,
    route: Vec<Waypoint>,
    leg: usize,
    position: Coordinates,
    speed_kmh: f64,
    heading_deg: f64,
    fuel_l: f64,
    clock: DateTime<Utc>,
    tick_s: u32,
    idle_ticks: u32,
    speeding_ticks: u32,
    profile: DrivingProfile,
    rng: StdRng,
}

impl SampleGenerator {
    /// Start parked at the first waypoint.
    #[must_use]
    pub fn new(
        vehicle_id: Uuid,
        route: Vec<Waypoint>,
        start: DateTime<Utc>,
        tick_s: u32,
        profile: DrivingProfile,
        seed: u64,
    ) -> Self {
        let position = route.first().map(|w| w.location).unwrap_or_default();
        Self {
            vehicle_id,
            route,
            leg: 0,
            position,
            speed_kmh: 0.0,
            heading_deg: 0.0,
            fuel_l: 60.0,
            clock: start,
            tick_s: tick_s.max(1),
            idle_ticks: 0,
            speeding_ticks: 0,
            profile,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.leg + 1 >= self.route.len()
    }

    #[must_use]
    pub const fn position(&self) -> Coordinates {
        self.position
    }

    #[must_use]
    pub const fn clock(&self) -> DateTime<Utc> {
        self.clock
    }

    #[must_use]
    pub const fn fuel_l(&self) -> f64 {
        self.fuel_l
    }

    fn cruise_speed(&mut self, road: RoadClass) -> f64 {
        match road {
            RoadClass::Highway => self.rng.gen_range(80.0..110.0),
            RoadClass::City | RoadClass::Unclassified => self.rng.gen_range(35.0..55.0),
        }
    }

    fn speeding_speed(&mut self, road: RoadClass) -> f64 {
        match road {
            RoadClass::Highway => self.rng.gen_range(135.0..160.0),
            RoadClass::City | RoadClass::Unclassified => self.rng.gen_range(75.0..95.0),
        }
    }

    fn noise(&mut self) -> f64 {
        let n: f64 = StandardNormal.sample(&mut self.rng);
        n * SPEED_NOISE_KMH
    }

    /// Next sample, or `None` once the route is done.
    pub fn next_sample(&mut self) -> Option<TelemetrySample> {
        if self.is_finished() {
            return None;
        }
        self.clock += Duration::seconds(i64::from(self.tick_s));
        let tick_s = f64::from(self.tick_s);
        let target = &self.route[self.leg + 1];
        let road = target.road_class;
        let target_location = target.location;
        let target_stop = target.stop_s;

        if self.idle_ticks > 0 {
            self.idle_ticks -= 1;
            self.speed_kmh = self.rng.gen_range(0.0..2.0);
            return Some(self.sample(road));
        }

        // Hard stop straight from cruising speed
        if self.speed_kmh > 40.0 && self.rng.gen_bool(self.profile.hard_stop_chance) {
            self.speed_kmh = 0.0;
            self.idle_ticks = self.rng.gen_range(2..5);
            return Some(self.sample(road));
        }

        if self.speeding_ticks == 0 && self.rng.gen_bool(self.profile.speeding_chance) {
            self.speeding_ticks = self.rng.gen_range(3..8);
        }
        let mut target_speed = if self.speeding_ticks > 0 {
            self.speeding_ticks -= 1;
            self.speeding_speed(road)
        } else {
            self.cruise_speed(road)
        };

        let remaining_km = self.position.distance_to_km(&target_location);
        if remaining_km < 0.3 {
            target_speed = target_speed.min(30.0);
        }

        // Ease toward the target so normal driving stays under the g thresholds
        let max_step = EASE_KMH_PER_S * tick_s;
        let delta = (target_speed - self.speed_kmh).clamp(-max_step, max_step);
        let noise = self.noise();
        self.speed_kmh = (self.speed_kmh + delta + noise).clamp(0.0, 200.0);

        let step_km = self.speed_kmh / 3600.0 * tick_s;
        self.heading_deg = geodesy::bearing_deg(self.position, target_location);

        if step_km >= remaining_km {
            self.position = target_location;
            self.leg += 1;
            if let Some(stop) = target_stop {
                self.idle_ticks = (stop / self.tick_s).max(1);
            }
            self.burn(remaining_km);
        } else {
            self.position = geodesy::destination(self.position, self.heading_deg, step_km * 1000.0);
            self.burn(step_km);
        }

        Some(self.sample(road))
    }

    fn burn(&mut self, km: f64) {
        self.fuel_l = (self.fuel_l - km * FUEL_PER_KM_L).max(0.0);
    }

    fn sample(&mut self, road: RoadClass) -> TelemetrySample {
        let accuracy_m = if self.rng.gen_bool(self.profile.poor_fix_chance) {
            self.rng.gen_range(8.0..20.0)
        } else {
            self.rng.gen_range(1.5..4.5)
        };
        TelemetrySample {
            vehicle_id: self.vehicle_id,
            driver_id: None,
            trip_id: None,
            latitude: self.position.latitude,
            longitude: self.position.longitude,
            altitude_m: 8.0 + self.noise(),
            speed_kmh: self.speed_kmh,
            heading_deg: self.heading_deg,
            accuracy_m: Some(accuracy_m),
            satellites: self.rng.gen_range(6..14),
            hdop: Some(self.rng.gen_range(0.6..2.0)),
            ignition_on: true,
            engine_on: true,
            fuel_level_l: Some(self.fuel_l),
            speed_limit_kmh: None,
            road_class: Some(road),
            timestamp: self.clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::route::RouteGenerator;

    fn generator(profile: DrivingProfile) -> SampleGenerator {
        let route = RouteGenerator::jakarta(11).generate_route(3);
        SampleGenerator::new(Uuid::new_v4(), route, Utc::now(), 5, profile, 11)
    }

    #[test]
    fn test_route_completes_with_ordered_samples() {
        let mut generator = generator(DrivingProfile::default());
        let mut last = None;
        let mut count = 0;
        while let Some(sample) = generator.next_sample() {
            if let Some(prev) = last {
                assert!(sample.timestamp > prev);
            }
            assert!((0.0..=200.0).contains(&sample.speed_kmh));
            last = Some(sample.timestamp);
            count += 1;
            assert!(count < 100_000, "route never finished");
        }
        assert!(generator.is_finished());
        assert!(generator.fuel_l() < 60.0);
    }

    #[test]
    fn test_speeding_profile_produces_bursts() {
        let mut generator = generator(DrivingProfile {
            speeding_chance: 1.0,
            hard_stop_chance: 0.0,
            poor_fix_chance: 0.0,
        });
        let fastest = std::iter::from_fn(|| generator.next_sample())
            .map(|s| s.speed_kmh)
            .fold(0.0, f64::max);
        assert!(fastest > 70.0);
    }
}
