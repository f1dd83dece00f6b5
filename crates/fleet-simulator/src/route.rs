//! Delivery route generation around a depot.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use fleet_domain::{Coordinates, RoadClass, geodesy};

/// Central Jakarta
pub const JAKARTA_DEPOT: Coordinates = Coordinates::new(-6.2088, 106.8456);

/// A point on a route. `road_class` describes the leg leading *to* it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub sequence: u32,
    pub name: String,
    pub location: Coordinates,
    pub road_class: RoadClass,
    /// Seconds parked here with the engine running
    pub stop_s: Option<u32>,
}

/// Depot-centered route generator
pub struct RouteGenerator {
    depot: Coordinates,
    radius_km: f64,
    rng: StdRng,
}

impl RouteGenerator {
    #[must_use]
    pub fn new(depot: Coordinates, radius_km: f64, seed: u64) -> Self {
        Self {
            depot,
            radius_km,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    #[must_use]
    pub fn jakarta(seed: u64) -> Self {
        Self::new(JAKARTA_DEPOT, 15.0, seed)
    }

    #[must_use]
    pub const fn depot(&self) -> Coordinates {
        self.depot
    }

    /// Depot, `stops` delivery points, depot again. Outer stops are reached
    /// by highway, inner ones through the city.
    pub fn generate_route(&mut self, stops: usize) -> Vec<Waypoint> {
        let mut route = Vec::with_capacity(stops + 2);
        route.push(Waypoint {
            sequence: 0,
            name: "DEPOT".to_string(),
            location: self.depot,
            road_class: RoadClass::City,
            stop_s: None,
        });

        let mut bearing: f64 = self.rng.gen_range(0.0..360.0);
        for i in 1..=stops {
            bearing = (bearing + self.rng.gen_range(20.0..80.0)) % 360.0;
            let factor: f64 = self.rng.gen_range(0.2..1.0);
            let location = geodesy::destination(self.depot, bearing, self.radius_km * factor * 1000.0);
            let road_class = if factor > 0.6 {
                RoadClass::Highway
            } else {
                RoadClass::City
            };
            route.push(Waypoint {
                sequence: u32::try_from(i).unwrap_or(u32::MAX),
                name: format!("STOP-{i:02}"),
                location,
                road_class,
                stop_s: Some(self.rng.gen_range(60..300)),
            });
        }

        route.push(Waypoint {
            sequence: u32::try_from(stops + 1).unwrap_or(u32::MAX),
            name: "DEPOT".to_string(),
            location: self.depot,
            road_class: RoadClass::City,
            stop_s: None,
        });
        route
    }
}

/// Total length of a route in kilometres.
#[must_use]
pub fn route_length_km(route: &[Waypoint]) -> f64 {
    route
        .windows(2)
        .map(|leg| leg[0].location.distance_to_km(&leg[1].location))
        .sum()
}
