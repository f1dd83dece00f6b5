//! Great-circle geometry shared by the validator, detector and geofence engine.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const EARTH_RADIUS_M: f64 = EARTH_RADIUS_KM * 1000.0;

/// A latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Calculate great-circle distance to another point (Haversine formula)
    #[must_use]
    pub fn distance_to_km(&self, other: &Self) -> f64 {
        distance_km(self.latitude, self.longitude, other.latitude, other.longitude)
    }

    /// Whether both components lie in their legal ranges.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        // Jakarta, Monas
        Self::new(-6.175_392, 106.827_153)
    }
}

/// Haversine distance in kilometres. NaN inputs propagate.
#[must_use]
pub fn distance_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// Haversine distance in metres.
#[must_use]
pub fn distance_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let km = distance_km(lat1, lon1, lat2, lon2);
    km * 1000.0
}

/// True when `(lat, lon)` is within `radius_m` metres of the centre. The
/// boundary itself counts as inside.
#[must_use]
pub fn circle_contains(center_lat: f64, center_lon: f64, radius_m: f64, lat: f64, lon: f64) -> bool {
    distance_m(center_lat, center_lon, lat, lon) <= radius_m
}

/// Offset a point by `distance_m` metres along `bearing_deg` on the sphere.
#[must_use]
pub fn destination(origin: Coordinates, bearing_deg: f64, distance_m: f64) -> Coordinates {
    let angular = distance_m / EARTH_RADIUS_M;
    let bearing = bearing_deg.to_radians();
    let lat1 = origin.latitude.to_radians();
    let lon1 = origin.longitude.to_radians();

    let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
    let lon2 = lon1
        + (bearing.sin() * angular.sin() * lat1.cos()).atan2(angular.cos() - lat1.sin() * lat2.sin());

    Coordinates::new(lat2.to_degrees(), lon2.to_degrees())
}

/// Initial bearing in degrees `[0, 360)` from `from` towards `to`.
#[must_use]
pub fn bearing_deg(from: Coordinates, to: Coordinates) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let y = delta_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * delta_lon.cos();
    (y.atan2(x).to_degrees() + 360.0) % 360.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_to_self_is_zero() {
        let p = Coordinates::default();
        assert_eq!(p.distance_to_km(&p), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric_and_non_negative() {
        let jakarta = Coordinates::new(-6.2088, 106.8456);
        let bandung = Coordinates::new(-6.9175, 107.6191);

        let there = jakarta.distance_to_km(&bandung);
        let back = bandung.distance_to_km(&jakarta);

        assert!(there > 0.0);
        assert!((there - back).abs() < 1e-9);
        // Roughly 116 km as the crow flies
        assert!((there - 116.0).abs() < 3.0);
    }

    #[test]
    fn test_one_degree_of_latitude() {
        let d = distance_km(0.0, 0.0, 1.0, 0.0);
        assert!((d - 111.195).abs() < 0.01);
    }

    #[test]
    fn test_nan_propagates() {
        assert!(distance_km(f64::NAN, 0.0, 1.0, 1.0).is_nan());
    }

    #[test]
    fn test_circle_boundary_is_inside() {
        let center = Coordinates::new(-6.2, 106.8);
        let edge = destination(center, 90.0, 500.0);
        let radius = distance_m(center.latitude, center.longitude, edge.latitude, edge.longitude);

        assert!(circle_contains(center.latitude, center.longitude, radius, edge.latitude, edge.longitude));
        assert!(!circle_contains(
            center.latitude,
            center.longitude,
            radius - 0.01,
            edge.latitude,
            edge.longitude
        ));
    }

    #[test]
    fn test_destination_round_trip_distance() {
        let origin = Coordinates::new(-6.2, 106.8);
        let target = destination(origin, 45.0, 1_000.0);
        let d = origin.distance_to_km(&target);
        assert!((d - 1.0).abs() < 1e-6);

        let bearing = bearing_deg(origin, target);
        assert!((bearing - 45.0).abs() < 0.1);
    }

    #[test]
    fn test_coordinate_validity() {
        assert!(Coordinates::new(90.0, -180.0).is_valid());
        assert!(!Coordinates::new(90.5, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, 180.1).is_valid());
    }
}
