//! # Geofence Engine
//!
//! Containment tests for circle, polygon and rectangle geofences, plus
//! per-vehicle enter/exit/inside transition tracking.
//!
//! Definitions are held as an immutable `Arc` snapshot published through a
//! `tokio::sync::watch` channel. `reload` swaps the whole snapshot, so
//! readers never see a half-updated set.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use geo::{Intersects, LineString, Point, Polygon, Rect, coord};
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use fleet_domain::{
    DomainError, Geofence, GeofenceEventKind, GeofenceGeometry, GeofenceMembership, geodesy,
};

/// A surfaced geofence transition for one vehicle
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeofenceTransition {
    pub vehicle_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub geofence_id: Uuid,
    pub geofence_name: String,
    pub kind: GeofenceEventKind,
    /// Whether the geofence asks for this transition to be alerted on
    pub alert: bool,
    pub latitude: f64,
    pub longitude: f64,
    pub at: DateTime<Utc>,
}

/// Containment memory for one vehicle, keyed by geofence id
#[derive(Debug, Clone, Default)]
pub struct GeofenceState {
    inside: HashMap<Uuid, bool>,
}

impl GeofenceState {
    #[must_use]
    pub fn is_inside(&self, geofence_id: Uuid) -> bool {
        self.inside.get(&geofence_id).copied().unwrap_or(false)
    }
}

/// Result of evaluating one position
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeofenceEvaluation {
    pub transitions: Vec<GeofenceTransition>,
    /// Membership to stamp on the track
    pub membership: Option<GeofenceMembership>,
}

/// Point-in-geometry test.
///
/// Boundary points count as inside for every geometry.
///
/// A rectangle whose west edge lies east of its east edge wraps across the
/// antimeridian.
///
/// # Errors
///
/// `UnknownGeometry` when the geofence carries an unrecognized geometry,
/// `InvariantViolation` for a rectangle with its south edge above its north
/// edge.
pub fn try_contains(geofence: &Geofence, lat: f64, lon: f64) -> Result<bool, DomainError> {
    let point = Point::new(lon, lat);
    match &geofence.geometry {
        GeofenceGeometry::Circle { center, radius_m } => Ok(geodesy::circle_contains(
            center.latitude,
            center.longitude,
            *radius_m,
            lat,
            lon,
        )),
        GeofenceGeometry::Polygon { vertices } => {
            if vertices.len() < 3 {
                tracing::warn!(
                    geofence_id = %geofence.id,
                    vertices = vertices.len(),
                    "Degenerate polygon geofence"
                );
                return Ok(false);
            }
            let ring: LineString<f64> = vertices
                .iter()
                .map(|v| (v.longitude, v.latitude))
                .collect::<Vec<_>>()
                .into();
            Ok(Polygon::new(ring, vec![]).intersects(&point))
        }
        GeofenceGeometry::Rectangle {
            south_west,
            north_east,
        } => {
            if south_west.latitude > north_east.latitude {
                return Err(DomainError::InvariantViolation(format!(
                    "geofence {} rectangle has south edge {} above north edge {}",
                    geofence.id, south_west.latitude, north_east.latitude
                )));
            }
            let band = |west: f64, east: f64| {
                Rect::new(
                    coord! { x: west, y: south_west.latitude },
                    coord! { x: east, y: north_east.latitude },
                )
            };
            // West edge east of the east edge: the box wraps the antimeridian
            if south_west.longitude > north_east.longitude {
                return Ok(band(south_west.longitude, 180.0).intersects(&point)
                    || band(-180.0, north_east.longitude).intersects(&point));
            }
            Ok(band(south_west.longitude, north_east.longitude).intersects(&point))
        }
        GeofenceGeometry::Unknown => Err(DomainError::UnknownGeometry {
            geofence_id: geofence.id.to_string(),
        }),
    }
}

/// Like [`try_contains`], but an unknown geometry logs a configuration
/// defect and evaluates to `false`.
#[must_use]
pub fn contains(geofence: &Geofence, lat: f64, lon: f64) -> bool {
    try_contains(geofence, lat, lon).unwrap_or_else(|err| {
        tracing::error!(
            geofence_id = %geofence.id,
            name = %geofence.name,
            error = %err,
            "Geofence has an unusable geometry"
        );
        false
    })
}

/// Shared geofence evaluator
#[derive(Debug)]
pub struct GeofenceEngine {
    snapshot: watch::Sender<Arc<Vec<Geofence>>>,
    emit_inside_heartbeat: bool,
}

impl GeofenceEngine {
    #[must_use]
    pub fn new(geofences: Vec<Geofence>, emit_inside_heartbeat: bool) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(geofences));
        Self {
            snapshot,
            emit_inside_heartbeat,
        }
    }

    /// Current definitions.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Geofence>> {
        Arc::clone(&self.snapshot.borrow())
    }

    /// Replace all definitions at once.
    pub fn reload(&self, geofences: Vec<Geofence>) {
        let count = geofences.len();
        self.snapshot.send_replace(Arc::new(geofences));
        tracing::info!(count, "Geofences reloaded");
    }

    /// Evaluate a position against the company's active geofences and
    /// advance `state`.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate(
        &self,
        state: &mut GeofenceState,
        company_id: Uuid,
        vehicle_id: Uuid,
        driver_id: Option<Uuid>,
        lat: f64,
        lon: f64,
        at: DateTime<Utc>,
    ) -> GeofenceEvaluation {
        let geofences = self.snapshot();
        let mut evaluation = GeofenceEvaluation::default();
        let mut seen = HashMap::with_capacity(geofences.len());

        for geofence in geofences
            .iter()
            .filter(|g| g.is_active && g.company_id == company_id)
        {
            let was_inside = state.is_inside(geofence.id);
            let now_inside = contains(geofence, lat, lon);
            seen.insert(geofence.id, now_inside);

            let kind = match (was_inside, now_inside) {
                (false, true) => Some(GeofenceEventKind::Enter),
                (true, false) => Some(GeofenceEventKind::Exit),
                (true, true) if self.emit_inside_heartbeat => Some(GeofenceEventKind::Inside),
                _ => None,
            };

            if let Some(kind) = kind {
                tracing::debug!(
                    vehicle_id = %vehicle_id,
                    geofence_id = %geofence.id,
                    kind = kind.as_str(),
                    "Geofence transition"
                );
                evaluation.transitions.push(GeofenceTransition {
                    vehicle_id,
                    driver_id,
                    geofence_id: geofence.id,
                    geofence_name: geofence.name.clone(),
                    kind,
                    alert: geofence.alerts_on(kind),
                    latitude: lat,
                    longitude: lon,
                    at,
                });
            }

            if evaluation.membership.is_none() && (now_inside || kind.is_some()) {
                evaluation.membership = Some(GeofenceMembership {
                    geofence_id: geofence.id,
                    geofence_name: geofence.name.clone(),
                    event: kind.unwrap_or(GeofenceEventKind::Inside),
                });
            }
        }

        // Geofences no longer in the snapshot are forgotten without an exit
        state.inside = seen;
        evaluation
    }
}
