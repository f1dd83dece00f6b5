//! Telemetry samples, trips, geofences and the severity tier table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, Result};
use crate::geodesy::{self, Coordinates};

/// Upper bound of a physically plausible road speed.
pub const MAX_SPEED_KMH: f64 = 300.0;

/// Speed under which a running vehicle counts as idling.
pub const DEFAULT_IDLE_SPEED_KMH: f64 = 5.0;

// =============================================================================
// ENUMS
// =============================================================================

/// Violation severity tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Map a percentage above a threshold onto its tier.
    ///
    /// `<15` low, `[15,30)` medium, `[30,50)` high, `>=50` critical.
    #[must_use]
    pub fn from_exceedance_pct(pct: f64) -> Self {
        match pct {
            p if p >= 50.0 => Self::Critical,
            p if p >= 30.0 => Self::High,
            p if p >= 15.0 => Self::Medium,
            _ => Self::Low,
        }
    }

    /// Tier for a measured value that exceeds `threshold`.
    #[must_use]
    pub fn for_exceedance(measured: f64, threshold: f64) -> Self {
        if threshold <= 0.0 {
            return Self::Critical;
        }
        Self::from_exceedance_pct((measured - threshold) / threshold * 100.0)
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

/// Behavior event kinds raised by the detector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    HarshBraking,
    RapidAcceleration,
    SharpCornering,
    Speeding,
    Idling,
}

impl EventType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::HarshBraking => "harsh_braking",
            Self::RapidAcceleration => "rapid_acceleration",
            Self::SharpCornering => "sharp_cornering",
            Self::Speeding => "speeding",
            Self::Idling => "idling",
        }
    }

    /// Idling is recorded but does not count against the driver.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        !matches!(self, Self::Idling)
    }
}

/// Road classification used to look up a configured speed limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoadClass {
    City,
    Highway,
    Unclassified,
}

/// Trip lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TripStatus {
    #[default]
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl TripStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

/// Geofence transition kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeofenceEventKind {
    Enter,
    Exit,
    Inside,
}

impl GeofenceEventKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Enter => "enter",
            Self::Exit => "exit",
            Self::Inside => "inside",
        }
    }
}

// =============================================================================
// SPEED VIOLATION
// =============================================================================

/// Result of comparing a speed against a known limit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpeedViolation {
    pub speed_kmh: f64,
    pub limit_kmh: f64,
    pub over_speed_kmh: f64,
    pub percentage: f64,
    pub severity: Severity,
}

impl SpeedViolation {
    /// `None` unless the limit is known (`> 0`) and strictly exceeded.
    #[must_use]
    pub fn evaluate(speed_kmh: f64, limit_kmh: f64) -> Option<Self> {
        if limit_kmh <= 0.0 || speed_kmh <= limit_kmh {
            return None;
        }
        let over_speed_kmh = speed_kmh - limit_kmh;
        let percentage = over_speed_kmh / limit_kmh * 100.0;
        Some(Self {
            speed_kmh,
            limit_kmh,
            over_speed_kmh,
            percentage,
            severity: Severity::from_exceedance_pct(percentage),
        })
    }
}

// =============================================================================
// GPS TRACK
// =============================================================================

/// Geofence membership stamped onto an accepted sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeofenceMembership {
    pub geofence_id: Uuid,
    pub geofence_name: String,
    pub event: GeofenceEventKind,
}

/// Behavior flags computed for a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct BehaviorFlags {
    pub harsh_braking: bool,
    pub rapid_acceleration: bool,
    pub sharp_cornering: bool,
    pub speeding: bool,
    pub idling: bool,
}

impl BehaviorFlags {
    /// Raised flags in a stable order.
    #[must_use]
    pub fn raised(&self) -> Vec<EventType> {
        [
            (self.harsh_braking, EventType::HarshBraking),
            (self.rapid_acceleration, EventType::RapidAcceleration),
            (self.sharp_cornering, EventType::SharpCornering),
            (self.speeding, EventType::Speeding),
            (self.idling, EventType::Idling),
        ]
        .into_iter()
        .filter_map(|(on, kind)| on.then_some(kind))
        .collect()
    }
}

/// Accepted, enriched telemetry sample. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsTrack {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Option<Uuid>,
    pub trip_id: Option<Uuid>,

    // Position & movement
    pub latitude: f64,
    pub longitude: f64,
    pub altitude_m: f64,
    pub heading_deg: f64,
    pub speed_kmh: f64,

    // Fix quality
    pub accuracy_m: Option<f64>,
    pub satellites: u8,
    pub hdop: Option<f64>,
    pub low_accuracy: bool,

    // Vehicle state
    pub ignition_on: bool,
    pub engine_on: bool,
    pub moving: bool,
    pub fuel_level_l: Option<f64>,

    // Distance
    pub distance_km: f64,
    pub odometer_km: f64,

    // Behavior
    pub flags: BehaviorFlags,
    pub speed_limit_kmh: Option<f64>,
    pub violation_severity: Option<Severity>,

    // Geofencing
    pub geofence: Option<GeofenceMembership>,

    pub timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
}

impl GpsTrack {
    #[must_use]
    pub const fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.latitude, self.longitude)
    }

    /// Range check on coordinates and speed.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        is_valid_reading(self.latitude, self.longitude, self.speed_kmh)
    }

    /// Distance from a previous position, in kilometres.
    #[must_use]
    pub fn distance_from(&self, prev_lat: f64, prev_lon: f64) -> f64 {
        geodesy::distance_km(prev_lat, prev_lon, self.latitude, self.longitude)
    }

    #[must_use]
    pub fn is_idling(&self, idle_speed_kmh: f64) -> bool {
        self.speed_kmh < idle_speed_kmh && self.ignition_on
    }

    #[must_use]
    pub fn is_moving(&self, idle_speed_kmh: f64) -> bool {
        self.speed_kmh > idle_speed_kmh
    }

    #[must_use]
    pub fn is_speeding(&self) -> bool {
        self.speed_violation().is_some()
    }

    #[must_use]
    pub fn speed_violation(&self) -> Option<SpeedViolation> {
        self.speed_limit_kmh
            .and_then(|limit| SpeedViolation::evaluate(self.speed_kmh, limit))
    }
}

/// Validity predicate for a raw reading.
#[must_use]
pub fn is_valid_reading(latitude: f64, longitude: f64, speed_kmh: f64) -> bool {
    Coordinates::new(latitude, longitude).is_valid() && (0.0..=MAX_SPEED_KMH).contains(&speed_kmh)
}

// =============================================================================
// TRIP
// =============================================================================

/// A vehicle journey and its running statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    pub id: Uuid,
    pub company_id: Uuid,
    pub vehicle_id: Uuid,
    pub driver_id: Option<Uuid>,

    pub name: String,
    pub purpose: String,
    pub status: TripStatus,

    // Start / end
    pub start_location: Option<Coordinates>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_location: Option<Coordinates>,
    pub end_time: Option<DateTime<Utc>>,
    pub planned_distance_km: f64,

    // Statistics
    pub total_distance_km: f64,
    pub total_duration_s: i64,
    pub average_speed_kmh: f64,
    pub max_speed_kmh: f64,
    pub idle_time_s: i64,

    // Fuel
    pub fuel_consumed_l: f64,
    pub fuel_efficiency_km_l: f64,
    pub start_fuel_level_l: Option<f64>,
    pub end_fuel_level_l: Option<f64>,

    // Violations
    pub violations: u32,
    pub harsh_braking: u32,
    pub rapid_acceleration: u32,
    pub sharp_cornering: u32,
    pub speeding_events: u32,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Trip {
    /// New trip in `planned` state.
    #[must_use]
    pub fn planned(
        company_id: Uuid,
        vehicle_id: Uuid,
        driver_id: Option<Uuid>,
        name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            vehicle_id,
            driver_id,
            name: name.into(),
            purpose: String::new(),
            status: TripStatus::Planned,
            start_location: None,
            start_time: None,
            end_location: None,
            end_time: None,
            planned_distance_km: 0.0,
            total_distance_km: 0.0,
            total_duration_s: 0,
            average_speed_kmh: 0.0,
            max_speed_kmh: 0.0,
            idle_time_s: 0,
            fuel_consumed_l: 0.0,
            fuel_efficiency_km_l: 0.0,
            start_fuel_level_l: None,
            end_fuel_level_l: None,
            violations: 0,
            harsh_braking: 0,
            rapid_acceleration: 0,
            sharp_cornering: 0,
            speeding_events: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status == TripStatus::Active
    }

    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == TripStatus::Completed
    }

    fn not_active(&self) -> DomainError {
        DomainError::TripNotActive {
            trip_id: self.id.to_string(),
            status: self.status.as_str().to_string(),
        }
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(self.not_active())
        }
    }

    /// `planned -> active`. Any other source state is rejected unchanged.
    pub fn start(
        &mut self,
        now: DateTime<Utc>,
        location: Coordinates,
        fuel_level_l: Option<f64>,
    ) -> Result<()> {
        if self.status != TripStatus::Planned {
            return Err(DomainError::transition("trip", self.status.as_str(), "active"));
        }
        self.status = TripStatus::Active;
        self.start_time = Some(now);
        self.start_location = Some(location);
        self.start_fuel_level_l = fuel_level_l;
        self.updated_at = now;
        Ok(())
    }

    /// Fold one accepted sample into the running totals.
    ///
    /// The average speed is distance-weighted, so stationary samples do not
    /// pull it down.
    pub fn record_movement(
        &mut self,
        distance_km: f64,
        speed_kmh: f64,
        idle_s: i64,
        fuel_used_l: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.ensure_active()?;

        let covered = self.total_distance_km + distance_km;
        if covered > 0.0 {
            self.average_speed_kmh =
                self.average_speed_kmh.mul_add(self.total_distance_km, speed_kmh * distance_km) / covered;
        }
        self.total_distance_km = covered;
        self.max_speed_kmh = self.max_speed_kmh.max(speed_kmh);
        self.idle_time_s += idle_s.max(0);
        self.fuel_consumed_l += fuel_used_l.max(0.0);
        self.updated_at = now;
        Ok(())
    }

    /// Count a behavior event against the trip. Idling is not a violation.
    pub fn add_violation(&mut self, event_type: EventType) -> Result<()> {
        self.ensure_active()?;
        if !event_type.is_violation() {
            return Ok(());
        }
        self.violations += 1;
        match event_type {
            EventType::HarshBraking => self.harsh_braking += 1,
            EventType::RapidAcceleration => self.rapid_acceleration += 1,
            EventType::SharpCornering => self.sharp_cornering += 1,
            EventType::Speeding => self.speeding_events += 1,
            EventType::Idling => {}
        }
        Ok(())
    }

    /// Duration between start and end, 0 until both are set.
    #[must_use]
    pub fn duration_s(&self) -> i64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => (end - start).num_seconds(),
            _ => 0,
        }
    }

    /// Kilometres per litre, 0 when no fuel was consumed.
    #[must_use]
    pub fn efficiency(&self) -> f64 {
        if self.fuel_consumed_l <= 0.0 {
            return 0.0;
        }
        self.total_distance_km / self.fuel_consumed_l
    }

    /// `active -> completed`, freezing duration and efficiency.
    pub fn end(
        &mut self,
        now: DateTime<Utc>,
        location: Coordinates,
        fuel_level_l: Option<f64>,
    ) -> Result<()> {
        self.ensure_active()?;
        self.status = TripStatus::Completed;
        self.end_time = Some(now);
        self.end_location = Some(location);
        self.end_fuel_level_l = fuel_level_l;
        self.total_duration_s = self.duration_s();
        self.fuel_efficiency_km_l = self.efficiency();
        self.updated_at = now;
        Ok(())
    }

    /// `planned | active -> cancelled`.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(DomainError::transition("trip", self.status.as_str(), "cancelled"));
        }
        self.status = TripStatus::Cancelled;
        self.updated_at = now;
        Ok(())
    }
}

// =============================================================================
// GEOFENCE
// =============================================================================

/// Geofence geometry. Unrecognized `type` tags deserialize to `Unknown`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GeofenceGeometry {
    Circle {
        center: Coordinates,
        radius_m: f64,
    },
    Polygon {
        vertices: Vec<Coordinates>,
    },
    Rectangle {
        south_west: Coordinates,
        north_east: Coordinates,
    },
    #[serde(other)]
    Unknown,
}

impl GeofenceGeometry {
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Circle { .. } => "circle",
            Self::Polygon { .. } => "polygon",
            Self::Rectangle { .. } => "rectangle",
            Self::Unknown => "unknown",
        }
    }
}

/// A company-owned geographical boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geofence {
    pub id: Uuid,
    pub company_id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub geometry: GeofenceGeometry,

    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default = "default_true")]
    pub alert_on_enter: bool,
    #[serde(default = "default_true")]
    pub alert_on_exit: bool,
}

const fn default_true() -> bool {
    true
}

impl Geofence {
    #[must_use]
    pub fn new(company_id: Uuid, name: impl Into<String>, geometry: GeofenceGeometry) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            name: name.into(),
            description: String::new(),
            geometry,
            is_active: true,
            alert_on_enter: true,
            alert_on_exit: true,
        }
    }

    /// Whether a transition of this kind should be surfaced to collaborators.
    #[must_use]
    pub const fn alerts_on(&self, kind: GeofenceEventKind) -> bool {
        match kind {
            GeofenceEventKind::Enter => self.alert_on_enter,
            GeofenceEventKind::Exit => self.alert_on_exit,
            GeofenceEventKind::Inside => true,
        }
    }
}
