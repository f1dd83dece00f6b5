//! Companies, fleet vehicles and their maintenance and fuel records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::DocumentKind;
use crate::error::{DomainError, Result};
use crate::geodesy::Coordinates;

/// Default distance between scheduled services, in kilometres.
pub const DEFAULT_SERVICE_INTERVAL_KM: f64 = 10_000.0;

// =============================================================================
// ENUMS
// =============================================================================

/// Vehicle operational status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VehicleStatus {
    #[default]
    Active,
    Maintenance,
    Retired,
    Inactive,
}

impl VehicleStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Maintenance => "maintenance",
            Self::Retired => "retired",
            Self::Inactive => "inactive",
        }
    }
}

/// Kind of workshop visit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaintenanceType {
    Service,
    Repair,
    Inspection,
}

impl MaintenanceType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Service => "service",
            Self::Repair => "repair",
            Self::Inspection => "inspection",
        }
    }
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Company entity - tenant that owns vehicles, drivers and geofences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Company {
    pub id: Uuid,
    pub name: String,
    pub company_type: String, // PT, CV, ...
    pub npwp: String,         // tax number
    pub subscription_tier: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Company {
    #[must_use]
    pub fn has_valid_npwp(&self) -> bool {
        DocumentKind::Npwp.is_valid(&self.npwp)
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        if self.company_type.is_empty() {
            self.name.clone()
        } else {
            format!("{} {}", self.company_type, self.name)
        }
    }
}

/// Vehicle entity - a tracked fleet unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: Uuid,
    pub company_id: Uuid,
    pub driver_id: Option<Uuid>,

    // Identification
    pub license_plate: String,
    pub vin: String,
    pub make: String,
    pub model: String,
    pub year: u16,
    pub vehicle_type: String,
    pub fuel_type: String,
    pub fuel_capacity_l: f64,

    // Registration papers
    pub stnk: String,
    pub bpkb: String,
    pub stnk_expiry: Option<DateTime<Utc>>,

    // Status
    pub status: VehicleStatus,
    pub is_active: bool,
    pub gps_enabled: bool,
    pub fuel_tracking: bool,

    // Location
    pub last_location: Option<Coordinates>,
    pub last_updated_at: Option<DateTime<Utc>>,

    // Running state
    pub odometer_km: f64,
    pub total_distance_km: f64,
    pub current_fuel_level_l: f64,
    pub fuel_efficiency_km_l: f64,

    // Maintenance
    pub service_interval_km: f64,
    pub last_service_odometer_km: Option<f64>,
    pub next_service_date: Option<DateTime<Utc>>,
    pub maintenance_cost: Decimal,

    // Valuation, straight-line from `created_at`
    pub purchase_price: Decimal,
    /// Percent of the purchase price lost per year
    pub depreciation_rate_pct: Decimal,
    /// Value used when no depreciation schedule is set
    pub book_value: Decimal,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vehicle {
    /// New active, GPS-enabled vehicle with the default service interval.
    #[must_use]
    pub fn new(company_id: Uuid, license_plate: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            driver_id: None,
            license_plate: license_plate.into(),
            vin: String::new(),
            make: String::new(),
            model: String::new(),
            year: 0,
            vehicle_type: String::new(),
            fuel_type: String::new(),
            fuel_capacity_l: 0.0,
            stnk: String::new(),
            bpkb: String::new(),
            stnk_expiry: None,
            status: VehicleStatus::Active,
            is_active: true,
            gps_enabled: true,
            fuel_tracking: true,
            last_location: None,
            last_updated_at: None,
            odometer_km: 0.0,
            total_distance_km: 0.0,
            current_fuel_level_l: 0.0,
            fuel_efficiency_km_l: 0.0,
            service_interval_km: DEFAULT_SERVICE_INTERVAL_KM,
            last_service_odometer_km: None,
            next_service_date: None,
            maintenance_cost: Decimal::ZERO,
            purchase_price: Decimal::ZERO,
            depreciation_rate_pct: Decimal::ZERO,
            book_value: Decimal::ZERO,
            created_at: now,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} - {} {} ({})", self.license_plate, self.make, self.model, self.year)
    }

    #[must_use]
    pub fn can_track_gps(&self) -> bool {
        self.gps_enabled && self.is_active && self.status == VehicleStatus::Active
    }

    #[must_use]
    pub fn can_be_assigned(&self) -> bool {
        self.is_active && self.status == VehicleStatus::Active && self.driver_id.is_none()
    }

    /// Attach a driver. Fails if the vehicle is unavailable or already taken.
    pub fn assign_driver(&mut self, driver_id: Uuid) -> Result<()> {
        if !self.can_be_assigned() {
            return Err(DomainError::InvariantViolation(format!(
                "vehicle {} cannot be assigned (status {}, driver {:?})",
                self.id,
                self.status.as_str(),
                self.driver_id
            )));
        }
        self.driver_id = Some(driver_id);
        Ok(())
    }

    /// Detach the current driver, returning it.
    pub fn unassign_driver(&mut self) -> Option<Uuid> {
        self.driver_id.take()
    }

    pub fn update_location(&mut self, location: Coordinates, at: DateTime<Utc>) {
        self.last_location = Some(location);
        self.last_updated_at = Some(at);
        self.updated_at = at;
    }

    /// Negative or non-finite distances are ignored.
    pub fn add_distance(&mut self, distance_km: f64) {
        if distance_km.is_finite() && distance_km > 0.0 {
            self.total_distance_km += distance_km;
            self.odometer_km += distance_km;
        }
    }

    pub fn update_fuel_level(&mut self, level_l: f64) {
        self.current_fuel_level_l = if self.fuel_capacity_l > 0.0 {
            level_l.clamp(0.0, self.fuel_capacity_l)
        } else {
            level_l.max(0.0)
        };
    }

    /// Due by calendar when a next service date is set, otherwise by odometer
    /// once a last service is on record.
    #[must_use]
    pub fn is_maintenance_due(&self, now: DateTime<Utc>) -> bool {
        if let Some(next) = self.next_service_date {
            return now > next;
        }
        self.last_service_odometer_km
            .is_some_and(|last| self.odometer_km >= last + self.service_interval_km)
    }

    pub fn record_service(&mut self, now: DateTime<Utc>) {
        self.last_service_odometer_km = Some(self.odometer_km);
        self.next_service_date = None;
        self.updated_at = now;
    }

    /// Set the STNK and BPKB numbers after checking their format.
    pub fn set_registration(&mut self, stnk: &str, bpkb: &str, now: DateTime<Utc>) -> Result<()> {
        DocumentKind::Stnk.validate(stnk)?;
        DocumentKind::Bpkb.validate(bpkb)?;
        self.stnk = stnk.to_string();
        self.bpkb = bpkb.to_string();
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn is_registration_expired(&self, now: DateTime<Utc>) -> bool {
        self.stnk_expiry.is_some_and(|expiry| now > expiry)
    }

    /// Kilometres per litre over a stretch. Ignored without fuel burned.
    pub fn calculate_fuel_efficiency(&mut self, distance_km: f64, fuel_consumed_l: f64) {
        if fuel_consumed_l > 0.0 && distance_km.is_finite() && distance_km >= 0.0 {
            self.fuel_efficiency_km_l = distance_km / fuel_consumed_l;
        }
    }

    /// Straight-line depreciated value at `now`, floored at zero. Without a
    /// purchase price or rate the stored book value stands.
    #[must_use]
    pub fn current_value(&self, now: DateTime<Utc>) -> Decimal {
        if self.purchase_price.is_zero() || self.depreciation_rate_pct.is_zero() {
            return self.book_value;
        }
        let hours = (now - self.created_at).num_hours().max(0);
        let years = Decimal::from(hours) / Decimal::from(HOURS_PER_YEAR);
        let depreciation = self.purchase_price * self.depreciation_rate_pct / Decimal::ONE_HUNDRED * years;
        (self.purchase_price - depreciation)
            .max(Decimal::ZERO)
            .round_dp(2)
    }

    /// Book a workshop visit. A service also restarts the service interval.
    pub fn record_maintenance(&mut self, log: &MaintenanceLog, now: DateTime<Utc>) -> Result<()> {
        if log.vehicle_id != self.id {
            return Err(DomainError::InvariantViolation(format!(
                "maintenance log {} is for vehicle {}",
                log.id, log.vehicle_id
            )));
        }
        self.maintenance_cost += log.cost;
        if log.maintenance_type == MaintenanceType::Service {
            self.record_service(now);
        }
        self.updated_at = now;
        Ok(())
    }

    /// Book a refuel: the tank gains the quantity, capped at capacity.
    pub fn record_refuel(&mut self, log: &FuelLog, now: DateTime<Utc>) -> Result<()> {
        if log.vehicle_id != self.id {
            return Err(DomainError::InvariantViolation(format!(
                "fuel log {} is for vehicle {}",
                log.id, log.vehicle_id
            )));
        }
        self.update_fuel_level(self.current_fuel_level_l + log.quantity_l);
        self.updated_at = now;
        Ok(())
    }
}

const HOURS_PER_YEAR: i64 = 24 * 365;

// =============================================================================
// VEHICLE LOGS
// =============================================================================

/// One workshop visit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaintenanceLog {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub maintenance_type: MaintenanceType,
    pub description: String,
    pub cost: Decimal,
    pub odometer_km: f64,
    pub performed_by: String,
    pub location: String,
    pub created_at: DateTime<Utc>,
}

impl MaintenanceLog {
    /// Negative costs are rejected.
    pub fn new(
        vehicle_id: Uuid,
        maintenance_type: MaintenanceType,
        description: impl Into<String>,
        cost: Decimal,
        odometer_km: f64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if cost.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "maintenance cost must be non-negative, got {cost}"
            )));
        }
        Ok(Self {
            id: Uuid::new_v4(),
            vehicle_id,
            maintenance_type,
            description: description.into(),
            cost,
            odometer_km,
            performed_by: String::new(),
            location: String::new(),
            created_at: now,
        })
    }
}

/// One refuelling stop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuelLog {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub fuel_type: String,
    pub quantity_l: f64,
    pub price_per_liter: Decimal,
    /// `quantity_l * price_per_liter`, rounded to the rupiah cent
    pub cost: Decimal,
    pub station_name: String,
    pub location: String,
    pub odometer_km: f64,
    pub created_at: DateTime<Utc>,
}

impl FuelLog {
    /// The quantity must be positive and the price non-negative.
    pub fn new(
        vehicle_id: Uuid,
        fuel_type: impl Into<String>,
        quantity_l: f64,
        price_per_liter: Decimal,
        odometer_km: f64,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        if !(quantity_l.is_finite() && quantity_l > 0.0) || price_per_liter.is_sign_negative() {
            return Err(DomainError::InvariantViolation(format!(
                "fuel log needs a positive quantity and price (quantity {quantity_l}, price {price_per_liter})"
            )));
        }
        let quantity = Decimal::from_f64_retain(quantity_l).ok_or_else(|| {
            DomainError::InvariantViolation(format!("fuel quantity {quantity_l} is not representable"))
        })?;
        Ok(Self {
            id: Uuid::new_v4(),
            vehicle_id,
            fuel_type: fuel_type.into(),
            quantity_l,
            price_per_liter,
            cost: (quantity * price_per_liter).round_dp(2),
            station_name: String::new(),
            location: String::new(),
            odometer_km,
            created_at: now,
        })
    }
}

/// Kilometres per litre across a series of fills, oldest first. The first
/// fill only sets the starting odometer, so at least two are needed.
#[must_use]
pub fn fuel_efficiency_from_logs(logs: &[FuelLog]) -> Option<f64> {
    let (first, rest) = logs.split_first()?;
    let last = rest.last()?;
    let distance = last.odometer_km - first.odometer_km;
    let fuel: f64 = rest.iter().map(|l| l.quantity_l).sum();
    (distance > 0.0 && fuel > 0.0).then(|| distance / fuel)
}
