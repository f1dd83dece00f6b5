//! # Repository Traits
//!
//! Abstract repository interfaces for domain entities, keyed by `Uuid`.
//! Entities that are mutated concurrently (drivers, invoices) are read with
//! their version and written back with compare-and-swap.

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use fleet_domain::{
    Driver, DriverEvent, FuelLog, Geofence, GpsTrack, Invoice, InvoiceStatus, MaintenanceLog,
    Pagination, Payment, PerformanceLog, Subscription, TimeRange, Trip, Vehicle,
};

/// An entity together with the version it was read at
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned<T> {
    pub version: u64,
    pub entity: T,
}

// =============================================================================
// VEHICLE REPOSITORY
// =============================================================================

/// Repository for Vehicle entity operations
#[async_trait]
pub trait VehicleRepository: Send + Sync {
    /// Get vehicle by ID
    async fn get_by_id(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>>;

    /// Get all vehicles of a company
    async fn get_by_company(&self, company_id: Uuid) -> Result<Vec<Vehicle>>;

    /// Create a new vehicle
    async fn create(&self, vehicle: &Vehicle) -> Result<()>;

    /// Replace the stored vehicle state
    async fn update(&self, vehicle: &Vehicle) -> Result<()>;
}

/// Repository for vehicle maintenance and fuel records
#[async_trait]
pub trait VehicleLogRepository: Send + Sync {
    /// Get maintenance records of a vehicle, oldest first
    async fn get_maintenance(&self, vehicle_id: Uuid) -> Result<Vec<MaintenanceLog>>;

    /// Insert maintenance record
    async fn insert_maintenance(&self, log: &MaintenanceLog) -> Result<()>;

    /// Get fuel records of a vehicle, oldest first
    async fn get_fuel(&self, vehicle_id: Uuid) -> Result<Vec<FuelLog>>;

    /// Insert fuel record
    async fn insert_fuel(&self, log: &FuelLog) -> Result<()>;
}

// =============================================================================
// DRIVER REPOSITORY
// =============================================================================

/// Repository for Driver entity operations
#[async_trait]
pub trait DriverRepository: Send + Sync {
    /// Get driver by ID with its current version
    async fn get_by_id(&self, driver_id: Uuid) -> Result<Option<Versioned<Driver>>>;

    /// Get all drivers of a company
    async fn get_by_company(&self, company_id: Uuid) -> Result<Vec<Driver>>;

    /// Create a new driver at version 1
    async fn create(&self, driver: &Driver) -> Result<()>;

    /// Write `driver` if the stored version still equals `expected_version`.
    /// Returns the new version.
    async fn update(&self, driver: &Driver, expected_version: u64) -> Result<u64>;
}

/// Repository for periodic driver performance logs
#[async_trait]
pub trait PerformanceLogRepository: Send + Sync {
    /// Get logs of a driver, oldest period first
    async fn get_by_driver(&self, driver_id: Uuid) -> Result<Vec<PerformanceLog>>;

    /// Insert log record
    async fn insert(&self, log: &PerformanceLog) -> Result<()>;
}

// =============================================================================
// TRIP REPOSITORY
// =============================================================================

/// Repository for Trip entity operations
#[async_trait]
pub trait TripRepository: Send + Sync {
    /// Get trip by ID
    async fn get_by_id(&self, trip_id: Uuid) -> Result<Option<Trip>>;

    /// Get trips of a vehicle, newest first
    async fn get_by_vehicle(&self, vehicle_id: Uuid, page: Pagination) -> Result<Vec<Trip>>;

    /// Get trips of a driver that ended within a time range
    async fn get_by_driver(&self, driver_id: Uuid, range: TimeRange) -> Result<Vec<Trip>>;

    /// Create a new trip
    async fn create(&self, trip: &Trip) -> Result<()>;

    /// Replace the stored trip state
    async fn update(&self, trip: &Trip) -> Result<()>;
}

// =============================================================================
// TELEMETRY REPOSITORY
// =============================================================================

/// Repository for accepted GPS tracks
#[async_trait]
pub trait TelemetryRepository: Send + Sync {
    /// Get tracks for a vehicle within a time range, oldest first
    async fn get_by_vehicle_range(
        &self,
        vehicle_id: Uuid,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<GpsTrack>>;

    /// Get latest track for a vehicle
    async fn get_latest(&self, vehicle_id: Uuid) -> Result<Option<GpsTrack>>;

    /// Insert track record
    async fn insert(&self, track: &GpsTrack) -> Result<()>;
}

// =============================================================================
// DRIVER EVENT REPOSITORY
// =============================================================================

/// Repository for detected behavior events
#[async_trait]
pub trait DriverEventRepository: Send + Sync {
    /// Get events for a driver within a time range
    async fn get_by_driver(&self, driver_id: Uuid, range: TimeRange) -> Result<Vec<DriverEvent>>;

    /// Get events recorded during a trip
    async fn get_by_trip(&self, trip_id: Uuid) -> Result<Vec<DriverEvent>>;

    /// Insert event record
    async fn insert(&self, event: &DriverEvent) -> Result<()>;
}

// =============================================================================
// GEOFENCE REPOSITORY
// =============================================================================

/// Repository for Geofence definitions
#[async_trait]
pub trait GeofenceRepository: Send + Sync {
    /// Get all active geofences
    async fn get_active(&self) -> Result<Vec<Geofence>>;

    /// Get geofences of a company
    async fn get_by_company(&self, company_id: Uuid) -> Result<Vec<Geofence>>;

    /// Create or replace a geofence
    async fn upsert(&self, geofence: &Geofence) -> Result<()>;

    /// Delete geofence
    async fn delete(&self, geofence_id: Uuid) -> Result<()>;
}

// =============================================================================
// BILLING REPOSITORIES
// =============================================================================

/// Repository for Subscription operations
#[async_trait]
pub trait SubscriptionRepository: Send + Sync {
    /// Get the most recent subscription of a company
    async fn get_by_company(&self, company_id: Uuid) -> Result<Option<Subscription>>;

    /// Create a new subscription
    async fn create(&self, subscription: &Subscription) -> Result<()>;

    /// Replace the stored subscription state
    async fn update(&self, subscription: &Subscription) -> Result<()>;
}

/// Repository for Payment operations
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Get payment by ID
    async fn get_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>>;

    /// Create a new payment
    async fn create(&self, payment: &Payment) -> Result<()>;

    /// Replace the stored payment state
    async fn update(&self, payment: &Payment) -> Result<()>;
}

/// Repository for Invoice operations
#[async_trait]
pub trait InvoiceRepository: Send + Sync {
    /// Get invoice by ID with its current version
    async fn get_by_id(&self, invoice_id: Uuid) -> Result<Option<Versioned<Invoice>>>;

    /// Get invoices by status
    async fn get_by_status(&self, status: InvoiceStatus) -> Result<Vec<Versioned<Invoice>>>;

    /// Create a new invoice at version 1
    async fn create(&self, invoice: &Invoice) -> Result<()>;

    /// Write `invoice` if the stored version still equals `expected_version`.
    /// Returns the new version.
    async fn update(&self, invoice: &Invoice, expected_version: u64) -> Result<u64>;
}
