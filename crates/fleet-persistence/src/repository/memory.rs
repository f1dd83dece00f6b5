//! In-memory repository implementation.
//!
//! Every table keeps a monotonically increasing version per row. Plain
//! `update` calls bump it unconditionally; the versioned `update` of
//! drivers and invoices is a compare-and-swap under the table's write lock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{PersistenceError, Result};
use crate::repository::traits::{
    DriverEventRepository, DriverRepository, GeofenceRepository, InvoiceRepository,
    PaymentRepository, PerformanceLogRepository, SubscriptionRepository, TelemetryRepository,
    TripRepository, VehicleLogRepository, VehicleRepository, Versioned,
};
use fleet_domain::{
    Driver, DriverEvent, FuelLog, Geofence, GpsTrack, Invoice, InvoiceStatus, MaintenanceLog,
    Pagination, Payment, PerformanceLog, Subscription, TimeRange, Trip, Vehicle,
};

// =============================================================================
// TABLE
// =============================================================================

struct Table<T> {
    entity_type: &'static str,
    rows: RwLock<HashMap<Uuid, Versioned<T>>>,
}

impl<T: Clone + Send + Sync> Table<T> {
    fn new(entity_type: &'static str) -> Self {
        Self {
            entity_type,
            rows: RwLock::new(HashMap::new()),
        }
    }

    async fn get(&self, id: Uuid) -> Option<Versioned<T>> {
        self.rows.read().await.get(&id).cloned()
    }

    async fn filter(&self, pred: impl Fn(&T) -> bool) -> Vec<Versioned<T>> {
        self.rows
            .read()
            .await
            .values()
            .filter(|row| pred(&row.entity))
            .cloned()
            .collect()
    }

    async fn insert(&self, id: Uuid, entity: &T) -> Result<()> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&id) {
            return Err(PersistenceError::AlreadyExists {
                entity_type: self.entity_type,
                key: id.to_string(),
            });
        }
        rows.insert(
            id,
            Versioned {
                version: 1,
                entity: entity.clone(),
            },
        );
        Ok(())
    }

    async fn upsert(&self, id: Uuid, entity: &T) {
        let mut rows = self.rows.write().await;
        let version = rows.get(&id).map_or(1, |row| row.version + 1);
        rows.insert(
            id,
            Versioned {
                version,
                entity: entity.clone(),
            },
        );
    }

    async fn replace(&self, id: Uuid, entity: &T) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| PersistenceError::NotFound {
            entity_type: self.entity_type,
            key: id.to_string(),
        })?;
        row.version += 1;
        row.entity = entity.clone();
        Ok(row.version)
    }

    async fn compare_and_swap(&self, id: Uuid, entity: &T, expected: u64) -> Result<u64> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or_else(|| PersistenceError::NotFound {
            entity_type: self.entity_type,
            key: id.to_string(),
        })?;
        if row.version != expected {
            warn!(
                entity_type = self.entity_type,
                id = %id,
                expected,
                found = row.version,
                "Stale write rejected"
            );
            return Err(PersistenceError::ConcurrentUpdateConflict {
                entity_type: self.entity_type,
                key: id.to_string(),
                expected,
                found: row.version,
            });
        }
        row.version += 1;
        row.entity = entity.clone();
        debug!(entity_type = self.entity_type, id = %id, version = row.version, "Committed");
        Ok(row.version)
    }

    async fn remove(&self, id: Uuid) -> Result<()> {
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PersistenceError::NotFound {
                entity_type: self.entity_type,
                key: id.to_string(),
            })
    }
}

// =============================================================================
// STORE
// =============================================================================

/// Process-local store backing every repository trait
pub struct InMemoryStore {
    vehicles: Table<Vehicle>,
    drivers: Table<Driver>,
    trips: Table<Trip>,
    tracks: RwLock<HashMap<Uuid, Vec<GpsTrack>>>,
    events: RwLock<Vec<DriverEvent>>,
    maintenance_logs: RwLock<Vec<MaintenanceLog>>,
    fuel_logs: RwLock<Vec<FuelLog>>,
    performance_logs: Table<PerformanceLog>,
    geofences: Table<Geofence>,
    subscriptions: Table<Subscription>,
    payments: Table<Payment>,
    invoices: Table<Invoice>,
}

impl InMemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            vehicles: Table::new("vehicle"),
            drivers: Table::new("driver"),
            trips: Table::new("trip"),
            tracks: RwLock::new(HashMap::new()),
            events: RwLock::new(Vec::new()),
            maintenance_logs: RwLock::new(Vec::new()),
            fuel_logs: RwLock::new(Vec::new()),
            performance_logs: Table::new("performance_log"),
            geofences: Table::new("geofence"),
            subscriptions: Table::new("subscription"),
            payments: Table::new("payment"),
            invoices: Table::new("invoice"),
        }
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn entities<T>(rows: Vec<Versioned<T>>) -> Vec<T> {
    rows.into_iter().map(|row| row.entity).collect()
}

#[async_trait]
impl VehicleRepository for InMemoryStore {
    async fn get_by_id(&self, vehicle_id: Uuid) -> Result<Option<Vehicle>> {
        Ok(self.vehicles.get(vehicle_id).await.map(|row| row.entity))
    }

    async fn get_by_company(&self, company_id: Uuid) -> Result<Vec<Vehicle>> {
        Ok(entities(self.vehicles.filter(|v| v.company_id == company_id).await))
    }

    async fn create(&self, vehicle: &Vehicle) -> Result<()> {
        self.vehicles.insert(vehicle.id, vehicle).await
    }

    async fn update(&self, vehicle: &Vehicle) -> Result<()> {
        self.vehicles.replace(vehicle.id, vehicle).await.map(|_| ())
    }
}

#[async_trait]
impl VehicleLogRepository for InMemoryStore {
    async fn get_maintenance(&self, vehicle_id: Uuid) -> Result<Vec<MaintenanceLog>> {
        let mut logs: Vec<_> = self
            .maintenance_logs
            .read()
            .await
            .iter()
            .filter(|l| l.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    async fn insert_maintenance(&self, log: &MaintenanceLog) -> Result<()> {
        self.maintenance_logs.write().await.push(log.clone());
        Ok(())
    }

    async fn get_fuel(&self, vehicle_id: Uuid) -> Result<Vec<FuelLog>> {
        let mut logs: Vec<_> = self
            .fuel_logs
            .read()
            .await
            .iter()
            .filter(|l| l.vehicle_id == vehicle_id)
            .cloned()
            .collect();
        logs.sort_by_key(|l| l.created_at);
        Ok(logs)
    }

    async fn insert_fuel(&self, log: &FuelLog) -> Result<()> {
        self.fuel_logs.write().await.push(log.clone());
        Ok(())
    }
}

#[async_trait]
impl DriverRepository for InMemoryStore {
    async fn get_by_id(&self, driver_id: Uuid) -> Result<Option<Versioned<Driver>>> {
        Ok(self.drivers.get(driver_id).await)
    }

    async fn get_by_company(&self, company_id: Uuid) -> Result<Vec<Driver>> {
        Ok(entities(self.drivers.filter(|d| d.company_id == company_id).await))
    }

    async fn create(&self, driver: &Driver) -> Result<()> {
        self.drivers.insert(driver.id, driver).await
    }

    async fn update(&self, driver: &Driver, expected_version: u64) -> Result<u64> {
        self.drivers
            .compare_and_swap(driver.id, driver, expected_version)
            .await
    }
}

#[async_trait]
impl PerformanceLogRepository for InMemoryStore {
    async fn get_by_driver(&self, driver_id: Uuid) -> Result<Vec<PerformanceLog>> {
        let mut logs = entities(self.performance_logs.filter(|l| l.driver_id == driver_id).await);
        logs.sort_by_key(|l| l.period_start);
        Ok(logs)
    }

    async fn insert(&self, log: &PerformanceLog) -> Result<()> {
        self.performance_logs.insert(log.id, log).await
    }
}

#[async_trait]
impl TripRepository for InMemoryStore {
    async fn get_by_id(&self, trip_id: Uuid) -> Result<Option<Trip>> {
        Ok(self.trips.get(trip_id).await.map(|row| row.entity))
    }

    async fn get_by_vehicle(&self, vehicle_id: Uuid, page: Pagination) -> Result<Vec<Trip>> {
        let mut trips = entities(self.trips.filter(|t| t.vehicle_id == vehicle_id).await);
        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trips
            .into_iter()
            .skip(page.offset)
            .take(page.limit)
            .collect())
    }

    async fn get_by_driver(&self, driver_id: Uuid, range: TimeRange) -> Result<Vec<Trip>> {
        Ok(entities(
            self.trips
                .filter(|t| t.driver_id == Some(driver_id) && t.end_time.is_some_and(|end| range.contains(end)))
                .await,
        ))
    }

    async fn create(&self, trip: &Trip) -> Result<()> {
        self.trips.insert(trip.id, trip).await
    }

    async fn update(&self, trip: &Trip) -> Result<()> {
        self.trips.replace(trip.id, trip).await.map(|_| ())
    }
}

#[async_trait]
impl TelemetryRepository for InMemoryStore {
    async fn get_by_vehicle_range(
        &self,
        vehicle_id: Uuid,
        range: TimeRange,
        limit: Option<usize>,
    ) -> Result<Vec<GpsTrack>> {
        let tracks = self.tracks.read().await;
        let Some(history) = tracks.get(&vehicle_id) else {
            return Ok(Vec::new());
        };
        Ok(history
            .iter()
            .filter(|t| range.contains(t.timestamp))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_latest(&self, vehicle_id: Uuid) -> Result<Option<GpsTrack>> {
        Ok(self
            .tracks
            .read()
            .await
            .get(&vehicle_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn insert(&self, track: &GpsTrack) -> Result<()> {
        self.tracks
            .write()
            .await
            .entry(track.vehicle_id)
            .or_default()
            .push(track.clone());
        Ok(())
    }
}

#[async_trait]
impl DriverEventRepository for InMemoryStore {
    async fn get_by_driver(&self, driver_id: Uuid, range: TimeRange) -> Result<Vec<DriverEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.driver_id == driver_id && range.contains(e.occurred_at))
            .cloned()
            .collect())
    }

    async fn get_by_trip(&self, trip_id: Uuid) -> Result<Vec<DriverEvent>> {
        Ok(self
            .events
            .read()
            .await
            .iter()
            .filter(|e| e.trip_id == Some(trip_id))
            .cloned()
            .collect())
    }

    async fn insert(&self, event: &DriverEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl GeofenceRepository for InMemoryStore {
    async fn get_active(&self) -> Result<Vec<Geofence>> {
        Ok(entities(self.geofences.filter(|g| g.is_active).await))
    }

    async fn get_by_company(&self, company_id: Uuid) -> Result<Vec<Geofence>> {
        Ok(entities(self.geofences.filter(|g| g.company_id == company_id).await))
    }

    async fn upsert(&self, geofence: &Geofence) -> Result<()> {
        self.geofences.upsert(geofence.id, geofence).await;
        Ok(())
    }

    async fn delete(&self, geofence_id: Uuid) -> Result<()> {
        self.geofences.remove(geofence_id).await
    }
}

#[async_trait]
impl SubscriptionRepository for InMemoryStore {
    async fn get_by_company(&self, company_id: Uuid) -> Result<Option<Subscription>> {
        Ok(entities(self.subscriptions.filter(|s| s.company_id == company_id).await)
            .into_iter()
            .max_by_key(|s| s.start_date))
    }

    async fn create(&self, subscription: &Subscription) -> Result<()> {
        self.subscriptions.insert(subscription.id, subscription).await
    }

    async fn update(&self, subscription: &Subscription) -> Result<()> {
        self.subscriptions
            .replace(subscription.id, subscription)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn get_by_id(&self, payment_id: Uuid) -> Result<Option<Payment>> {
        Ok(self.payments.get(payment_id).await.map(|row| row.entity))
    }

    async fn create(&self, payment: &Payment) -> Result<()> {
        self.payments.insert(payment.id, payment).await
    }

    async fn update(&self, payment: &Payment) -> Result<()> {
        self.payments.replace(payment.id, payment).await.map(|_| ())
    }
}

#[async_trait]
impl InvoiceRepository for InMemoryStore {
    async fn get_by_id(&self, invoice_id: Uuid) -> Result<Option<Versioned<Invoice>>> {
        Ok(self.invoices.get(invoice_id).await)
    }

    async fn get_by_status(&self, status: InvoiceStatus) -> Result<Vec<Versioned<Invoice>>> {
        Ok(self.invoices.filter(|i| i.status == status).await)
    }

    async fn create(&self, invoice: &Invoice) -> Result<()> {
        self.invoices.insert(invoice.id, invoice).await
    }

    async fn update(&self, invoice: &Invoice, expected_version: u64) -> Result<u64> {
        self.invoices
            .compare_and_swap(invoice.id, invoice, expected_version)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use fleet_domain::Coordinates;
    use rust_decimal_macros::dec;

    fn invoice() -> Invoice {
        let now = Utc::now();
        Invoice::new(
            Uuid::new_v4(),
            "INV-1",
            dec!(100000),
            dec!(11000),
            now + Duration::days(7),
            now,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_invoice_compare_and_swap() {
        let store = InMemoryStore::new();
        let inv = invoice();
        InvoiceRepository::create(&store, &inv).await.unwrap();

        let read_a = InvoiceRepository::get_by_id(&store, inv.id).await.unwrap().unwrap();
        let read_b = InvoiceRepository::get_by_id(&store, inv.id).await.unwrap().unwrap();
        assert_eq!(read_a.version, 1);

        let mut a = read_a.entity;
        a.apply_payment(dec!(50000), None, Utc::now()).unwrap();
        let v2 = InvoiceRepository::update(&store, &a, read_a.version).await.unwrap();
        assert_eq!(v2, 2);

        let mut b = read_b.entity;
        b.apply_payment(dec!(10000), None, Utc::now()).unwrap();
        let err = InvoiceRepository::update(&store, &b, read_b.version)
            .await
            .unwrap_err();
        assert!(err.is_conflict());

        let stored = InvoiceRepository::get_by_id(&store, inv.id).await.unwrap().unwrap();
        assert_eq!(stored.entity.paid_amount, dec!(50000));
    }

    #[tokio::test]
    async fn test_duplicate_create_rejected() {
        let store = InMemoryStore::new();
        let vehicle = Vehicle::new(Uuid::new_v4(), "B 1 AA", Utc::now());
        VehicleRepository::create(&store, &vehicle).await.unwrap();
        let err = VehicleRepository::create(&store, &vehicle).await.unwrap_err();
        assert!(matches!(err, PersistenceError::AlreadyExists { .. }));
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = InMemoryStore::new();
        let trip = Trip::planned(Uuid::new_v4(), Uuid::new_v4(), None, "x", Utc::now());
        let err = TripRepository::update(&store, &trip).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_trips_by_driver_filter_on_end_time() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let driver_id = Uuid::new_v4();
        let mut ended = Trip::planned(Uuid::new_v4(), Uuid::new_v4(), Some(driver_id), "ended", now);
        ended.end_time = Some(now);
        let open = Trip::planned(Uuid::new_v4(), Uuid::new_v4(), Some(driver_id), "open", now);
        TripRepository::create(&store, &ended).await.unwrap();
        TripRepository::create(&store, &open).await.unwrap();

        let range = TimeRange {
            start: now - Duration::hours(1),
            end: now + Duration::hours(1),
        };
        let found = TripRepository::get_by_driver(&store, driver_id, range).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, ended.id);
        assert!(TripRepository::get_by_driver(&store, Uuid::new_v4(), range).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_vehicle_logs_per_vehicle() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        let vehicle_id = Uuid::new_v4();
        let late = fleet_domain::FuelLog::new(vehicle_id, "solar", 20.0, dec!(6800), 1200.0, now).unwrap();
        let early =
            fleet_domain::FuelLog::new(vehicle_id, "solar", 30.0, dec!(6800), 1000.0, now - Duration::days(3)).unwrap();
        let other = fleet_domain::FuelLog::new(Uuid::new_v4(), "solar", 10.0, dec!(6800), 0.0, now).unwrap();
        for log in [&late, &early, &other] {
            store.insert_fuel(log).await.unwrap();
        }

        let fuel = store.get_fuel(vehicle_id).await.unwrap();
        assert_eq!(fuel.len(), 2);
        assert_eq!(fuel[0].id, early.id);
        assert!(store.get_maintenance(vehicle_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_active_geofences_only() {
        let store = InMemoryStore::new();
        let company = Uuid::new_v4();
        let geometry = fleet_domain::GeofenceGeometry::Circle {
            center: Coordinates::default(),
            radius_m: 100.0,
        };
        let active = Geofence::new(company, "Depot", geometry.clone());
        let mut inactive = Geofence::new(company, "Old yard", geometry);
        inactive.is_active = false;

        store.upsert(&active).await.unwrap();
        store.upsert(&inactive).await.unwrap();

        let found = store.get_active().await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "Depot");
        assert_eq!(GeofenceRepository::get_by_company(&store, company).await.unwrap().len(), 2);
    }
}
