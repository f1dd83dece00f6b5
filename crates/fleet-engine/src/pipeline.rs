//! # Telemetry Pipeline
//!
//! One tokio task per registered vehicle, fed by a bounded `mpsc` queue.
//! The task exclusively owns the vehicle's state, its last accepted track,
//! its geofence containment memory and its trip aggregators, so samples of
//! one vehicle are processed strictly in arrival order without locks while
//! different vehicles run in parallel.
//!
//! ```text
//!   ingest(sample) ──► [vehicle queue] ──► VehicleWorker
//!                                            │ validate
//!                                            │ detect
//!                                            │ geofence
//!                                            │ trip aggregate
//!                                            │ persist ──► repositories
//!                                            │ publish ──► EventBus
//!                                            └ score   ──► ScoringService
//! ```
//!
//! A sample's effects are staged first and committed to the worker only
//! after every write succeeded. The writes themselves are not atomic: the
//! track is inserted first, so a later failing write leaves that track in
//! storage while the worker stays at the previous sample. The caller gets
//! the error and the next sample is validated against the previous one.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use uuid::Uuid;

use fleet_domain::{
    Coordinates, DomainError, Driver, DriverEvent, FuelLog, GpsTrack, MaintenanceLog, Trip, Vehicle,
};
use fleet_persistence::{
    DriverEventRepository, DriverRepository, GeofenceRepository, TelemetryRepository,
    TripRepository, VehicleLogRepository, VehicleRepository,
};

use crate::config::PipelineConfig;
use crate::detector::BehaviorDetector;
use crate::error::{EngineError, Result};
use crate::events::{EventBus, FleetEvent};
use crate::geofence::{GeofenceEngine, GeofenceState, GeofenceTransition};
use crate::scoring::ScoringService;
use crate::trip::TripAggregator;
use crate::validator::{TelemetrySample, TelemetryValidator};

// =============================================================================
// PUBLIC TYPES
// =============================================================================

/// Repositories the pipeline writes through
#[derive(Clone)]
pub struct PipelineStores {
    pub vehicles: Arc<dyn VehicleRepository>,
    pub vehicle_logs: Arc<dyn VehicleLogRepository>,
    pub drivers: Arc<dyn DriverRepository>,
    pub trips: Arc<dyn TripRepository>,
    pub telemetry: Arc<dyn TelemetryRepository>,
    pub driver_events: Arc<dyn DriverEventRepository>,
    pub geofences: Arc<dyn GeofenceRepository>,
}

impl PipelineStores {
    /// Use one store for every repository.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: VehicleRepository
            + VehicleLogRepository
            + DriverRepository
            + TripRepository
            + TelemetryRepository
            + DriverEventRepository
            + GeofenceRepository
            + 'static,
    {
        Self {
            vehicles: store.clone(),
            vehicle_logs: store.clone(),
            drivers: store.clone(),
            trips: store.clone(),
            telemetry: store.clone(),
            driver_events: store.clone(),
            geofences: store,
        }
    }
}

/// How a sample related to a trip
#[derive(Debug, Clone, PartialEq)]
pub enum TripAttachment {
    /// No trip named and none active
    None,
    Attached { trip_id: Uuid },
    /// The sample was stored but the trip refused it
    Rejected { trip_id: Uuid, error: DomainError },
}

/// Everything produced for one accepted sample
#[derive(Debug, Clone)]
pub struct ProcessedSample {
    pub track: GpsTrack,
    pub events: Vec<DriverEvent>,
    pub transitions: Vec<GeofenceTransition>,
    pub trip: TripAttachment,
}

// =============================================================================
// PIPELINE
// =============================================================================

type Reply<T> = oneshot::Sender<Result<T>>;

enum Command {
    Ingest {
        sample: Box<TelemetrySample>,
        reply: Reply<ProcessedSample>,
    },
    AssignDriver {
        driver_id: Option<Uuid>,
        reply: Reply<Vehicle>,
    },
    PlanTrip {
        driver_id: Option<Uuid>,
        name: String,
        at: DateTime<Utc>,
        reply: Reply<Trip>,
    },
    StartTrip {
        trip_id: Uuid,
        at: DateTime<Utc>,
        reply: Reply<Trip>,
    },
    EndTrip {
        trip_id: Uuid,
        at: DateTime<Utc>,
        reply: Reply<Trip>,
    },
    CancelTrip {
        trip_id: Uuid,
        at: DateTime<Utc>,
        reply: Reply<Trip>,
    },
    RecordMaintenance {
        log: Box<MaintenanceLog>,
        reply: Reply<Vehicle>,
    },
    RecordRefuel {
        log: Box<FuelLog>,
        reply: Reply<Vehicle>,
    },
    Snapshot {
        reply: Reply<Vehicle>,
    },
}

struct Shared {
    validator: TelemetryValidator,
    detector: BehaviorDetector,
    stores: PipelineStores,
    geofences: Arc<GeofenceEngine>,
    scoring: Arc<ScoringService>,
    events: EventBus,
}

struct WorkerHandle {
    tx: mpsc::Sender<Command>,
    task: JoinHandle<()>,
}

/// Entry point for vehicle telemetry and trip commands
pub struct TelemetryPipeline {
    config: PipelineConfig,
    shared: Arc<Shared>,
    workers: RwLock<HashMap<Uuid, WorkerHandle>>,
}

impl TelemetryPipeline {
    #[must_use]
    pub fn new(
        config: PipelineConfig,
        stores: PipelineStores,
        geofences: Arc<GeofenceEngine>,
        scoring: Arc<ScoringService>,
        events: EventBus,
    ) -> Self {
        let shared = Shared {
            validator: TelemetryValidator::new(&config.telemetry),
            detector: BehaviorDetector::new(config.telemetry.clone()),
            stores,
            geofences,
            scoring,
            events,
        };
        Self {
            config,
            shared: Arc::new(shared),
            workers: RwLock::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.shared.events.subscribe()
    }

    #[must_use]
    pub fn geofences(&self) -> &GeofenceEngine {
        &self.shared.geofences
    }

    /// Replace the geofence snapshot with the active definitions in storage.
    pub async fn reload_geofences(&self) -> Result<usize> {
        let geofences = self.shared.stores.geofences.get_active().await?;
        let count = geofences.len();
        self.shared.geofences.reload(geofences);
        Ok(count)
    }

    /// Persist the vehicle and start its worker. The worker resumes from the
    /// latest stored track, so ordering holds across restarts. Registering a
    /// vehicle that already has a worker is a no-op.
    pub async fn register_vehicle(&self, vehicle: Vehicle) -> Result<()> {
        let mut workers = self.workers.write().await;
        if workers.contains_key(&vehicle.id) {
            tracing::debug!(vehicle_id = %vehicle.id, "Vehicle already registered");
            return Ok(());
        }

        let stores = &self.shared.stores;
        if stores.vehicles.get_by_id(vehicle.id).await?.is_some() {
            stores.vehicles.update(&vehicle).await?;
        } else {
            stores.vehicles.create(&vehicle).await?;
        }
        let last_track = stores.telemetry.get_latest(vehicle.id).await?;

        let vehicle_id = vehicle.id;
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));
        let worker = VehicleWorker {
            shared: Arc::clone(&self.shared),
            vehicle,
            last_track,
            geofence_state: GeofenceState::default(),
            trips: HashMap::new(),
            active_trip: None,
        };
        let task = tokio::spawn(worker.run(rx));
        workers.insert(vehicle_id, WorkerHandle { tx, task });

        tracing::info!(vehicle_id = %vehicle_id, "Vehicle worker started");
        Ok(())
    }

    async fn send<T>(&self, vehicle_id: Uuid, build: impl FnOnce(Reply<T>) -> Command) -> Result<T> {
        let tx = self
            .workers
            .read()
            .await
            .get(&vehicle_id)
            .map(|w| w.tx.clone())
            .ok_or(EngineError::UnknownVehicle(vehicle_id))?;

        let (reply, rx) = oneshot::channel();
        tx.send(build(reply))
            .await
            .map_err(|_| EngineError::WorkerUnavailable(vehicle_id))?;
        rx.await
            .map_err(|_| EngineError::WorkerUnavailable(vehicle_id))?
    }

    /// Process one sample on its vehicle's worker. Waits while the vehicle's
    /// queue is full.
    pub async fn ingest(&self, sample: TelemetrySample) -> Result<ProcessedSample> {
        let vehicle_id = sample.vehicle_id;
        self.send(vehicle_id, |reply| Command::Ingest {
            sample: Box::new(sample),
            reply,
        })
        .await
    }

    /// Attach a driver to the vehicle, or detach with `None`. Samples without
    /// a driver are attributed to the assigned one.
    pub async fn assign_driver(&self, vehicle_id: Uuid, driver_id: Option<Uuid>) -> Result<Vehicle> {
        self.send(vehicle_id, |reply| Command::AssignDriver { driver_id, reply })
            .await
    }

    pub async fn plan_trip(
        &self,
        vehicle_id: Uuid,
        driver_id: Option<Uuid>,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<Trip> {
        let name = name.to_string();
        self.send(vehicle_id, |reply| Command::PlanTrip {
            driver_id,
            name,
            at,
            reply,
        })
        .await
    }

    pub async fn start_trip(&self, vehicle_id: Uuid, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip> {
        self.send(vehicle_id, |reply| Command::StartTrip { trip_id, at, reply })
            .await
    }

    pub async fn end_trip(&self, vehicle_id: Uuid, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip> {
        self.send(vehicle_id, |reply| Command::EndTrip { trip_id, at, reply })
            .await
    }

    pub async fn cancel_trip(&self, vehicle_id: Uuid, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip> {
        self.send(vehicle_id, |reply| Command::CancelTrip { trip_id, at, reply })
            .await
    }

    /// Store a workshop visit and add its cost to the vehicle. A service
    /// also restarts the service interval.
    pub async fn record_maintenance(&self, log: MaintenanceLog) -> Result<Vehicle> {
        let vehicle_id = log.vehicle_id;
        self.send(vehicle_id, |reply| Command::RecordMaintenance {
            log: Box::new(log),
            reply,
        })
        .await
    }

    /// Store a refuel and top up the vehicle's tank.
    pub async fn record_refuel(&self, log: FuelLog) -> Result<Vehicle> {
        let vehicle_id = log.vehicle_id;
        self.send(vehicle_id, |reply| Command::RecordRefuel {
            log: Box::new(log),
            reply,
        })
        .await
    }

    /// The worker's current view of the vehicle.
    pub async fn vehicle_snapshot(&self, vehicle_id: Uuid) -> Result<Vehicle> {
        self.send(vehicle_id, |reply| Command::Snapshot { reply }).await
    }

    /// Close every queue and wait for the workers to drain.
    pub async fn shutdown(&self) {
        let workers: Vec<_> = self.workers.write().await.drain().collect();
        let count = workers.len();
        for (vehicle_id, handle) in workers {
            drop(handle.tx);
            if let Err(e) = handle.task.await {
                tracing::error!(vehicle_id = %vehicle_id, error = %e, "Vehicle worker panicked");
            }
        }
        tracing::info!(workers = count, "Pipeline shut down");
    }
}

// =============================================================================
// WORKER
// =============================================================================

struct VehicleWorker {
    shared: Arc<Shared>,
    vehicle: Vehicle,
    last_track: Option<GpsTrack>,
    geofence_state: GeofenceState,
    trips: HashMap<Uuid, TripAggregator>,
    active_trip: Option<Uuid>,
}

impl VehicleWorker {
    async fn run(mut self, mut rx: mpsc::Receiver<Command>) {
        while let Some(command) = rx.recv().await {
            // A dropped reply means the caller stopped waiting
            match command {
                Command::Ingest { sample, reply } => {
                    let _ = reply.send(self.ingest(*sample).await);
                }
                Command::AssignDriver { driver_id, reply } => {
                    let _ = reply.send(self.assign_driver(driver_id).await);
                }
                Command::PlanTrip {
                    driver_id,
                    name,
                    at,
                    reply,
                } => {
                    let _ = reply.send(self.plan_trip(driver_id, name, at).await);
                }
                Command::StartTrip { trip_id, at, reply } => {
                    let _ = reply.send(self.start_trip(trip_id, at).await);
                }
                Command::EndTrip { trip_id, at, reply } => {
                    let _ = reply.send(self.end_trip(trip_id, at).await);
                }
                Command::CancelTrip { trip_id, at, reply } => {
                    let _ = reply.send(self.cancel_trip(trip_id, at).await);
                }
                Command::RecordMaintenance { log, reply } => {
                    let _ = reply.send(self.record_maintenance(*log).await);
                }
                Command::RecordRefuel { log, reply } => {
                    let _ = reply.send(self.record_refuel(*log).await);
                }
                Command::Snapshot { reply } => {
                    let _ = reply.send(Ok(self.vehicle.clone()));
                }
            }
        }
        tracing::info!(vehicle_id = %self.vehicle.id, "Vehicle worker stopped");
    }

    fn current_location(&self) -> Coordinates {
        self.last_track
            .as_ref()
            .map(GpsTrack::coordinates)
            .or(self.vehicle.last_location)
            .unwrap_or_default()
    }

    fn current_fuel(&self) -> Option<f64> {
        self.last_track.as_ref().and_then(|t| t.fuel_level_l)
    }

    /// A working copy of the trip's aggregator, adopting trips of this
    /// vehicle found in storage.
    async fn aggregator(&self, trip_id: Uuid) -> Result<TripAggregator> {
        if let Some(agg) = self.trips.get(&trip_id) {
            return Ok(agg.clone());
        }
        match self.shared.stores.trips.get_by_id(trip_id).await? {
            Some(trip) if trip.vehicle_id == self.vehicle.id => Ok(TripAggregator::new(trip)),
            Some(trip) => Err(DomainError::InvariantViolation(format!(
                "trip {trip_id} belongs to vehicle {}",
                trip.vehicle_id
            ))
            .into()),
            None => Err(EngineError::not_found("trip", trip_id)),
        }
    }

    // -------------------------------------------------------------------------
    // Samples
    // -------------------------------------------------------------------------

    async fn ingest(&mut self, mut sample: TelemetrySample) -> Result<ProcessedSample> {
        let vehicle_id = self.vehicle.id;
        if !self.vehicle.can_track_gps() {
            tracing::warn!(vehicle_id = %vehicle_id, "Sample rejected, tracking disabled");
            return Err(EngineError::TrackingDisabled(vehicle_id));
        }

        let validated = self
            .shared
            .validator
            .validate(&sample, self.last_track.as_ref())
            .inspect_err(|e| {
                tracing::warn!(vehicle_id = %vehicle_id, error = %e, "Sample rejected");
            })?;

        if sample.driver_id.is_none() {
            sample.driver_id = self.vehicle.driver_id;
        }
        let detection = self
            .shared
            .detector
            .detect(&sample, self.last_track.as_ref(), &validated);

        let mut geofence_state = self.geofence_state.clone();
        let geofencing = self.shared.geofences.evaluate(
            &mut geofence_state,
            self.vehicle.company_id,
            vehicle_id,
            sample.driver_id,
            sample.latitude,
            sample.longitude,
            sample.timestamp,
        );

        let idle_speed = self.shared.detector.idle_speed_kmh();
        let mut track = GpsTrack {
            id: Uuid::new_v4(),
            vehicle_id,
            driver_id: sample.driver_id,
            trip_id: None,
            latitude: sample.latitude,
            longitude: sample.longitude,
            altitude_m: sample.altitude_m,
            heading_deg: sample.heading_deg,
            speed_kmh: sample.speed_kmh,
            accuracy_m: sample.accuracy_m,
            satellites: sample.satellites,
            hdop: sample.hdop,
            low_accuracy: validated.low_accuracy,
            ignition_on: sample.ignition_on,
            engine_on: sample.engine_on,
            moving: sample.speed_kmh > idle_speed,
            fuel_level_l: sample.fuel_level_l,
            distance_km: validated.distance_km,
            odometer_km: self.vehicle.odometer_km + validated.distance_km,
            flags: detection.flags,
            speed_limit_kmh: detection.speed_limit_kmh,
            violation_severity: detection.worst_severity(),
            geofence: geofencing.membership,
            timestamp: sample.timestamp,
            processed_at: Utc::now(),
        };

        // Behaviors become driver events only when someone was driving
        let detected: Vec<_> = detection.behaviors.iter().map(|b| b.event_type).collect();
        let mut events: Vec<DriverEvent> = match sample.driver_id {
            Some(driver_id) => detection
                .behaviors
                .iter()
                .map(|b| b.to_event(&sample, driver_id, None))
                .collect(),
            None => {
                if !detected.is_empty() {
                    tracing::debug!(
                        vehicle_id = %vehicle_id,
                        behaviors = ?detected,
                        "Behaviors detected without a driver, not recorded as events"
                    );
                }
                Vec::new()
            }
        };

        // Trip attachment
        let mut staged_trip = None;
        let attachment = match sample.trip_id.or(self.active_trip) {
            None => TripAttachment::None,
            Some(trip_id) => {
                let outcome = match self.aggregator(trip_id).await {
                    Ok(mut agg) => {
                        track.trip_id = Some(trip_id);
                        for event in &mut events {
                            event.trip_id = Some(trip_id);
                        }
                        agg.ingest(&track, &detected).map(|()| agg).map_err(EngineError::from)
                    }
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(agg) => {
                        staged_trip = Some(agg);
                        TripAttachment::Attached { trip_id }
                    }
                    Err(EngineError::Domain(error)) => {
                        tracing::warn!(
                            vehicle_id = %vehicle_id,
                            trip_id = %trip_id,
                            error = %error,
                            "Sample not counted toward trip"
                        );
                        track.trip_id = None;
                        for event in &mut events {
                            event.trip_id = None;
                        }
                        TripAttachment::Rejected { trip_id, error }
                    }
                    Err(other) => return Err(other),
                }
            }
        };

        // Persist, then commit
        let stores = &self.shared.stores;
        stores.telemetry.insert(&track).await?;
        for event in &events {
            stores.driver_events.insert(event).await?;
        }
        if let Some(agg) = &staged_trip {
            stores.trips.update(agg.trip()).await?;
        }

        let mut vehicle = self.vehicle.clone();
        vehicle.add_distance(validated.distance_km);
        vehicle.update_location(sample.coordinates(), sample.timestamp);
        if let Some(fuel) = sample.fuel_level_l {
            vehicle.update_fuel_level(fuel);
        }
        stores.vehicles.update(&vehicle).await?;

        self.vehicle = vehicle;
        self.geofence_state = geofence_state;
        self.last_track = Some(track.clone());
        if let Some(agg) = staged_trip {
            if agg.trip().is_active() {
                self.active_trip = Some(agg.trip().id);
            }
            self.trips.insert(agg.trip().id, agg);
        }

        tracing::debug!(
            vehicle_id = %vehicle_id,
            speed_kmh = track.speed_kmh,
            distance_km = track.distance_km,
            events = events.len(),
            transitions = geofencing.transitions.len(),
            "Sample processed"
        );

        // Publish and score
        for event in &events {
            self.shared.events.publish(FleetEvent::Behavior(event.clone()));
        }
        for transition in geofencing.transitions.iter().filter(|t| t.alert) {
            self.shared
                .events
                .publish(FleetEvent::Geofence(transition.clone()));
        }
        for event in &events {
            if let Err(e) = self.shared.scoring.apply_event(event).await {
                tracing::warn!(
                    vehicle_id = %vehicle_id,
                    driver_id = %event.driver_id,
                    error = %e,
                    "Score update failed"
                );
            }
        }

        Ok(ProcessedSample {
            track,
            events,
            transitions: geofencing.transitions,
            trip: attachment,
        })
    }

    // -------------------------------------------------------------------------
    // Driver assignment
    // -------------------------------------------------------------------------

    async fn load_driver(&self, driver_id: Uuid) -> Result<(u64, Driver)> {
        self.shared
            .stores
            .drivers
            .get_by_id(driver_id)
            .await?
            .map(|v| (v.version, v.entity))
            .ok_or_else(|| EngineError::not_found("driver", driver_id))
    }

    /// Hand the vehicle to `driver_id`, or leave it driverless with `None`.
    /// The incoming driver must belong to the vehicle's company and pass
    /// `can_drive`. Both driver records follow the vehicle.
    async fn assign_driver(&mut self, driver_id: Option<Uuid>) -> Result<Vehicle> {
        if driver_id.is_some() && driver_id == self.vehicle.driver_id {
            return Ok(self.vehicle.clone());
        }
        let now = Utc::now();
        let vehicle_id = self.vehicle.id;

        let incoming = match driver_id {
            Some(id) => {
                let (version, mut driver) = self.load_driver(id).await?;
                if driver.company_id != self.vehicle.company_id {
                    return Err(DomainError::InvariantViolation(format!(
                        "driver {id} belongs to company {}",
                        driver.company_id
                    ))
                    .into());
                }
                if !driver.can_drive(now) {
                    tracing::warn!(
                        vehicle_id = %vehicle_id,
                        driver_id = %id,
                        status = driver.status.as_str(),
                        "Driver assignment refused"
                    );
                    return Err(DomainError::InvariantViolation(format!(
                        "driver {id} is not eligible to drive"
                    ))
                    .into());
                }
                driver.assign_vehicle(vehicle_id, now);
                Some((version, driver))
            }
            None => None,
        };

        let mut vehicle = self.vehicle.clone();
        let previous = vehicle.unassign_driver();
        if let Some((_, driver)) = &incoming {
            vehicle.assign_driver(driver.id)?;
        }
        vehicle.updated_at = now;

        if let Some((version, driver)) = &incoming {
            self.shared.stores.drivers.update(driver, *version).await?;
        }
        if let Err(e) = self.shared.stores.vehicles.update(&vehicle).await {
            if let Some((_, driver)) = &incoming {
                self.release_driver(driver.id, now).await;
            }
            return Err(e.into());
        }
        if let Some(previous) = previous {
            self.release_driver(previous, now).await;
        }

        tracing::info!(
            vehicle_id = %vehicle_id,
            driver_id = ?driver_id,
            previous = ?previous,
            "Driver assignment changed"
        );
        self.vehicle = vehicle;
        Ok(self.vehicle.clone())
    }

    /// Clear the driver's link to this vehicle. The vehicle record is
    /// authoritative, so a failure here is logged and not returned.
    async fn release_driver(&self, driver_id: Uuid, now: DateTime<Utc>) {
        let released = async {
            let (version, mut driver) = self.load_driver(driver_id).await?;
            if driver.vehicle_id == Some(self.vehicle.id) {
                driver.unassign_vehicle(now);
                self.shared.stores.drivers.update(&driver, version).await?;
            }
            Ok::<_, EngineError>(())
        }
        .await;
        if let Err(e) = released {
            tracing::warn!(
                vehicle_id = %self.vehicle.id,
                driver_id = %driver_id,
                error = %e,
                "Driver release not recorded"
            );
        }
    }

    // -------------------------------------------------------------------------
    // Maintenance and fuel
    // -------------------------------------------------------------------------

    /// The log row is written before the vehicle. A failed vehicle write
    /// leaves the row stored and the worker's vehicle unchanged.
    async fn record_maintenance(&mut self, log: MaintenanceLog) -> Result<Vehicle> {
        let mut vehicle = self.vehicle.clone();
        vehicle.record_maintenance(&log, Utc::now())?;
        self.shared.stores.vehicle_logs.insert_maintenance(&log).await?;
        self.shared.stores.vehicles.update(&vehicle).await?;

        tracing::info!(
            vehicle_id = %vehicle.id,
            maintenance_type = log.maintenance_type.as_str(),
            cost = %log.cost,
            "Maintenance recorded"
        );
        self.vehicle = vehicle;
        Ok(self.vehicle.clone())
    }

    async fn record_refuel(&mut self, log: FuelLog) -> Result<Vehicle> {
        let mut vehicle = self.vehicle.clone();
        vehicle.record_refuel(&log, Utc::now())?;
        self.shared.stores.vehicle_logs.insert_fuel(&log).await?;
        self.shared.stores.vehicles.update(&vehicle).await?;

        tracing::info!(
            vehicle_id = %vehicle.id,
            quantity_l = log.quantity_l,
            fuel_level_l = vehicle.current_fuel_level_l,
            "Refuel recorded"
        );
        self.vehicle = vehicle;
        Ok(self.vehicle.clone())
    }

    // -------------------------------------------------------------------------
    // Trips
    // -------------------------------------------------------------------------

    async fn plan_trip(&mut self, driver_id: Option<Uuid>, name: String, at: DateTime<Utc>) -> Result<Trip> {
        let trip = Trip::planned(
            self.vehicle.company_id,
            self.vehicle.id,
            driver_id.or(self.vehicle.driver_id),
            name,
            at,
        );
        self.shared.stores.trips.create(&trip).await?;
        tracing::info!(trip_id = %trip.id, vehicle_id = %self.vehicle.id, "Trip planned");
        self.trips.insert(trip.id, TripAggregator::new(trip.clone()));
        Ok(trip)
    }

    async fn start_trip(&mut self, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip> {
        if let Some(active) = self.active_trip.filter(|id| *id != trip_id) {
            return Err(DomainError::InvariantViolation(format!(
                "vehicle {} already has active trip {active}",
                self.vehicle.id
            ))
            .into());
        }

        let mut agg = self.aggregator(trip_id).await?;
        agg.start(at, self.current_location(), self.current_fuel())?;
        self.shared.stores.trips.update(agg.trip()).await?;

        let trip = agg.trip().clone();
        self.trips.insert(trip_id, agg);
        self.active_trip = Some(trip_id);

        tracing::info!(trip_id = %trip_id, vehicle_id = %self.vehicle.id, "Trip started");
        self.shared.events.publish(FleetEvent::TripStarted {
            trip_id,
            vehicle_id: self.vehicle.id,
            driver_id: trip.driver_id,
            at,
        });
        Ok(trip)
    }

    async fn end_trip(&mut self, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip> {
        let mut agg = self.aggregator(trip_id).await?;
        let trip = agg
            .end(at, self.current_location(), self.current_fuel())?
            .clone();
        self.shared.stores.trips.update(&trip).await?;

        self.trips.remove(&trip_id);
        if self.active_trip == Some(trip_id) {
            self.active_trip = None;
        }

        if trip.fuel_consumed_l > 0.0 {
            let mut vehicle = self.vehicle.clone();
            vehicle.calculate_fuel_efficiency(trip.total_distance_km, trip.fuel_consumed_l);
            match self.shared.stores.vehicles.update(&vehicle).await {
                Ok(()) => self.vehicle = vehicle,
                Err(e) => {
                    tracing::warn!(trip_id = %trip_id, vehicle_id = %vehicle.id, error = %e, "Vehicle fuel efficiency not updated");
                }
            }
        }

        if let Some(driver_id) = trip.driver_id {
            if let Err(e) = self
                .shared
                .scoring
                .record_trip(driver_id, trip.total_distance_km, trip.total_duration_s, at)
                .await
            {
                tracing::warn!(trip_id = %trip_id, driver_id = %driver_id, error = %e, "Driver trip totals not updated");
            }
        }

        self.shared
            .events
            .publish(FleetEvent::TripCompleted(Box::new(trip.clone())));
        Ok(trip)
    }

    async fn cancel_trip(&mut self, trip_id: Uuid, at: DateTime<Utc>) -> Result<Trip> {
        let mut agg = self.aggregator(trip_id).await?;
        let trip = agg.cancel(at)?.clone();
        self.shared.stores.trips.update(&trip).await?;

        self.trips.remove(&trip_id);
        if self.active_trip == Some(trip_id) {
            self.active_trip = None;
        }

        tracing::info!(trip_id = %trip_id, vehicle_id = %self.vehicle.id, "Trip cancelled");
        self.shared.events.publish(FleetEvent::TripCancelled {
            trip_id,
            vehicle_id: self.vehicle.id,
            at,
        });
        Ok(trip)
    }
}
