//! Fleet-level simulation wiring vehicles, drivers and trips through the
//! engine.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use fleet_domain::{
    BillingCycle, Driver, DriverDocuments, Geofence, GeofenceGeometry, Invoice, LeaderboardEntry,
    PaymentMethod, PaymentType, PlanLimits, Subscription, SubscriptionPlan, Trip, Vehicle,
};
use fleet_engine::{
    BillingLedger, EngineError, EventBus, FleetEvent, GeofenceEngine, PipelineStores, Result,
    ScoringService, TelemetryPipeline,
};
use fleet_persistence::{DriverRepository, GeofenceRepository, InMemoryStore};

use crate::config::SimulatorConfig;
use crate::route::RouteGenerator;
use crate::telemetry::{DrivingProfile, SampleGenerator};

const FIRST_NAMES: [&str; 8] = ["Budi", "Siti", "Agus", "Rina", "Joko", "Dewi", "Hendra", "Putri"];
const LAST_NAMES: [&str; 6] = ["Santoso", "Wijaya", "Saputra", "Lestari", "Hidayat", "Kusuma"];

/// Depot geofence radius, metres
const DEPOT_RADIUS_M: f64 = 300.0;

// =============================================================================
// OPTIONS AND REPORT
// =============================================================================

/// Scenario knobs
#[derive(Debug, Clone)]
pub struct FleetOptions {
    pub vehicles: usize,
    pub stops: usize,
    /// Simulated seconds between samples
    pub tick_s: u32,
    /// Wall-clock pause between samples
    pub tick_delay: StdDuration,
    pub seed: u64,
    pub profile: DrivingProfile,
    pub plan_limits: PlanLimits,
    /// Monthly subscription price
    pub monthly_price: Decimal,
}

impl Default for FleetOptions {
    fn default() -> Self {
        Self {
            vehicles: 4,
            stops: 6,
            tick_s: 5,
            tick_delay: StdDuration::ZERO,
            seed: 42,
            profile: DrivingProfile::default(),
            plan_limits: PlanLimits {
                max_vehicles: 25,
                max_drivers: 25,
                max_users: 5,
            },
            monthly_price: Decimal::from(499_000),
        }
    }
}

/// Per-run counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SampleStats {
    pub samples: u64,
    pub rejected: u64,
    pub geofence_transitions: u64,
    /// Behavior events by type
    pub events: BTreeMap<&'static str, u64>,
}

impl SampleStats {
    fn merge(&mut self, other: Self) {
        self.samples += other.samples;
        self.rejected += other.rejected;
        self.geofence_transitions += other.geofence_transitions;
        for (kind, count) in other.events {
            *self.events.entry(kind).or_default() += count;
        }
    }

    #[must_use]
    pub fn total_events(&self) -> u64 {
        self.events.values().sum()
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, Serialize)]
pub struct SimulationReport {
    pub company_id: Uuid,
    pub trips: Vec<Trip>,
    pub stats: SampleStats,
    pub leaderboard: Vec<LeaderboardEntry>,
    pub invoice: Invoice,
}

// =============================================================================
// SIMULATOR
// =============================================================================

struct SimulatedUnit {
    vehicle: Vehicle,
    driver: Driver,
    trip_id: Uuid,
    generator: SampleGenerator,
}

/// One company's fleet driving delivery routes out of a shared depot
pub struct FleetSimulator {
    company_id: Uuid,
    started_at: DateTime<Utc>,
    options: FleetOptions,
    pipeline: Arc<TelemetryPipeline>,
    scoring: Arc<ScoringService>,
    ledger: BillingLedger,
    units: Vec<SimulatedUnit>,
}

impl FleetSimulator {
    /// Set up the company, its subscription and depot geofence, then
    /// register as many vehicles as the plan allows, each with a driver and
    /// a started trip.
    pub async fn new(config: &SimulatorConfig, options: FleetOptions) -> Result<Self> {
        let store = Arc::new(InMemoryStore::new());
        let pipeline_config = config.pipeline();
        let events = EventBus::new(pipeline_config.event_channel_capacity);
        let scoring = Arc::new(ScoringService::new(store.clone(), events.clone()));
        let geofences = Arc::new(GeofenceEngine::new(
            vec![],
            pipeline_config.telemetry.emit_inside_heartbeat,
        ));
        let ledger = BillingLedger::new(store.clone(), store.clone(), store.clone(), events.clone());
        let pipeline = Arc::new(TelemetryPipeline::new(
            pipeline_config,
            PipelineStores::from_store(store.clone()),
            geofences,
            Arc::clone(&scoring),
            events,
        ));

        let company_id = Uuid::new_v4();
        let started_at = Utc::now();

        ledger
            .create_subscription(Subscription::new(
                company_id,
                SubscriptionPlan::Basic,
                BillingCycle::Monthly,
                options.plan_limits,
                options.monthly_price,
                started_at,
                started_at + Months::new(1),
            ))
            .await?;

        let mut routes = RouteGenerator::jakarta(options.seed);
        let depot = Geofence::new(
            company_id,
            "Depot",
            GeofenceGeometry::Circle {
                center: routes.depot(),
                radius_m: DEPOT_RADIUS_M,
            },
        );
        GeofenceRepository::upsert(store.as_ref(), &depot).await?;
        pipeline.reload_geofences().await?;

        let mut units = Vec::with_capacity(options.vehicles);
        for i in 0..options.vehicles {
            let count = u32::try_from(i).unwrap_or(u32::MAX);
            let seed = options.seed.wrapping_add(u64::from(count));
            if !ledger.can_add_vehicle(company_id, count, started_at).await?
                || !ledger.can_add_driver(company_id, count, started_at).await?
            {
                tracing::warn!(
                    company_id = %company_id,
                    registered = i,
                    requested = options.vehicles,
                    "Plan limit reached, skipping remaining vehicles"
                );
                break;
            }

            let driver = Driver::register(
                company_id,
                FIRST_NAMES[i % FIRST_NAMES.len()],
                LAST_NAMES[i % LAST_NAMES.len()],
                driver_documents(i, started_at),
                started_at,
            )?;
            DriverRepository::create(store.as_ref(), &driver).await?;

            let vehicle = Vehicle::new(company_id, format!("B {} SIM", 1001 + i), started_at);
            pipeline.register_vehicle(vehicle.clone()).await?;
            pipeline.assign_driver(vehicle.id, Some(driver.id)).await?;

            let route = routes.generate_route(options.stops);
            let trip = pipeline
                .plan_trip(vehicle.id, None, &format!("Delivery run {}", i + 1), started_at)
                .await?;
            pipeline.start_trip(vehicle.id, trip.id, started_at).await?;

            let generator = SampleGenerator::new(
                vehicle.id,
                route,
                started_at,
                options.tick_s,
                options.profile,
                seed,
            );
            tracing::info!(
                vehicle_id = %vehicle.id,
                plate = %vehicle.license_plate,
                driver = %driver.full_name(),
                trip_id = %trip.id,
                "Unit ready"
            );
            units.push(SimulatedUnit {
                vehicle,
                driver,
                trip_id: trip.id,
                generator,
            });
        }

        Ok(Self {
            company_id,
            started_at,
            options,
            pipeline,
            scoring,
            ledger,
            units,
        })
    }

    #[must_use]
    pub const fn company_id(&self) -> Uuid {
        self.company_id
    }

    #[must_use]
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<FleetEvent> {
        self.pipeline.subscribe()
    }

    /// Drive every route to the end, close the trips, then bill and settle
    /// the month's subscription.
    pub async fn run(self) -> Result<SimulationReport> {
        let Self {
            company_id,
            started_at,
            options,
            pipeline,
            scoring,
            ledger,
            units,
        } = self;

        let mut handles = Vec::with_capacity(units.len());
        for unit in units {
            let pipeline = Arc::clone(&pipeline);
            let tick_delay = options.tick_delay;
            handles.push(tokio::spawn(drive(pipeline, unit, tick_delay)));
        }

        let mut stats = SampleStats::default();
        let mut trips = Vec::with_capacity(handles.len());
        let mut finished_at = started_at;
        for handle in handles {
            match handle.await {
                Ok(Ok((vehicle_id, trip_id, clock, unit_stats))) => {
                    stats.merge(unit_stats);
                    let end = clock + Duration::seconds(i64::from(options.tick_s));
                    finished_at = finished_at.max(end);
                    trips.push(pipeline.end_trip(vehicle_id, trip_id, end).await?);
                }
                Ok(Err(e)) => return Err(e),
                Err(e) => tracing::error!(error = %e, "Simulation task panicked"),
            }
        }
        pipeline.shutdown().await;

        let leaderboard = scoring.leaderboard(company_id, trips.len().max(1)).await?;
        let invoice = settle_month(&ledger, company_id, finished_at).await?;

        tracing::info!(
            company_id = %company_id,
            trips = trips.len(),
            samples = stats.samples,
            rejected = stats.rejected,
            events = stats.total_events(),
            invoice = %invoice.invoice_number,
            "Simulation complete"
        );

        Ok(SimulationReport {
            company_id,
            trips,
            stats,
            leaderboard,
            invoice,
        })
    }
}

/// Feed one unit's samples through the pipeline in order.
async fn drive(
    pipeline: Arc<TelemetryPipeline>,
    mut unit: SimulatedUnit,
    tick_delay: StdDuration,
) -> Result<(Uuid, Uuid, DateTime<Utc>, SampleStats)> {
    let mut stats = SampleStats::default();
    while let Some(sample) = unit.generator.next_sample() {
        stats.samples += 1;
        match pipeline.ingest(sample).await {
            Ok(processed) => {
                stats.geofence_transitions += processed.transitions.len() as u64;
                for event in &processed.events {
                    *stats.events.entry(event.event_type.as_str()).or_default() += 1;
                }
            }
            Err(EngineError::Domain(e)) => {
                stats.rejected += 1;
                tracing::debug!(vehicle_id = %unit.vehicle.id, error = %e, "Sample refused");
            }
            Err(e) => return Err(e),
        }
        if !tick_delay.is_zero() {
            tokio::time::sleep(tick_delay).await;
        }
    }
    tracing::info!(
        vehicle_id = %unit.vehicle.id,
        driver = %unit.driver.full_name(),
        samples = stats.samples,
        "Route finished"
    );
    Ok((unit.vehicle.id, unit.trip_id, unit.generator.clock(), stats))
}

/// Draft, send and pay the month's subscription invoice.
/// Well-formed papers for the `i`-th simulated driver.
fn driver_documents(i: usize, now: DateTime<Utc>) -> DriverDocuments {
    DriverDocuments {
        nik: format!("317401{i:010}"),
        license_number: format!("1201-9000-{i:06}"),
        license_type: "B1".to_string(),
        license_expiry: Some(now + Duration::days(3 * 365)),
    }
}

async fn settle_month(ledger: &BillingLedger, company_id: Uuid, now: DateTime<Utc>) -> Result<Invoice> {
    let invoice = ledger
        .bill_subscription(company_id, now + Duration::days(14), now)
        .await?;
    ledger.send_invoice(invoice.id, now).await?;

    let payment = ledger
        .create_payment(
            company_id,
            invoice.total_amount,
            Decimal::ZERO,
            PaymentMethod::BankTransfer,
            PaymentType::Subscription,
            now,
        )
        .await?;
    ledger.start_processing(payment.id, now).await?;
    ledger
        .complete_payment(payment.id, &format!("SIM-{}", &payment.id.simple().to_string()[..8]), now)
        .await?;
    ledger.apply_completed_payment(invoice.id, payment.id, now).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleet_domain::{InvoiceStatus, TripStatus};
    use tokio_test::assert_ok;

    #[test]
    fn test_simulated_drivers_have_valid_papers() {
        let now = Utc::now();
        for i in [0, 7, 499] {
            let docs = driver_documents(i, now);
            assert!(Driver::register(Uuid::new_v4(), "Sim", "Driver", docs, now).is_ok());
        }
    }

    fn options(vehicles: usize) -> FleetOptions {
        FleetOptions {
            vehicles,
            stops: 2,
            seed: 7,
            ..FleetOptions::default()
        }
    }

    #[tokio::test]
    async fn test_run_completes_every_trip_and_settles_invoice() {
        let sim = assert_ok!(FleetSimulator::new(&SimulatorConfig::default(), options(2)).await);
        assert_eq!(sim.unit_count(), 2);
        let company_id = sim.company_id();

        let report = assert_ok!(sim.run().await);
        assert_eq!(report.company_id, company_id);
        assert_eq!(report.trips.len(), 2);
        assert!(report.trips.iter().all(|t| t.status == TripStatus::Completed));
        assert!(report.trips.iter().all(|t| t.total_distance_km > 0.0));
        assert!(report.stats.samples > 0);
        // Leaving the depot and coming back
        assert!(report.stats.geofence_transitions >= 2);

        assert_eq!(report.leaderboard.len(), 2);
        assert_eq!(report.leaderboard[0].rank, 1);
        assert!(report.leaderboard.iter().all(|e| e.total_trips == 1));

        assert_eq!(report.invoice.status, InvoiceStatus::Paid);
        assert_eq!(report.invoice.balance_amount, Decimal::ZERO);
        assert!(report.invoice.invoice_number.starts_with("INV-"));
    }

    #[tokio::test]
    async fn test_plan_limit_caps_vehicles() {
        let mut opts = options(3);
        opts.plan_limits.max_vehicles = 2;
        let sim = FleetSimulator::new(&SimulatorConfig::default(), opts)
            .await
            .unwrap();
        assert_eq!(sim.unit_count(), 2);
    }

    #[test]
    fn test_stats_merge_sums_events() {
        let mut a = SampleStats {
            samples: 3,
            ..SampleStats::default()
        };
        a.events.insert("speeding", 2);
        let mut b = SampleStats {
            samples: 4,
            rejected: 1,
            ..SampleStats::default()
        };
        b.events.insert("speeding", 1);
        b.events.insert("idling", 5);

        a.merge(b);
        assert_eq!(a.samples, 7);
        assert_eq!(a.rejected, 1);
        assert_eq!(a.events["speeding"], 3);
        assert_eq!(a.total_events(), 8);
    }
}
