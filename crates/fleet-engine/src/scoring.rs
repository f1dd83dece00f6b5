//! # Driver Scoring Engine
//!
//! Owns every mutation of driver scores and counters. Mutations on the same
//! driver are serialized by a per-driver async mutex and written back with a
//! versioned compare-and-swap, so concurrent pipelines can never interleave
//! a read-modify-write on one driver.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use fleet_domain::{Driver, DriverEvent, LeaderboardEntry, Severity};
use fleet_persistence::DriverRepository;

use crate::error::{EngineError, Result};
use crate::events::{EventBus, FleetEvent};

/// Attempts before a contended CAS write gives up
const MAX_CAS_ATTEMPTS: usize = 3;

/// Serialized driver score mutation
pub struct ScoringService {
    drivers: Arc<dyn DriverRepository>,
    locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    events: EventBus,
}

impl ScoringService {
    #[must_use]
    pub fn new(drivers: Arc<dyn DriverRepository>, events: EventBus) -> Self {
        Self {
            drivers,
            locks: Mutex::new(HashMap::new()),
            events,
        }
    }

    async fn lock_for(&self, driver_id: Uuid) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(driver_id).or_default())
    }

    /// Drop our handle and forget the lock once nobody else holds it. Handles
    /// are only cloned under the map lock, so the count cannot grow here.
    async fn release_lock(&self, driver_id: Uuid, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        drop(lock);
        if locks.get(&driver_id).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&driver_id);
        }
    }

    /// Read, mutate and CAS-write one driver under its lock.
    async fn mutate<F>(&self, driver_id: Uuid, apply: F) -> Result<Driver>
    where
        F: Fn(&mut Driver) -> fleet_domain::Result<()> + Send,
    {
        let lock = self.lock_for(driver_id).await;
        let result = {
            let _guard = lock.lock().await;
            self.write_with_retry(driver_id, apply).await
        };
        self.release_lock(driver_id, lock).await;
        result
    }

    async fn write_with_retry<F>(&self, driver_id: Uuid, apply: F) -> Result<Driver>
    where
        F: Fn(&mut Driver) -> fleet_domain::Result<()> + Send,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let current = self
                .drivers
                .get_by_id(driver_id)
                .await?
                .ok_or_else(|| EngineError::not_found("driver", driver_id))?;

            let mut driver = current.entity;
            apply(&mut driver)?;

            match self.drivers.update(&driver, current.version).await {
                Ok(_) => return Ok(driver),
                Err(e) if e.is_conflict() && attempt < MAX_CAS_ATTEMPTS => {
                    tracing::warn!(driver_id = %driver_id, attempt, "Driver write conflict, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn publish_score(&self, driver: &Driver) {
        self.events.publish(FleetEvent::ScoreUpdated {
            driver_id: driver.id,
            safety_score: driver.safety_score,
            overall_score: driver.overall_score,
            grade: driver.grade(),
        });
    }

    pub async fn apply_violation(
        &self,
        driver_id: Uuid,
        severity: Severity,
        at: DateTime<Utc>,
    ) -> Result<Driver> {
        let driver = self
            .mutate(driver_id, |d| d.apply_violation(severity, at))
            .await?;
        tracing::info!(
            driver_id = %driver_id,
            severity = severity.as_str(),
            safety_score = driver.safety_score,
            overall_score = driver.overall_score,
            "Violation applied"
        );
        self.publish_score(&driver);
        Ok(driver)
    }

    /// Apply a detected event if it counts against the driver. Idling is
    /// ignored.
    pub async fn apply_event(&self, event: &DriverEvent) -> Result<Option<Driver>> {
        if !event.is_violation() {
            return Ok(None);
        }
        self.apply_violation(event.driver_id, event.severity, event.occurred_at)
            .await
            .map(Some)
    }

    pub async fn apply_accident(&self, driver_id: Uuid, at: DateTime<Utc>) -> Result<Driver> {
        let driver = self.mutate(driver_id, |d| d.apply_accident(at)).await?;
        tracing::warn!(driver_id = %driver_id, accidents = driver.accidents, "Accident recorded");
        self.publish_score(&driver);
        Ok(driver)
    }

    /// Set the three input scores. Out-of-range values are rejected and the
    /// stored driver is unchanged.
    pub async fn update_scores(
        &self,
        driver_id: Uuid,
        performance: f64,
        safety: f64,
        efficiency: f64,
        at: DateTime<Utc>,
    ) -> Result<Driver> {
        let driver = self
            .mutate(driver_id, |d| d.update_scores(performance, safety, efficiency, at))
            .await?;
        self.publish_score(&driver);
        Ok(driver)
    }

    pub async fn record_trip(
        &self,
        driver_id: Uuid,
        distance_km: f64,
        duration_s: i64,
        at: DateTime<Utc>,
    ) -> Result<Driver> {
        self.mutate(driver_id, |d| {
            d.record_trip(distance_km, duration_s, at);
            Ok(())
        })
        .await
    }

    /// Drivers of a company ranked by overall score, best first.
    pub async fn leaderboard(&self, company_id: Uuid, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        let mut drivers = self.drivers.get_by_company(company_id).await?;
        drivers.sort_by(|a, b| {
            b.overall_score
                .total_cmp(&a.overall_score)
                .then_with(|| b.total_distance_km.total_cmp(&a.total_distance_km))
        });

        let now = Utc::now();
        Ok(drivers
            .into_iter()
            .take(limit)
            .zip(1u32..)
            .map(|(d, rank)| LeaderboardEntry {
                driver_id: d.id,
                company_id: d.company_id,
                name: d.full_name(),
                overall_score: d.overall_score,
                grade: d.grade(),
                total_trips: d.total_trips,
                total_distance_km: d.total_distance_km,
                rank,
                updated_at: now,
            })
            .collect())
    }
}
