//! # Driver Performance Reports
//!
//! Periodic rollups of each driver's completed trips and recorded violations
//! into stored [`PerformanceLog`]s. Only closed periods are rolled up, and a
//! period is logged at most once per driver.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use fleet_domain::{DomainError, PerformanceLog, PerformancePeriod};
use fleet_persistence::{DriverEventRepository, DriverRepository, PerformanceLogRepository, TripRepository};

use crate::error::{EngineError, Result};

/// Builds and stores driver performance logs
pub struct PerformanceReporter {
    drivers: Arc<dyn DriverRepository>,
    trips: Arc<dyn TripRepository>,
    driver_events: Arc<dyn DriverEventRepository>,
    logs: Arc<dyn PerformanceLogRepository>,
}

impl PerformanceReporter {
    #[must_use]
    pub fn new(
        drivers: Arc<dyn DriverRepository>,
        trips: Arc<dyn TripRepository>,
        driver_events: Arc<dyn DriverEventRepository>,
        logs: Arc<dyn PerformanceLogRepository>,
    ) -> Self {
        Self {
            drivers,
            trips,
            driver_events,
            logs,
        }
    }

    /// Use one store for every repository.
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: DriverRepository + TripRepository + DriverEventRepository + PerformanceLogRepository + 'static,
    {
        Self::new(store.clone(), store.clone(), store.clone(), store)
    }

    /// Roll up one driver's `period` starting at `start`. Fails when the
    /// period has not ended by `now` or was already logged.
    pub async fn rollup_driver(
        &self,
        driver_id: Uuid,
        period: PerformancePeriod,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<PerformanceLog> {
        let window = period.window(start)?;
        if now < window.end {
            return Err(DomainError::InvariantViolation(format!(
                "{} period from {start} is still open",
                period.as_str()
            ))
            .into());
        }

        let driver = self
            .drivers
            .get_by_id(driver_id)
            .await?
            .map(|v| v.entity)
            .ok_or_else(|| EngineError::not_found("driver", driver_id))?;

        if self.is_logged(driver_id, period, window.start).await? {
            return Err(DomainError::InvariantViolation(format!(
                "{} period from {start} already logged for driver {driver_id}",
                period.as_str()
            ))
            .into());
        }

        let trips = self.trips.get_by_driver(driver_id, window).await?;
        let events = self.driver_events.get_by_driver(driver_id, window).await?;
        let log = PerformanceLog::rollup(&driver, period, window, &trips, &events, now);
        self.logs.insert(&log).await?;

        tracing::info!(
            driver_id = %driver_id,
            period = period.as_str(),
            period_start = %window.start,
            trips = log.trips_completed,
            violations = log.violations,
            "Performance log recorded"
        );
        Ok(log)
    }

    /// Roll up every active driver of a company. Drivers whose period is
    /// already logged are skipped.
    pub async fn rollup_company(
        &self,
        company_id: Uuid,
        period: PerformancePeriod,
        start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<Vec<PerformanceLog>> {
        let drivers = self.drivers.get_by_company(company_id).await?;
        let mut logs = Vec::with_capacity(drivers.len());
        for driver in drivers.iter().filter(|d| d.is_active) {
            if self.is_logged(driver.id, period, start).await? {
                tracing::debug!(driver_id = %driver.id, "Performance period already logged");
                continue;
            }
            logs.push(self.rollup_driver(driver.id, period, start, now).await?);
        }
        Ok(logs)
    }

    async fn is_logged(&self, driver_id: Uuid, period: PerformancePeriod, start: DateTime<Utc>) -> Result<bool> {
        Ok(self
            .logs
            .get_by_driver(driver_id)
            .await?
            .iter()
            .any(|l| l.period == period && l.period_start == start))
    }

    /// Stored logs of a driver, oldest period first.
    pub async fn history(&self, driver_id: Uuid) -> Result<Vec<PerformanceLog>> {
        Ok(self.logs.get_by_driver(driver_id).await?)
    }
}
