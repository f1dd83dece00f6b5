//! Periodic per-driver performance logs.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::TimeRange;
use crate::driver::{Driver, DriverEvent};
use crate::error::{DomainError, Result};
use crate::tracking::{EventType, Trip};

/// Length of a performance rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformancePeriod {
    Daily,
    Weekly,
    Monthly,
}

impl PerformancePeriod {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// The half-open window of this period starting at `start`. Monthly
    /// windows end on the same day of the next month, clamped to its last day.
    pub fn window(&self, start: DateTime<Utc>) -> Result<TimeRange> {
        let end = match self {
            Self::Daily => start.checked_add_signed(Duration::days(1)),
            Self::Weekly => start.checked_add_signed(Duration::days(7)),
            Self::Monthly => start.checked_add_months(Months::new(1)),
        };
        let end = end.ok_or_else(|| {
            DomainError::InvariantViolation(format!("{} period from {start} is out of range", self.as_str()))
        })?;
        Ok(TimeRange { start, end })
    }
}

/// One driver's activity over one period. Scores are the driver's standing
/// when the log was taken; counts cover only the period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceLog {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub period: PerformancePeriod,
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,

    // Scores
    pub performance_score: f64,
    pub safety_score: f64,
    pub efficiency_score: f64,
    pub overall_score: f64,

    // Driving
    pub trips_completed: u32,
    pub distance_km: f64,
    pub hours_driven: f64,
    pub average_speed_kmh: f64,
    pub fuel_consumed_l: f64,
    pub fuel_efficiency_km_l: f64,

    // Behavior
    pub violations: u32,
    pub harsh_braking: u32,
    pub rapid_acceleration: u32,
    pub sharp_cornering: u32,
    pub speeding_events: u32,
    pub accidents_to_date: u32,

    pub created_at: DateTime<Utc>,
}

impl PerformanceLog {
    /// Build the log from the driver's trips completed inside `window` and
    /// the violations that occurred inside it. Records belonging to other
    /// drivers or falling outside the window are skipped, so callers may
    /// pass a superset.
    #[must_use]
    pub fn rollup(
        driver: &Driver,
        period: PerformancePeriod,
        window: TimeRange,
        trips: &[Trip],
        events: &[DriverEvent],
        now: DateTime<Utc>,
    ) -> Self {
        let mut log = Self {
            id: Uuid::new_v4(),
            driver_id: driver.id,
            period,
            period_start: window.start,
            period_end: window.end,
            performance_score: driver.performance_score,
            safety_score: driver.safety_score,
            efficiency_score: driver.efficiency_score,
            overall_score: driver.overall_score,
            trips_completed: 0,
            distance_km: 0.0,
            hours_driven: 0.0,
            average_speed_kmh: 0.0,
            fuel_consumed_l: 0.0,
            fuel_efficiency_km_l: 0.0,
            violations: 0,
            harsh_braking: 0,
            rapid_acceleration: 0,
            sharp_cornering: 0,
            speeding_events: 0,
            accidents_to_date: driver.accidents,
            created_at: now,
        };

        let completed = trips.iter().filter(|t| {
            t.driver_id == Some(driver.id) && t.is_completed() && t.end_time.is_some_and(|end| window.contains(end))
        });
        let mut seconds = 0_i64;
        for trip in completed {
            log.trips_completed += 1;
            log.distance_km += trip.total_distance_km;
            log.fuel_consumed_l += trip.fuel_consumed_l;
            seconds += trip.total_duration_s.max(0);
        }
        #[allow(clippy::cast_precision_loss)]
        let hours = seconds as f64 / 3600.0;
        log.hours_driven = hours;
        if log.hours_driven > 0.0 {
            log.average_speed_kmh = log.distance_km / log.hours_driven;
        }
        if log.fuel_consumed_l > 0.0 {
            log.fuel_efficiency_km_l = log.distance_km / log.fuel_consumed_l;
        }

        let violations = events
            .iter()
            .filter(|e| e.driver_id == driver.id && e.is_violation() && window.contains(e.occurred_at));
        for event in violations {
            log.violations += 1;
            match event.event_type {
                EventType::HarshBraking => log.harsh_braking += 1,
                EventType::RapidAcceleration => log.rapid_acceleration += 1,
                EventType::SharpCornering => log.sharp_cornering += 1,
                EventType::Speeding => log.speeding_events += 1,
                EventType::Idling => {}
            }
        }
        log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::{Severity, TripStatus};
    use chrono::TimeZone;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 31, 0, 0, 0).unwrap()
    }

    fn completed_trip(driver: &Driver, end: DateTime<Utc>, km: f64, secs: i64, fuel: f64) -> Trip {
        let mut trip = Trip::planned(driver.company_id, Uuid::new_v4(), Some(driver.id), "delivery", end);
        trip.status = TripStatus::Completed;
        trip.end_time = Some(end);
        trip.total_distance_km = km;
        trip.total_duration_s = secs;
        trip.fuel_consumed_l = fuel;
        trip
    }

    fn event(driver_id: Uuid, event_type: EventType, at: DateTime<Utc>) -> DriverEvent {
        DriverEvent {
            id: Uuid::new_v4(),
            driver_id,
            vehicle_id: Uuid::new_v4(),
            trip_id: None,
            event_type,
            severity: Severity::Medium,
            description: String::new(),
            latitude: -6.2,
            longitude: 106.8,
            speed_kmh: 0.0,
            measured: 0.0,
            threshold: 0.0,
            occurred_at: at,
        }
    }

    #[test]
    fn test_period_windows() {
        let daily = PerformancePeriod::Daily.window(start()).unwrap();
        assert_eq!(daily.end - daily.start, Duration::days(1));
        let weekly = PerformancePeriod::Weekly.window(start()).unwrap();
        assert_eq!(weekly.end - weekly.start, Duration::days(7));
        // January 31st plus a month clamps to the end of February
        let monthly = PerformancePeriod::Monthly.window(start()).unwrap();
        assert_eq!(monthly.end, Utc.with_ymd_and_hms(2026, 2, 28, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_rollup_counts_only_the_window() {
        let mut driver = Driver::new(Uuid::new_v4(), "Budi", "Santoso", start());
        driver.safety_score = 88.0;
        driver.accidents = 1;
        let window = PerformancePeriod::Daily.window(start()).unwrap();
        let inside = start() + Duration::hours(10);
        let outside = start() + Duration::days(2);

        let mut active = completed_trip(&driver, inside, 5.0, 600, 1.0);
        active.status = TripStatus::Active;
        let trips = vec![
            completed_trip(&driver, inside, 60.0, 3600, 5.0),
            completed_trip(&driver, inside, 30.0, 1800, 2.5),
            completed_trip(&driver, outside, 100.0, 7200, 8.0),
            active,
        ];
        let other = Uuid::new_v4();
        let events = vec![
            event(driver.id, EventType::Speeding, inside),
            event(driver.id, EventType::Speeding, inside),
            event(driver.id, EventType::HarshBraking, inside),
            event(driver.id, EventType::Idling, inside),
            event(driver.id, EventType::SharpCornering, outside),
            event(other, EventType::Speeding, inside),
        ];

        let log = PerformanceLog::rollup(&driver, PerformancePeriod::Daily, window, &trips, &events, window.end);

        assert_eq!(log.trips_completed, 2);
        assert!((log.distance_km - 90.0).abs() < 1e-9);
        assert!((log.hours_driven - 1.5).abs() < 1e-9);
        assert!((log.average_speed_kmh - 60.0).abs() < 1e-9);
        assert!((log.fuel_efficiency_km_l - 12.0).abs() < 1e-9);
        assert_eq!(log.violations, 3);
        assert_eq!(log.speeding_events, 2);
        assert_eq!(log.harsh_braking, 1);
        assert_eq!(log.sharp_cornering, 0);
        assert_eq!(log.safety_score, 88.0);
        assert_eq!(log.accidents_to_date, 1);
        assert_eq!(log.period_start, window.start);
    }

    #[test]
    fn test_rollup_of_idle_period_is_zero() {
        let driver = Driver::new(Uuid::new_v4(), "Siti", "Rahma", start());
        let window = PerformancePeriod::Weekly.window(start()).unwrap();
        let log = PerformanceLog::rollup(&driver, PerformancePeriod::Weekly, window, &[], &[], window.end);
        assert_eq!(log.trips_completed, 0);
        assert_eq!(log.average_speed_kmh, 0.0);
        assert_eq!(log.fuel_efficiency_km_l, 0.0);
        assert_eq!(log.overall_score, 100.0);
    }
}
