//! Drivers, their scores and recorded behavior events.
//!
//! The four score fields live in `[0, 100]` and `overall_score` is always
//! the rounded mean of the other three. Every mutation computes the new
//! scores first and commits only if they hold, so a rejected call leaves the
//! driver untouched.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::documents::DocumentKind;
use crate::error::{DomainError, Result};
use crate::tracking::{EventType, Severity};

/// Starting value of every score.
pub const BASELINE_SCORE: f64 = 100.0;

/// Safety points lost per accident.
pub const ACCIDENT_PENALTY: f64 = 20.0;

/// Overall score from which a driver counts as a high performer.
pub const HIGH_PERFORMER_THRESHOLD: f64 = 85.0;

// =============================================================================
// ENUMS
// =============================================================================

/// Driver duty status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    #[default]
    Available,
    Busy,
    Offline,
    Inactive,
}

impl DriverStatus {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Busy => "busy",
            Self::Offline => "offline",
            Self::Inactive => "inactive",
        }
    }
}

/// Employment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmploymentStatus {
    #[default]
    Active,
    Inactive,
    Terminated,
}

/// Letter grade derived from the overall score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Grade {
    A,
    B,
    C,
    D,
    F,
}

impl Grade {
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        match score {
            s if s >= 90.0 => Self::A,
            s if s >= 80.0 => Self::B,
            s if s >= 70.0 => Self::C,
            s if s >= 60.0 => Self::D,
            _ => Self::F,
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
            Self::D => "D",
            Self::F => "F",
        }
    }
}

/// Safety points lost per violation of the given severity.
#[must_use]
pub const fn safety_penalty(severity: Severity) -> f64 {
    match severity {
        Severity::Critical => 10.0,
        Severity::High => 5.0,
        Severity::Medium => 2.0,
        Severity::Low => 1.0,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn in_score_range(value: f64) -> bool {
    (0.0..=100.0).contains(&value)
}

// =============================================================================
// ENTITY TYPES
// =============================================================================

/// Driver entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub id: Uuid,
    pub company_id: Uuid,
    pub vehicle_id: Option<Uuid>,

    // Identity
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub nik: String,

    // License (SIM)
    pub license_number: String,
    pub license_type: String,
    pub license_expiry: Option<DateTime<Utc>>,

    // Status
    pub employment_status: EmploymentStatus,
    pub status: DriverStatus,
    pub is_active: bool,

    // Scores
    pub performance_score: f64,
    pub safety_score: f64,
    pub efficiency_score: f64,
    pub overall_score: f64,

    // Statistics
    pub total_trips: u32,
    pub total_distance_km: f64,
    pub total_hours: f64,
    pub average_speed_kmh: f64,

    // Violations
    pub violations: u32,
    pub accidents: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
    pub last_accident_at: Option<DateTime<Utc>>,

    // Compliance
    pub training_completed: bool,
    pub next_training_date: Option<DateTime<Utc>>,
    pub medical_checkup_expiry: Option<DateTime<Utc>>,

    pub last_active_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Identity papers required to register a driver
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverDocuments {
    pub nik: String,
    pub license_number: String,
    /// SIM class: A, B1, B2, C, D
    pub license_type: String,
    pub license_expiry: Option<DateTime<Utc>>,
}

impl Driver {
    /// New available driver with baseline scores.
    #[must_use]
    pub fn new(
        company_id: Uuid,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            company_id,
            vehicle_id: None,
            first_name: first_name.into(),
            last_name: last_name.into(),
            phone: String::new(),
            nik: String::new(),
            license_number: String::new(),
            license_type: String::new(),
            license_expiry: None,
            employment_status: EmploymentStatus::Active,
            status: DriverStatus::Available,
            is_active: true,
            performance_score: BASELINE_SCORE,
            safety_score: BASELINE_SCORE,
            efficiency_score: BASELINE_SCORE,
            overall_score: BASELINE_SCORE,
            total_trips: 0,
            total_distance_km: 0.0,
            total_hours: 0.0,
            average_speed_kmh: 0.0,
            violations: 0,
            accidents: 0,
            last_violation_at: None,
            last_accident_at: None,
            training_completed: true,
            next_training_date: None,
            medical_checkup_expiry: None,
            last_active_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// New driver with checked identity papers. A malformed NIK or SIM
    /// number is rejected.
    pub fn register(
        company_id: Uuid,
        first_name: impl Into<String>,
        last_name: impl Into<String>,
        documents: DriverDocuments,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        DocumentKind::Nik.validate(&documents.nik)?;
        DocumentKind::Sim.validate(&documents.license_number)?;
        if documents.license_type.trim().is_empty() {
            return Err(DomainError::InvariantViolation(
                "license type must not be empty".to_string(),
            ));
        }

        let mut driver = Self::new(company_id, first_name, last_name, now);
        driver.nik = documents.nik;
        driver.license_number = documents.license_number;
        driver.license_type = documents.license_type;
        driver.license_expiry = documents.license_expiry;
        Ok(driver)
    }

    #[must_use]
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }

    /// Name with the SIM number, for listings.
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{} ({})", self.full_name(), self.license_number)
    }

    pub fn update_last_active(&mut self, now: DateTime<Utc>) {
        self.last_active_at = Some(now);
    }

    // -------------------------------------------------------------------------
    // Scoring
    // -------------------------------------------------------------------------

    fn commit_scores(&mut self, performance: f64, safety: f64, efficiency: f64) -> Result<()> {
        if ![performance, safety, efficiency].into_iter().all(in_score_range) {
            return Err(DomainError::InvariantViolation(format!(
                "scores out of range: performance={performance}, safety={safety}, efficiency={efficiency}"
            )));
        }
        let overall = round2((performance + safety + efficiency) / 3.0).clamp(0.0, 100.0);
        self.performance_score = performance;
        self.safety_score = safety;
        self.efficiency_score = efficiency;
        self.overall_score = overall;
        Ok(())
    }

    /// Set all three input scores. Out-of-range values are rejected.
    pub fn update_scores(
        &mut self,
        performance: f64,
        safety: f64,
        efficiency: f64,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.commit_scores(performance, safety, efficiency)?;
        self.updated_at = now;
        Ok(())
    }

    /// Deduct safety for one violation, floored at zero.
    pub fn apply_violation(&mut self, severity: Severity, now: DateTime<Utc>) -> Result<()> {
        let safety = (self.safety_score - safety_penalty(severity)).max(0.0);
        self.commit_scores(self.performance_score, safety, self.efficiency_score)?;
        self.violations += 1;
        self.last_violation_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    pub fn apply_accident(&mut self, now: DateTime<Utc>) -> Result<()> {
        let safety = (self.safety_score - ACCIDENT_PENALTY).max(0.0);
        self.commit_scores(self.performance_score, safety, self.efficiency_score)?;
        self.accidents += 1;
        self.last_accident_at = Some(now);
        self.updated_at = now;
        Ok(())
    }

    #[must_use]
    pub fn grade(&self) -> Grade {
        Grade::from_score(self.overall_score)
    }

    #[must_use]
    pub fn is_high_performer(&self) -> bool {
        self.overall_score >= HIGH_PERFORMER_THRESHOLD
    }

    #[must_use]
    pub fn needs_attention(&self) -> bool {
        self.overall_score < 70.0 || self.violations > 5 || self.accidents > 0
    }

    // -------------------------------------------------------------------------
    // Eligibility
    // -------------------------------------------------------------------------

    #[must_use]
    pub fn is_license_expired(&self, now: DateTime<Utc>) -> bool {
        self.license_expiry.is_some_and(|expiry| now > expiry)
    }

    #[must_use]
    pub fn is_medical_checkup_expired(&self, now: DateTime<Utc>) -> bool {
        self.medical_checkup_expiry.is_some_and(|expiry| now > expiry)
    }

    #[must_use]
    pub fn is_training_due(&self, now: DateTime<Utc>) -> bool {
        self.next_training_date.is_some_and(|due| now > due)
    }

    #[must_use]
    pub fn can_drive(&self, now: DateTime<Utc>) -> bool {
        self.is_active
            && self.status == DriverStatus::Available
            && self.employment_status == EmploymentStatus::Active
            && !self.is_license_expired(now)
            && !self.is_medical_checkup_expired(now)
            && self.training_completed
    }

    // -------------------------------------------------------------------------
    // Assignment & statistics
    // -------------------------------------------------------------------------

    pub fn assign_vehicle(&mut self, vehicle_id: Uuid, now: DateTime<Utc>) {
        self.vehicle_id = Some(vehicle_id);
        self.status = DriverStatus::Busy;
        self.update_last_active(now);
        self.updated_at = now;
    }

    pub fn unassign_vehicle(&mut self, now: DateTime<Utc>) -> Option<Uuid> {
        self.status = DriverStatus::Available;
        self.updated_at = now;
        self.vehicle_id.take()
    }

    /// Fold a completed trip into the cumulative counters.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_trip(&mut self, distance_km: f64, duration_s: i64, now: DateTime<Utc>) {
        self.total_trips += 1;
        self.total_distance_km += distance_km.max(0.0);
        self.total_hours += duration_s.max(0) as f64 / 3600.0;
        if self.total_hours > 0.0 {
            self.average_speed_kmh = self.total_distance_km / self.total_hours;
        }
        self.update_last_active(now);
        self.updated_at = now;
    }
}

/// An immutable record of one detected behavior occurrence, always
/// attributed to a driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriverEvent {
    pub id: Uuid,
    pub driver_id: Uuid,
    pub vehicle_id: Uuid,
    pub trip_id: Option<Uuid>,

    pub event_type: EventType,
    pub severity: Severity,
    pub description: String,

    // Location and context
    pub latitude: f64,
    pub longitude: f64,
    pub speed_kmh: f64,
    pub measured: f64,
    pub threshold: f64,

    pub occurred_at: DateTime<Utc>,
}

impl DriverEvent {
    /// Whether the event counts against the driver's safety score.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        self.event_type.is_violation()
    }
}
