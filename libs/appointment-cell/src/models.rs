// libs/appointment-cell/src/models.rs
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use doctor_cell::models::{DayOfWeek, ScheduleError};

// ==============================================================================
// CORE APPOINTMENT MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    /// Clinic-local day of the visit; never changes once booked.
    pub calendar_date: NaiveDate,
    /// Expected call time. Re-flow may move it within the same day.
    pub assigned_time: DateTime<Utc>,
    pub actual_finish_time: Option<DateTime<Utc>>,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Appointment {
    pub fn new(doctor_id: Uuid, patient_id: Uuid, calendar_date: NaiveDate, assigned_time: DateTime<Utc>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            doctor_id,
            patient_id,
            calendar_date,
            assigned_time,
            actual_finish_time: None,
            status: AppointmentStatus::Scheduled,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn day_key(&self) -> DayKey {
        DayKey::new(self.doctor_id, self.calendar_date)
    }

    /// Finished visits are never moved by a re-flow.
    pub fn is_finished(&self) -> bool {
        self.status == AppointmentStatus::Completed || self.actual_finish_time.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Scheduled,
    Completed,
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppointmentStatus::Scheduled => write!(f, "scheduled"),
            AppointmentStatus::Completed => write!(f, "completed"),
        }
    }
}

/// One doctor's ledger for one clinic-local day; the unit of serialization
/// for bookings and re-flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DayKey {
    pub doctor_id: Uuid,
    pub calendar_date: NaiveDate,
}

impl DayKey {
    pub fn new(doctor_id: Uuid, calendar_date: NaiveDate) -> Self {
        Self { doctor_id, calendar_date }
    }
}

impl fmt::Display for DayKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.doctor_id, self.calendar_date)
    }
}

/// New assigned time for one appointment, produced by re-flow planning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotUpdate {
    pub appointment_id: Uuid,
    pub previous_time: DateTime<Utc>,
    pub assigned_time: DateTime<Utc>,
}

// ==============================================================================
// REQUEST MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookAppointmentRequest {
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    /// Clinic-local `YYYY-MM-DD`.
    pub calendar_date: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AvailabilityQuery {
    pub doctor_id: Uuid,
    pub date: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CompleteAppointmentRequest {
    /// Defaults to now. RFC 3339, or clinic wall-clock `YYYY-MM-DDTHH:MM`.
    pub actual_finish_time: Option<String>,
}

// ==============================================================================
// RESPONSE MODELS
// ==============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct BookingConfirmation {
    pub appointment: Appointment,
    pub local_time: NaiveTime,
    /// 1-based place in the day's queue.
    pub position: u32,
    /// The visit is expected to run past the doctor's end time.
    pub ends_after_hours: bool,
    pub reminder_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DayStatus {
    Open,
    FullyBooked,
    NotWorking,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub doctor_id: Uuid,
    pub calendar_date: NaiveDate,
    pub weekday: DayOfWeek,
    pub status: DayStatus,
    pub is_working: bool,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub appointment_duration_minutes: i32,
    pub max_patients_per_day: Option<i32>,
    pub booked_count: u32,
    /// What `create_booking` would assign right now.
    pub next_slot: Option<DateTime<Utc>>,
    pub next_slot_local: Option<NaiveTime>,
    pub ends_after_hours: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct LedgerEntry {
    #[serde(flatten)]
    pub appointment: Appointment,
    pub local_time: NaiveTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct DayLedgerView {
    pub doctor_id: Uuid,
    pub calendar_date: NaiveDate,
    pub appointments: Vec<LedgerEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CompletionOutcome {
    pub appointment: Appointment,
    pub shifted: Vec<SlotUpdate>,
}

// ==============================================================================
// ERROR MODELS
// ==============================================================================

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BookingError {
    #[error("Doctor {0} has no booking profile")]
    DoctorNotConfigured(Uuid),

    #[error("Doctor {0} has no valid daily patient limit")]
    InvalidCapacityConfiguration(Uuid),

    #[error("Doctor {0} is not accepting bookings")]
    DoctorNotPublished(Uuid),

    #[error("Doctor does not work on {weekday}")]
    DoctorNotAvailable { doctor_id: Uuid, weekday: DayOfWeek },

    #[error("No appointments left on {calendar_date} (limit {max_per_day})")]
    DayFullyBooked { calendar_date: NaiveDate, max_per_day: u32 },

    #[error("The last appointment on {calendar_date} was just taken")]
    CapacityExceeded { calendar_date: NaiveDate },

    #[error("The schedule for {0} is being updated, please retry")]
    Busy(NaiveDate),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Appointment {0} not found")]
    AppointmentNotFound(Uuid),

    #[error("Appointment {0} is already completed")]
    AlreadyCompleted(Uuid),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<ScheduleError> for BookingError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::DoctorNotConfigured(doctor_id) => BookingError::DoctorNotConfigured(doctor_id),
            other => BookingError::Storage(other.to_string()),
        }
    }
}
