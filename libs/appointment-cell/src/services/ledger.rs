// libs/appointment-cell/src/services/ledger.rs
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::Method;
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{Appointment, AppointmentStatus, BookingError, DayKey, SlotUpdate};

/// Actual finish of one appointment, written together with its re-flow.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FinishRecord {
    pub appointment_id: Uuid,
    pub finished_at: DateTime<Utc>,
    pub status: AppointmentStatus,
}

impl FinishRecord {
    fn apply(&self, appointment: &mut Appointment, now: DateTime<Utc>) {
        appointment.actual_finish_time = Some(self.finished_at);
        appointment.status = self.status;
        appointment.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LedgerError {
    #[error("Daily limit reached for {0}")]
    CapacityExceeded(DayKey),

    #[error("Appointment {0} not found")]
    NotFound(Uuid),

    #[error("Ledger storage error: {0}")]
    Storage(String),
}

impl From<LedgerError> for BookingError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::CapacityExceeded(key) => BookingError::CapacityExceeded {
                calendar_date: key.calendar_date,
            },
            LedgerError::NotFound(id) => BookingError::AppointmentNotFound(id),
            LedgerError::Storage(msg) => BookingError::Storage(msg),
        }
    }
}

/// Committed appointments per doctor and clinic-local day. Mutations go
/// through `append` and `commit_reflow` only, and callers
/// hold the day lock around each of them.
#[async_trait]
pub trait AppointmentLedger: Send + Sync {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, LedgerError>;

    /// Ordered by assigned time ascending.
    async fn list_for_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<Vec<Appointment>, LedgerError>;

    async fn count_for_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<u32, LedgerError>;

    /// Stores a new appointment unless the day already holds `max_per_day`.
    async fn append(&self, appointment: Appointment, max_per_day: u32) -> Result<Appointment, LedgerError>;

    /// Applies every update, plus the finish when given, or none of them.
    /// Returns the finished appointment as stored.
    async fn commit_reflow(
        &self,
        doctor_id: Uuid,
        calendar_date: NaiveDate,
        updates: &[SlotUpdate],
        finish: Option<FinishRecord>,
    ) -> Result<Option<Appointment>, LedgerError>;

    /// Applies every update or none of them.
    async fn rewrite_times(
        &self,
        doctor_id: Uuid,
        calendar_date: NaiveDate,
        updates: &[SlotUpdate],
    ) -> Result<(), LedgerError> {
        self.commit_reflow(doctor_id, calendar_date, updates, None)
            .await
            .map(|_| ())
    }
}

fn sort_by_slot(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        a.assigned_time
            .cmp(&b.assigned_time)
            .then(a.created_at.cmp(&b.created_at))
    });
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryLedger {
    appointments: RwLock<HashMap<Uuid, Appointment>>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    fn day_of(appointments: &HashMap<Uuid, Appointment>, key: DayKey) -> Vec<Appointment> {
        let mut day: Vec<Appointment> = appointments
            .values()
            .filter(|a| a.day_key() == key)
            .cloned()
            .collect();
        sort_by_slot(&mut day);
        day
    }
}

#[async_trait]
impl AppointmentLedger for InMemoryLedger {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, LedgerError> {
        Ok(self.appointments.read().await.get(&appointment_id).cloned())
    }

    async fn list_for_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<Vec<Appointment>, LedgerError> {
        let appointments = self.appointments.read().await;
        Ok(Self::day_of(&appointments, DayKey::new(doctor_id, calendar_date)))
    }

    async fn count_for_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<u32, LedgerError> {
        let key = DayKey::new(doctor_id, calendar_date);
        let appointments = self.appointments.read().await;
        Ok(appointments.values().filter(|a| a.day_key() == key).count() as u32)
    }

    async fn append(&self, appointment: Appointment, max_per_day: u32) -> Result<Appointment, LedgerError> {
        let key = appointment.day_key();
        let mut appointments = self.appointments.write().await;

        let booked = appointments.values().filter(|a| a.day_key() == key).count() as u32;
        if booked >= max_per_day {
            return Err(LedgerError::CapacityExceeded(key));
        }

        appointments.insert(appointment.id, appointment.clone());
        Ok(appointment)
    }

    async fn commit_reflow(
        &self,
        doctor_id: Uuid,
        calendar_date: NaiveDate,
        updates: &[SlotUpdate],
        finish: Option<FinishRecord>,
    ) -> Result<Option<Appointment>, LedgerError> {
        let key = DayKey::new(doctor_id, calendar_date);
        let mut appointments = self.appointments.write().await;

        // Validate everything before touching anything.
        let outside_day = |id: &Uuid| appointments.get(id).map_or(true, |a| a.day_key() != key);
        if let Some(missing) = updates.iter().map(|u| u.appointment_id).find(|id| outside_day(id)) {
            return Err(LedgerError::NotFound(missing));
        }
        if let Some(finish) = finish.filter(|f| outside_day(&f.appointment_id)) {
            return Err(LedgerError::NotFound(finish.appointment_id));
        }

        let now = Utc::now();
        for update in updates {
            if let Some(appointment) = appointments.get_mut(&update.appointment_id) {
                appointment.assigned_time = update.assigned_time;
                appointment.updated_at = now;
            }
        }

        let Some(finish) = finish else {
            return Ok(None);
        };
        Ok(appointments.get_mut(&finish.appointment_id).map(|appointment| {
            finish.apply(appointment, now);
            appointment.clone()
        }))
    }
}

// ==============================================================================
// SUPABASE
// ==============================================================================

const APPOINTMENTS_TABLE: &str = "/rest/v1/appointments";

/// PostgREST-backed ledger over the `appointments` table.
pub struct SupabaseLedger {
    supabase: SupabaseClient,
}

impl SupabaseLedger {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    fn day_path(doctor_id: Uuid, calendar_date: NaiveDate) -> String {
        format!(
            "{}?doctor_id=eq.{}&calendar_date=eq.{}",
            APPOINTMENTS_TABLE, doctor_id, calendar_date
        )
    }

    fn storage(e: anyhow::Error) -> LedgerError {
        LedgerError::Storage(e.to_string())
    }
}

#[async_trait]
impl AppointmentLedger for SupabaseLedger {
    async fn get(&self, appointment_id: Uuid) -> Result<Option<Appointment>, LedgerError> {
        let path = format!("{}?id=eq.{}", APPOINTMENTS_TABLE, appointment_id);
        let rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::storage)?;
        Ok(rows.into_iter().next())
    }

    async fn list_for_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<Vec<Appointment>, LedgerError> {
        let path = format!("{}&order=assigned_time.asc", Self::day_path(doctor_id, calendar_date));
        let mut rows: Vec<Appointment> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::storage)?;

        // created_at breaks ties the database order leaves open.
        sort_by_slot(&mut rows);
        debug!("Ledger for doctor {} on {} has {} rows", doctor_id, calendar_date, rows.len());
        Ok(rows)
    }

    async fn count_for_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<u32, LedgerError> {
        let path = format!("{}&select=id", Self::day_path(doctor_id, calendar_date));
        let rows: Vec<serde_json::Value> = self
            .supabase
            .request(Method::GET, &path, None, None)
            .await
            .map_err(Self::storage)?;
        Ok(rows.len() as u32)
    }

    async fn append(&self, appointment: Appointment, max_per_day: u32) -> Result<Appointment, LedgerError> {
        let key = appointment.day_key();
        if self.count_for_day(key.doctor_id, key.calendar_date).await? >= max_per_day {
            return Err(LedgerError::CapacityExceeded(key));
        }

        let rows: Vec<Appointment> = self
            .supabase
            .request_with_headers(
                Method::POST,
                APPOINTMENTS_TABLE,
                None,
                Some(json!(appointment)),
                Some(SupabaseClient::representation_headers()),
            )
            .await
            .map_err(Self::storage)?;

        rows.into_iter()
            .next()
            .ok_or_else(|| LedgerError::Storage("Insert returned no appointment".to_string()))
    }

    async fn commit_reflow(
        &self,
        doctor_id: Uuid,
        calendar_date: NaiveDate,
        updates: &[SlotUpdate],
        finish: Option<FinishRecord>,
    ) -> Result<Option<Appointment>, LedgerError> {
        if updates.is_empty() && finish.is_none() {
            return Ok(None);
        }

        let mut day = self.list_for_day(doctor_id, calendar_date).await?;
        let now = Utc::now();
        let mut changed: Vec<Uuid> = Vec::with_capacity(updates.len() + 1);

        for update in updates {
            let appointment = day
                .iter_mut()
                .find(|a| a.id == update.appointment_id)
                .ok_or(LedgerError::NotFound(update.appointment_id))?;
            appointment.assigned_time = update.assigned_time;
            appointment.updated_at = now;
            changed.push(appointment.id);
        }

        let mut finished = None;
        if let Some(finish) = finish {
            let appointment = day
                .iter_mut()
                .find(|a| a.id == finish.appointment_id)
                .ok_or(LedgerError::NotFound(finish.appointment_id))?;
            finish.apply(appointment, now);
            finished = Some(appointment.clone());
            if !changed.contains(&appointment.id) {
                changed.push(appointment.id);
            }
        }

        let rows: Vec<&Appointment> = day.iter().filter(|a| changed.contains(&a.id)).collect();

        // A single bulk upsert is one statement, so the day moves as a whole.
        let mut headers = HeaderMap::new();
        headers.insert(
            "Prefer",
            HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );
        let path = format!("{}?on_conflict=id", APPOINTMENTS_TABLE);

        self.supabase
            .request_with_headers::<()>(Method::POST, &path, None, Some(json!(rows)), Some(headers))
            .await
            .map_err(Self::storage)?;

        debug!("Committed {} row(s) for doctor {} on {}", rows.len(), doctor_id, calendar_date);
        Ok(finished)
    }
}
