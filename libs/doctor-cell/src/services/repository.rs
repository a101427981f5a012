// libs/doctor-cell/src/services/repository.rs
use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use shared_database::supabase::SupabaseClient;

use crate::models::{DayOfWeek, DoctorBookingProfile, DoctorSchedule, ScheduleError, WeeklyScheduleEntry};

/// Storage for booking profiles and weekly schedules.
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn get_profile(&self, doctor_id: Uuid) -> Result<Option<DoctorBookingProfile>, ScheduleError>;

    async fn get_weekly_entry(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> Result<Option<WeeklyScheduleEntry>, ScheduleError>;

    /// Entries ordered Sunday first.
    async fn list_weekly_entries(&self, doctor_id: Uuid) -> Result<Vec<WeeklyScheduleEntry>, ScheduleError>;

    /// Stores a new profile together with its seven weekly entries.
    async fn insert_schedule(&self, schedule: &DoctorSchedule) -> Result<(), ScheduleError>;

    async fn save_weekly_entry(&self, entry: &WeeklyScheduleEntry) -> Result<(), ScheduleError>;

    async fn save_profile(&self, profile: &DoctorBookingProfile) -> Result<(), ScheduleError>;
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryScheduleRepository {
    profiles: RwLock<HashMap<Uuid, DoctorBookingProfile>>,
    entries: RwLock<HashMap<(Uuid, DayOfWeek), WeeklyScheduleEntry>>,
}

impl InMemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScheduleRepository for InMemoryScheduleRepository {
    async fn get_profile(&self, doctor_id: Uuid) -> Result<Option<DoctorBookingProfile>, ScheduleError> {
        Ok(self.profiles.read().await.get(&doctor_id).cloned())
    }

    async fn get_weekly_entry(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> Result<Option<WeeklyScheduleEntry>, ScheduleError> {
        Ok(self.entries.read().await.get(&(doctor_id, day)).cloned())
    }

    async fn list_weekly_entries(&self, doctor_id: Uuid) -> Result<Vec<WeeklyScheduleEntry>, ScheduleError> {
        let entries = self.entries.read().await;
        Ok(DayOfWeek::ALL
            .into_iter()
            .filter_map(|day| entries.get(&(doctor_id, day)).cloned())
            .collect())
    }

    async fn insert_schedule(&self, schedule: &DoctorSchedule) -> Result<(), ScheduleError> {
        let doctor_id = schedule.profile.doctor_id;
        let mut profiles = self.profiles.write().await;
        if profiles.contains_key(&doctor_id) {
            return Err(ScheduleError::AlreadyConfigured(doctor_id));
        }

        let mut entries = self.entries.write().await;
        for entry in &schedule.weekly {
            entries.insert((doctor_id, entry.day_of_week), entry.clone());
        }
        profiles.insert(doctor_id, schedule.profile.clone());
        Ok(())
    }

    async fn save_weekly_entry(&self, entry: &WeeklyScheduleEntry) -> Result<(), ScheduleError> {
        self.entries
            .write()
            .await
            .insert((entry.doctor_id, entry.day_of_week), entry.clone());
        Ok(())
    }

    async fn save_profile(&self, profile: &DoctorBookingProfile) -> Result<(), ScheduleError> {
        self.profiles.write().await.insert(profile.doctor_id, profile.clone());
        Ok(())
    }
}

// ==============================================================================
// SUPABASE
// ==============================================================================

const PROFILES_TABLE: &str = "/rest/v1/doctor_booking_profiles";
const WEEKLY_TABLE: &str = "/rest/v1/doctor_weekly_schedules";

/// PostgREST-backed repository. Weekly rows are keyed by (doctor_id, day_of_week).
pub struct SupabaseScheduleRepository {
    supabase: SupabaseClient,
}

impl SupabaseScheduleRepository {
    pub fn new(supabase: SupabaseClient) -> Self {
        Self { supabase }
    }

    async fn fetch<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ScheduleError> {
        let rows: Vec<Value> = self
            .supabase
            .request(Method::GET, path, None, None)
            .await
            .map_err(|e| ScheduleError::Storage(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                serde_json::from_value(row)
                    .map_err(|e| ScheduleError::Storage(format!("Failed to parse schedule row: {}", e)))
            })
            .collect()
    }

    async fn upsert(&self, table_path: &str, on_conflict: &str, body: Value) -> Result<(), ScheduleError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "Prefer",
            reqwest::header::HeaderValue::from_static("resolution=merge-duplicates,return=minimal"),
        );

        let path = format!("{}?on_conflict={}", table_path, on_conflict);
        self.supabase
            .request_with_headers::<()>(Method::POST, &path, None, Some(body), Some(headers))
            .await
            .map_err(|e| ScheduleError::Storage(e.to_string()))
    }
}

#[async_trait]
impl ScheduleRepository for SupabaseScheduleRepository {
    async fn get_profile(&self, doctor_id: Uuid) -> Result<Option<DoctorBookingProfile>, ScheduleError> {
        let path = format!("{}?doctor_id=eq.{}", PROFILES_TABLE, doctor_id);
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn get_weekly_entry(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> Result<Option<WeeklyScheduleEntry>, ScheduleError> {
        let path = format!("{}?doctor_id=eq.{}&day_of_week=eq.{}", WEEKLY_TABLE, doctor_id, day.code());
        Ok(self.fetch(&path).await?.into_iter().next())
    }

    async fn list_weekly_entries(&self, doctor_id: Uuid) -> Result<Vec<WeeklyScheduleEntry>, ScheduleError> {
        let path = format!("{}?doctor_id=eq.{}", WEEKLY_TABLE, doctor_id);
        let mut entries: Vec<WeeklyScheduleEntry> = self.fetch(&path).await?;
        entries.sort_by_key(|entry| entry.day_of_week.index());
        Ok(entries)
    }

    async fn insert_schedule(&self, schedule: &DoctorSchedule) -> Result<(), ScheduleError> {
        debug!("Inserting booking profile for doctor {}", schedule.profile.doctor_id);

        self.supabase
            .request_with_headers::<()>(
                Method::POST,
                PROFILES_TABLE,
                None,
                Some(json!(schedule.profile)),
                None,
            )
            .await
            .map_err(|e| {
                if e.to_string().starts_with("Conflict") {
                    ScheduleError::AlreadyConfigured(schedule.profile.doctor_id)
                } else {
                    ScheduleError::Storage(e.to_string())
                }
            })?;

        self.upsert(WEEKLY_TABLE, "doctor_id,day_of_week", json!(schedule.weekly)).await
    }

    async fn save_weekly_entry(&self, entry: &WeeklyScheduleEntry) -> Result<(), ScheduleError> {
        self.upsert(WEEKLY_TABLE, "doctor_id,day_of_week", json!([entry])).await
    }

    async fn save_profile(&self, profile: &DoctorBookingProfile) -> Result<(), ScheduleError> {
        self.upsert(PROFILES_TABLE, "doctor_id", json!([profile])).await
    }
}
