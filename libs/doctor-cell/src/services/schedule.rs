// libs/doctor-cell/src/services/schedule.rs
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{
    parse_wall_clock, DayOfWeek, DoctorBookingProfile, DoctorSchedule, ScheduleError,
    ScheduleTemplate, UpdateBookingProfileRequest, UpdateWeeklyEntryRequest, WeeklyScheduleEntry,
};
use crate::services::repository::ScheduleRepository;

/// Read side consumed by the slot allocator, plus the administrative edits
/// that keep exactly one entry per weekday.
pub struct ScheduleService {
    repository: Arc<dyn ScheduleRepository>,
    template: ScheduleTemplate,
}

impl ScheduleService {
    pub fn new(repository: Arc<dyn ScheduleRepository>) -> Self {
        Self {
            repository,
            template: ScheduleTemplate::default(),
        }
    }

    pub fn with_template(repository: Arc<dyn ScheduleRepository>, template: ScheduleTemplate) -> Self {
        Self { repository, template }
    }

    pub async fn get_profile(&self, doctor_id: Uuid) -> Result<DoctorBookingProfile, ScheduleError> {
        self.repository
            .get_profile(doctor_id)
            .await?
            .ok_or(ScheduleError::DoctorNotConfigured(doctor_id))
    }

    pub async fn get_weekly_entry(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
    ) -> Result<WeeklyScheduleEntry, ScheduleError> {
        // A doctor without a profile is unconfigured even if stray rows exist.
        self.get_profile(doctor_id).await?;

        self.repository
            .get_weekly_entry(doctor_id, day)
            .await?
            .ok_or_else(|| {
                warn!("Doctor {} has a profile but no {} entry", doctor_id, day);
                ScheduleError::DoctorNotConfigured(doctor_id)
            })
    }

    pub async fn get_schedule(&self, doctor_id: Uuid) -> Result<DoctorSchedule, ScheduleError> {
        let profile = self.get_profile(doctor_id).await?;
        let weekly = self.repository.list_weekly_entries(doctor_id).await?;
        debug!("Loaded {} weekly entries for doctor {}", weekly.len(), doctor_id);
        Ok(DoctorSchedule { profile, weekly })
    }

    /// Promotion to doctor: one profile and seven weekly entries from the template.
    pub async fn initialize_doctor(&self, doctor_id: Uuid) -> Result<DoctorSchedule, ScheduleError> {
        if self.repository.get_profile(doctor_id).await?.is_some() {
            return Err(ScheduleError::AlreadyConfigured(doctor_id));
        }

        let schedule = DoctorSchedule::from_template(doctor_id, &self.template, Utc::now());
        self.repository.insert_schedule(&schedule).await?;

        info!("Initialized booking schedule for doctor {}", doctor_id);
        Ok(schedule)
    }

    pub async fn update_weekly_entry(
        &self,
        doctor_id: Uuid,
        day: DayOfWeek,
        request: UpdateWeeklyEntryRequest,
    ) -> Result<WeeklyScheduleEntry, ScheduleError> {
        let current = self.get_weekly_entry(doctor_id, day).await?;
        let updated = apply_entry_update(current, &request)?;

        self.repository.save_weekly_entry(&updated).await?;

        info!(
            "Updated {} schedule for doctor {}: working={} {}-{}",
            day, doctor_id, updated.is_working, updated.start_time, updated.end_time
        );
        Ok(updated)
    }

    pub async fn update_profile(
        &self,
        doctor_id: Uuid,
        request: UpdateBookingProfileRequest,
    ) -> Result<DoctorBookingProfile, ScheduleError> {
        let current = self.get_profile(doctor_id).await?;
        let updated = apply_profile_update(current, &request)?;

        self.repository.save_profile(&updated).await?;

        info!(
            "Updated booking profile for doctor {}: {} min visits, cap {:?}, published={}",
            doctor_id,
            updated.appointment_duration_minutes,
            updated.max_patients_per_day,
            updated.is_published
        );
        Ok(updated)
    }
}

/// Working days must open before they close; closed days keep whatever
/// hours they had.
pub fn apply_entry_update(
    mut entry: WeeklyScheduleEntry,
    request: &UpdateWeeklyEntryRequest,
) -> Result<WeeklyScheduleEntry, ScheduleError> {
    if let Some(is_working) = request.is_working {
        entry.is_working = is_working;
    }
    if let Some(start) = &request.start_time {
        entry.start_time = parse_wall_clock(start)?;
    }
    if let Some(end) = &request.end_time {
        entry.end_time = parse_wall_clock(end)?;
    }

    if entry.is_working && entry.start_time >= entry.end_time {
        return Err(ScheduleError::Validation(
            "Start time must be before end time".to_string(),
        ));
    }

    entry.updated_at = Utc::now();
    Ok(entry)
}

pub fn apply_profile_update(
    mut profile: DoctorBookingProfile,
    request: &UpdateBookingProfileRequest,
) -> Result<DoctorBookingProfile, ScheduleError> {
    if let Some(duration) = request.appointment_duration_minutes {
        if duration <= 0 {
            return Err(ScheduleError::Validation(
                "Appointment duration must be positive".to_string(),
            ));
        }
        profile.appointment_duration_minutes = duration;
    }
    if let Some(cap) = request.max_patients_per_day {
        if cap <= 0 {
            return Err(ScheduleError::Validation(
                "Maximum patients per day must be positive".to_string(),
            ));
        }
        profile.max_patients_per_day = Some(cap);
    }
    if let Some(is_published) = request.is_published {
        profile.is_published = is_published;
    }

    profile.updated_at = Utc::now();
    Ok(profile)
}
