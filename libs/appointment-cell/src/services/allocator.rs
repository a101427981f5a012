// libs/appointment-cell/src/services/allocator.rs
use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::debug;
use uuid::Uuid;

use doctor_cell::models::{DoctorBookingProfile, WeeklyScheduleEntry};
use shared_config::ClinicSettings;

use crate::clock::ClinicClock;
use crate::models::{Appointment, BookingError, SlotUpdate};

/// Where the next booking of a day lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotDecision {
    pub assigned_time: DateTime<Utc>,
    /// 1-based place in the day's queue.
    pub position: u32,
    pub max_per_day: u32,
    pub ends_after_hours: bool,
}

/// Pure slot arithmetic. Holds no state beyond the clock and the re-flow
/// step, so the same instance serves every doctor.
#[derive(Debug, Clone)]
pub struct SlotAllocator {
    clock: ClinicClock,
    reflow_step: Duration,
}

impl SlotAllocator {
    pub fn new(clock: ClinicClock, reflow_step: Duration) -> Self {
        Self { clock, reflow_step }
    }

    pub fn from_settings(settings: &ClinicSettings) -> Result<Self, BookingError> {
        Ok(Self::new(
            ClinicClock::from_offset_minutes(settings.utc_offset_minutes)?,
            Duration::minutes(settings.reflow_step_minutes),
        ))
    }

    pub fn clock(&self) -> &ClinicClock {
        &self.clock
    }

    pub fn reflow_step(&self) -> Duration {
        self.reflow_step
    }

    /// Admission check. Returns the daily cap when another booking fits.
    pub fn check_admission(
        &self,
        entry: &WeeklyScheduleEntry,
        profile: &DoctorBookingProfile,
        booked_count: u32,
        calendar_date: NaiveDate,
    ) -> Result<u32, BookingError> {
        let doctor_id = profile.doctor_id;

        if !profile.is_published {
            return Err(BookingError::DoctorNotPublished(doctor_id));
        }

        if !entry.is_working {
            return Err(BookingError::DoctorNotAvailable {
                doctor_id,
                weekday: entry.day_of_week,
            });
        }

        let max_per_day = match profile.max_patients_per_day {
            Some(cap) if cap > 0 => cap as u32,
            _ => return Err(BookingError::InvalidCapacityConfiguration(doctor_id)),
        };

        // A non-positive duration would stack later visits on earlier ones.
        if profile.appointment_duration_minutes <= 0 {
            return Err(BookingError::InvalidCapacityConfiguration(doctor_id));
        }

        if booked_count >= max_per_day {
            return Err(BookingError::DayFullyBooked {
                calendar_date,
                max_per_day,
            });
        }

        Ok(max_per_day)
    }

    /// Slot assignment, assuming admission already passed. The first visit of
    /// the day gets the configured start time; every later one follows the
    /// latest assigned time by the configured duration.
    pub fn next_slot(
        &self,
        entry: &WeeklyScheduleEntry,
        profile: &DoctorBookingProfile,
        ledger: &[Appointment],
        calendar_date: NaiveDate,
    ) -> Result<DateTime<Utc>, BookingError> {
        match ledger.iter().map(|a| a.assigned_time).max() {
            None => self.clock.to_absolute(calendar_date, entry.start_time),
            Some(last) => Ok(last + Duration::minutes(profile.appointment_duration_minutes as i64)),
        }
    }

    /// Admission plus assignment. Both the estimate and the committing path
    /// call this, so they cannot disagree.
    pub fn allocate(
        &self,
        entry: &WeeklyScheduleEntry,
        profile: &DoctorBookingProfile,
        ledger: &[Appointment],
        calendar_date: NaiveDate,
    ) -> Result<SlotDecision, BookingError> {
        let booked_count = ledger.len() as u32;
        let max_per_day = self.check_admission(entry, profile, booked_count, calendar_date)?;
        let assigned_time = self.next_slot(entry, profile, ledger, calendar_date)?;

        let visit_end = assigned_time + Duration::minutes(profile.appointment_duration_minutes as i64);
        let end_local = self.clock.to_local(visit_end);
        let ends_after_hours = end_local.date > calendar_date || end_local.time > entry.end_time;

        debug!(
            "Doctor {} on {}: slot {} of {} at {}",
            profile.doctor_id,
            calendar_date,
            booked_count + 1,
            max_per_day,
            assigned_time
        );

        Ok(SlotDecision {
            assigned_time,
            position: booked_count + 1,
            max_per_day,
            ends_after_hours,
        })
    }

    /// Re-flow after `finished` ended at `finished_at`. The finished visit
    /// and every unfinished appointment assigned at or after the finish are
    /// packed from the finish instant onward in steps of the re-flow step,
    /// keeping their order. Only appointments whose time actually changes
    /// are returned.
    pub fn plan_reflow(
        &self,
        finished: Uuid,
        finished_at: DateTime<Utc>,
        ledger: &[Appointment],
    ) -> Vec<SlotUpdate> {
        let mut following: Vec<&Appointment> = ledger
            .iter()
            .filter(|a| (a.id == finished || !a.is_finished()) && a.assigned_time >= finished_at)
            .collect();
        following.sort_by(|a, b| {
            a.assigned_time
                .cmp(&b.assigned_time)
                .then(a.created_at.cmp(&b.created_at))
        });

        let mut cursor = finished_at;
        let mut updates = Vec::new();
        for appointment in following {
            if appointment.assigned_time != cursor {
                updates.push(SlotUpdate {
                    appointment_id: appointment.id,
                    previous_time: appointment.assigned_time,
                    assigned_time: cursor,
                });
            }
            cursor += self.reflow_step;
        }
        updates
    }
}
