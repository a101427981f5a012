// libs/appointment-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use doctor_cell::models::{DoctorBookingProfile, WeeklyScheduleEntry};
use doctor_cell::services::ScheduleService;
use reminder_cell::{NotificationTrigger, ReminderContext};

use crate::models::{
    Appointment, AppointmentStatus, AvailabilityResponse, BookingConfirmation, BookingError,
    CompletionOutcome, DayKey, DayLedgerView, DayStatus, LedgerEntry, SlotUpdate,
};
use crate::services::allocator::{SlotAllocator, SlotDecision};
use crate::services::ledger::{AppointmentLedger, FinishRecord};
use crate::services::locking::{DayLease, DayLockManager};

/// Booking entry points: create, estimate, complete. Every ledger mutation
/// for a doctor-day happens while that day's lock is held.
pub struct BookingService {
    schedules: Arc<ScheduleService>,
    ledger: Arc<dyn AppointmentLedger>,
    locks: Arc<dyn DayLockManager>,
    reminders: Arc<dyn NotificationTrigger>,
    allocator: SlotAllocator,
    reminder_lead: Duration,
}

impl BookingService {
    pub fn new(
        schedules: Arc<ScheduleService>,
        ledger: Arc<dyn AppointmentLedger>,
        locks: Arc<dyn DayLockManager>,
        reminders: Arc<dyn NotificationTrigger>,
        allocator: SlotAllocator,
        reminder_lead: Duration,
    ) -> Self {
        Self {
            schedules,
            ledger,
            locks,
            reminders,
            allocator,
            reminder_lead,
        }
    }

    pub fn allocator(&self) -> &SlotAllocator {
        &self.allocator
    }

    async fn day_configuration(
        &self,
        doctor_id: Uuid,
        calendar_date: NaiveDate,
    ) -> Result<(DoctorBookingProfile, WeeklyScheduleEntry), BookingError> {
        let profile = self.schedules.get_profile(doctor_id).await?;
        let entry = self
            .schedules
            .get_weekly_entry(doctor_id, self.allocator.clock().weekday_of(calendar_date))
            .await?;
        Ok((profile, entry))
    }

    async fn release(&self, lease: DayLease) {
        let key = lease.key();
        if let Err(e) = self.locks.release(lease).await {
            warn!("Failed to release day lock {}: {}", key, e);
        }
    }

    // ==========================================================================
    // CREATE
    // ==========================================================================

    /// Admits and commits one booking. `recipient` is where the reminder goes;
    /// without one no reminder is scheduled.
    #[instrument(skip(self, recipient))]
    pub async fn create_booking(
        &self,
        doctor_id: Uuid,
        patient_id: Uuid,
        calendar_date: NaiveDate,
        recipient: Option<String>,
    ) -> Result<BookingConfirmation, BookingError> {
        let (profile, entry) = self.day_configuration(doctor_id, calendar_date).await?;

        let lease = self.locks.acquire(DayKey::new(doctor_id, calendar_date)).await?;
        let committed = self
            .commit_booking(&entry, &profile, patient_id, calendar_date)
            .await;
        self.release(lease).await;

        let (appointment, decision) = match committed {
            Ok(committed) => committed,
            Err(e) => {
                warn!("Booking rejected for doctor {} on {}: {}", doctor_id, calendar_date, e);
                return Err(e);
            }
        };

        info!(
            "Booked appointment {} for patient {} with doctor {} at {} (#{} of {})",
            appointment.id,
            patient_id,
            doctor_id,
            appointment.assigned_time,
            decision.position,
            decision.max_per_day
        );

        let reminder_at = match recipient.as_deref() {
            Some(recipient) => self.schedule_reminder(&appointment, recipient).await,
            None => {
                debug!("No reminder recipient for appointment {}", appointment.id);
                None
            }
        };

        Ok(BookingConfirmation {
            local_time: self.allocator.clock().to_local(appointment.assigned_time).time,
            position: decision.position,
            ends_after_hours: decision.ends_after_hours,
            reminder_at,
            appointment,
        })
    }

    async fn commit_booking(
        &self,
        entry: &WeeklyScheduleEntry,
        profile: &DoctorBookingProfile,
        patient_id: Uuid,
        calendar_date: NaiveDate,
    ) -> Result<(Appointment, SlotDecision), BookingError> {
        let day = self.ledger.list_for_day(profile.doctor_id, calendar_date).await?;
        let decision = self.allocator.allocate(entry, profile, &day, calendar_date)?;

        let appointment = Appointment::new(profile.doctor_id, patient_id, calendar_date, decision.assigned_time);
        let appointment = self.ledger.append(appointment, decision.max_per_day).await?;
        Ok((appointment, decision))
    }

    // ==========================================================================
    // ESTIMATE
    // ==========================================================================

    /// Schedule for the day plus the slot a booking would get right now.
    #[instrument(skip(self))]
    pub async fn get_availability(
        &self,
        doctor_id: Uuid,
        calendar_date: NaiveDate,
    ) -> Result<AvailabilityResponse, BookingError> {
        let (profile, entry) = self.day_configuration(doctor_id, calendar_date).await?;
        let day = self.ledger.list_for_day(doctor_id, calendar_date).await?;

        let (status, decision) = match self.allocator.allocate(&entry, &profile, &day, calendar_date) {
            Ok(decision) => (DayStatus::Open, Some(decision)),
            Err(BookingError::DoctorNotAvailable { .. }) => (DayStatus::NotWorking, None),
            Err(BookingError::DayFullyBooked { .. }) => (DayStatus::FullyBooked, None),
            Err(e) => return Err(e),
        };

        let next_slot = decision.map(|d| d.assigned_time);
        Ok(AvailabilityResponse {
            doctor_id,
            calendar_date,
            weekday: entry.day_of_week,
            status,
            is_working: entry.is_working,
            start_time: entry.start_time,
            end_time: entry.end_time,
            appointment_duration_minutes: profile.appointment_duration_minutes,
            max_patients_per_day: profile.max_patients_per_day,
            booked_count: day.len() as u32,
            next_slot,
            next_slot_local: next_slot.map(|t| self.allocator.clock().to_local(t).time),
            ends_after_hours: decision.is_some_and(|d| d.ends_after_hours),
        })
    }

    // ==========================================================================
    // COMPLETE / RE-FLOW
    // ==========================================================================

    /// Records the actual finish and re-flows the rest of the day. The
    /// appointment's status is left as it is.
    #[instrument(skip(self))]
    pub async fn record_actual_finish(
        &self,
        appointment_id: Uuid,
        finished_at: DateTime<Utc>,
    ) -> Result<CompletionOutcome, BookingError> {
        self.finish_and_reflow(appointment_id, finished_at, false).await
    }

    /// Marks the visit completed, then re-flows like `record_actual_finish`.
    #[instrument(skip(self))]
    pub async fn record_completion(
        &self,
        appointment_id: Uuid,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<CompletionOutcome, BookingError> {
        let finished_at = finished_at.unwrap_or_else(Utc::now);
        let outcome = self.finish_and_reflow(appointment_id, finished_at, true).await?;

        if let Err(e) = self.reminders.cancel(appointment_id).await {
            warn!("Could not cancel reminder for completed appointment {}: {}", appointment_id, e);
        }
        Ok(outcome)
    }

    async fn finish_and_reflow(
        &self,
        appointment_id: Uuid,
        finished_at: DateTime<Utc>,
        mark_completed: bool,
    ) -> Result<CompletionOutcome, BookingError> {
        let target = self.get_appointment(appointment_id).await?;
        if mark_completed && target.status == AppointmentStatus::Completed {
            return Err(BookingError::AlreadyCompleted(appointment_id));
        }

        // Re-flow never moves a visit to another day.
        let finish_local = self.allocator.clock().to_local(finished_at);
        if finish_local.date != target.calendar_date {
            warn!(
                "Finish {} for appointment {} falls on {}, not its day {}",
                finished_at, appointment_id, finish_local.date, target.calendar_date
            );
            return Err(BookingError::InvalidTimestamp(format!(
                "Finish time {} is not on the appointment's day {}",
                finished_at, target.calendar_date
            )));
        }

        let lease = self.locks.acquire(target.day_key()).await?;
        let result = self.reflow_locked(&target, finished_at, mark_completed).await;
        self.release(lease).await;

        let outcome = result?;
        info!(
            "Recorded finish of appointment {} at {}; {} later appointment(s) moved",
            appointment_id,
            finished_at,
            outcome.shifted.len()
        );

        self.reschedule_reminders(&outcome.shifted).await;
        Ok(outcome)
    }

    async fn reflow_locked(
        &self,
        target: &Appointment,
        finished_at: DateTime<Utc>,
        mark_completed: bool,
    ) -> Result<CompletionOutcome, BookingError> {
        // Re-read under the lock; a concurrent completion may have won.
        let current = self
            .ledger
            .get(target.id)
            .await?
            .ok_or(BookingError::AppointmentNotFound(target.id))?;
        if mark_completed && current.status == AppointmentStatus::Completed {
            return Err(BookingError::AlreadyCompleted(target.id));
        }

        let day = self.ledger.list_for_day(current.doctor_id, current.calendar_date).await?;
        let shifted = self.allocator.plan_reflow(current.id, finished_at, &day);

        let status = if mark_completed {
            AppointmentStatus::Completed
        } else {
            current.status
        };
        let finish = FinishRecord {
            appointment_id: current.id,
            finished_at,
            status,
        };

        // The finish and the shifted times land in one write.
        let appointment = self
            .ledger
            .commit_reflow(current.doctor_id, current.calendar_date, &shifted, Some(finish))
            .await?
            .ok_or(BookingError::AppointmentNotFound(current.id))?;

        Ok(CompletionOutcome { appointment, shifted })
    }

    // ==========================================================================
    // READS
    // ==========================================================================

    pub async fn get_appointment(&self, appointment_id: Uuid) -> Result<Appointment, BookingError> {
        self.ledger
            .get(appointment_id)
            .await?
            .ok_or(BookingError::AppointmentNotFound(appointment_id))
    }

    /// The day's queue with clinic-local times, earliest first.
    pub async fn list_day(&self, doctor_id: Uuid, calendar_date: NaiveDate) -> Result<DayLedgerView, BookingError> {
        let clock = self.allocator.clock();
        let appointments = self
            .ledger
            .list_for_day(doctor_id, calendar_date)
            .await?
            .into_iter()
            .map(|appointment| LedgerEntry {
                local_time: clock.to_local(appointment.assigned_time).time,
                appointment,
            })
            .collect();

        Ok(DayLedgerView {
            doctor_id,
            calendar_date,
            appointments,
        })
    }

    // ==========================================================================
    // REMINDERS
    // ==========================================================================

    fn reminder_fire_time(&self, assigned_time: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let fire_at = assigned_time - self.reminder_lead;
        (fire_at > Utc::now()).then_some(fire_at)
    }

    async fn schedule_reminder(&self, appointment: &Appointment, recipient: &str) -> Option<DateTime<Utc>> {
        let Some(fire_at) = self.reminder_fire_time(appointment.assigned_time) else {
            debug!("Reminder time for appointment {} already passed", appointment.id);
            return None;
        };

        let context = ReminderContext {
            appointment_id: appointment.id,
            doctor_id: appointment.doctor_id,
            patient_id: appointment.patient_id,
            visit_time: self.allocator.clock().in_clinic_time(appointment.assigned_time),
        };

        match self.reminders.schedule(recipient, fire_at, context).await {
            Ok(()) => Some(fire_at),
            Err(e) => {
                warn!("Could not schedule reminder for appointment {}: {}", appointment.id, e);
                None
            }
        }
    }

    async fn reschedule_reminders(&self, shifted: &[SlotUpdate]) {
        for update in shifted {
            let result = match self.reminder_fire_time(update.assigned_time) {
                Some(fire_at) => {
                    let visit_time = self.allocator.clock().in_clinic_time(update.assigned_time);
                    self.reminders
                        .reschedule(update.appointment_id, fire_at, visit_time)
                        .await
                }
                None => self.reminders.cancel(update.appointment_id).await,
            };

            if let Err(e) = result {
                warn!("Could not move reminder for appointment {}: {}", update.appointment_id, e);
            }
        }
    }
}
