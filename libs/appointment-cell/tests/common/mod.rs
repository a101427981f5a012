#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};
use uuid::Uuid;

use appointment_cell::services::{BookingService, InMemoryLedger, LocalDayLocks, SlotAllocator};
use appointment_cell::ClinicClock;
use doctor_cell::models::UpdateBookingProfileRequest;
use doctor_cell::services::{InMemoryScheduleRepository, ScheduleService};
use reminder_cell::{InMemoryReminderStore, ReminderService};

pub struct Harness {
    pub booking: Arc<BookingService>,
    pub schedules: Arc<ScheduleService>,
    pub ledger: Arc<InMemoryLedger>,
    pub locks: Arc<LocalDayLocks>,
    pub reminders: Arc<ReminderService>,
    pub reminder_store: Arc<InMemoryReminderStore>,
    pub doctor_id: Uuid,
}

pub fn clock() -> ClinicClock {
    ClinicClock::from_offset_minutes(330).unwrap()
}

/// 2030-01-07 is a Monday.
pub fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 7).unwrap()
}

pub fn saturday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 5).unwrap()
}

pub fn tuesday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2030, 1, 8).unwrap()
}

/// Clinic wall-clock time on `monday()`.
pub fn local(hour: u32, minute: u32) -> DateTime<Utc> {
    clock()
        .to_absolute(monday(), NaiveTime::from_hms_opt(hour, minute, 0).unwrap())
        .unwrap()
}

/// A published doctor working Mon-Fri 09:00-17:00 with 15 minute visits.
pub async fn harness(cap: i32) -> Harness {
    harness_with_wait(cap, StdDuration::from_secs(2)).await
}

pub async fn harness_with_wait(cap: i32, lock_wait: StdDuration) -> Harness {
    let schedules = Arc::new(ScheduleService::new(Arc::new(InMemoryScheduleRepository::new())));
    let doctor_id = Uuid::new_v4();
    schedules.initialize_doctor(doctor_id).await.unwrap();
    schedules
        .update_profile(
            doctor_id,
            UpdateBookingProfileRequest {
                appointment_duration_minutes: Some(15),
                max_patients_per_day: Some(cap),
                is_published: Some(true),
            },
        )
        .await
        .unwrap();

    let ledger = Arc::new(InMemoryLedger::new());
    let locks = Arc::new(LocalDayLocks::new(lock_wait));
    let reminder_store = Arc::new(InMemoryReminderStore::new());
    let reminders = Arc::new(ReminderService::new(reminder_store.clone()));

    let booking = Arc::new(BookingService::new(
        schedules.clone(),
        ledger.clone(),
        locks.clone(),
        reminders.clone(),
        SlotAllocator::new(clock(), Duration::minutes(15)),
        Duration::minutes(20),
    ));

    Harness {
        booking,
        schedules,
        ledger,
        locks,
        reminders,
        reminder_store,
        doctor_id,
    }
}
