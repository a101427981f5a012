use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::services::store::ReminderStore;
use crate::{Reminder, ReminderContext, ReminderError};

/// Scheduling side of reminders, keyed by appointment id. Callers treat it as
/// fire-and-forget: an error here never undoes the booking that caused it.
#[async_trait]
pub trait NotificationTrigger: Send + Sync {
    async fn schedule(
        &self,
        recipient: &str,
        fire_at: DateTime<Utc>,
        context: ReminderContext,
    ) -> Result<(), ReminderError>;

    /// Moves an existing reminder. Returns false when the appointment has none.
    async fn reschedule(
        &self,
        appointment_id: Uuid,
        fire_at: DateTime<Utc>,
        visit_time: DateTime<FixedOffset>,
    ) -> Result<bool, ReminderError>;

    /// Returns false when there was nothing pending.
    async fn cancel(&self, appointment_id: Uuid) -> Result<bool, ReminderError>;
}

pub struct ReminderService {
    store: Arc<dyn ReminderStore>,
}

impl ReminderService {
    pub fn new(store: Arc<dyn ReminderStore>) -> Self {
        Self { store }
    }

    pub async fn pending(&self, appointment_id: Uuid) -> Result<Option<Reminder>, ReminderError> {
        self.store.get(appointment_id).await
    }
}

#[async_trait]
impl NotificationTrigger for ReminderService {
    async fn schedule(
        &self,
        recipient: &str,
        fire_at: DateTime<Utc>,
        context: ReminderContext,
    ) -> Result<(), ReminderError> {
        let reminder = Reminder::new(recipient, fire_at, context);
        self.store.put(&reminder).await?;

        info!(
            "Reminder scheduled for appointment {} at {}",
            reminder.appointment_id, reminder.fire_at
        );
        Ok(())
    }

    async fn reschedule(
        &self,
        appointment_id: Uuid,
        fire_at: DateTime<Utc>,
        visit_time: DateTime<FixedOffset>,
    ) -> Result<bool, ReminderError> {
        let Some(mut reminder) = self.store.get(appointment_id).await? else {
            debug!("No pending reminder to move for appointment {}", appointment_id);
            return Ok(false);
        };

        reminder.fire_at = fire_at;
        reminder.context.visit_time = visit_time;
        reminder.attempts = 0;
        reminder.updated_at = Utc::now();
        self.store.put(&reminder).await?;

        debug!("Reminder for appointment {} moved to {}", appointment_id, fire_at);
        Ok(true)
    }

    async fn cancel(&self, appointment_id: Uuid) -> Result<bool, ReminderError> {
        let removed = self.store.remove(appointment_id).await?;
        if removed {
            info!("Reminder cancelled for appointment {}", appointment_id);
        }
        Ok(removed)
    }
}
