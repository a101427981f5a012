use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::services::mailer::Mailer;
use crate::services::store::ReminderStore;
use crate::{DispatchReport, ReminderError};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub max_attempts: u32,
    pub retry_backoff: Duration,
    pub batch_size: usize,
    pub poll_interval: std::time::Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            retry_backoff: Duration::minutes(1),
            batch_size: 50,
            poll_interval: std::time::Duration::from_secs(30),
        }
    }
}

/// Delivers due reminders. Several dispatchers may share one store; the
/// store's claim decides which of them sends a given reminder.
pub struct ReminderDispatcher {
    store: Arc<dyn ReminderStore>,
    mailer: Arc<dyn Mailer>,
    config: DispatcherConfig,
}

impl ReminderDispatcher {
    pub fn new(store: Arc<dyn ReminderStore>, mailer: Arc<dyn Mailer>) -> Self {
        Self::with_config(store, mailer, DispatcherConfig::default())
    }

    pub fn with_config(store: Arc<dyn ReminderStore>, mailer: Arc<dyn Mailer>, config: DispatcherConfig) -> Self {
        Self { store, mailer, config }
    }

    /// One pass over everything due at `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<DispatchReport, ReminderError> {
        let mut report = DispatchReport::default();

        for appointment_id in self.store.due(now, self.config.batch_size).await? {
            let Some(reminder) = self.store.claim(appointment_id, now).await? else {
                debug!("Reminder {} was claimed elsewhere", appointment_id);
                continue;
            };

            match self
                .mailer
                .send(&reminder.recipient, &reminder.subject(), &reminder.body())
                .await
            {
                Ok(()) => {
                    info!("Reminder sent for appointment {}", appointment_id);
                    report.sent += 1;
                }
                Err(e) if reminder.attempts + 1 < self.config.max_attempts => {
                    warn!(
                        "Reminder delivery failed for appointment {} (attempt {}): {}",
                        appointment_id,
                        reminder.attempts + 1,
                        e
                    );
                    let retry = reminder.retry_later(now, self.config.retry_backoff);
                    self.store.put(&retry).await?;
                    report.retried += 1;
                }
                Err(e) => {
                    error!(
                        "Dropping reminder for appointment {} after {} attempts: {}",
                        appointment_id,
                        reminder.attempts + 1,
                        e
                    );
                    report.dropped += 1;
                }
            }
        }

        Ok(report)
    }

    /// Polls until `shutdown` flips to true.
    #[instrument(skip_all)]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("Reminder dispatcher started, polling every {:?}", self.config.poll_interval);

        loop {
            match self.run_once(Utc::now()).await {
                Ok(report) if !report.is_empty() => debug!("Dispatch pass: {:?}", report),
                Ok(_) => {}
                Err(e) => error!("Reminder dispatch pass failed: {}", e),
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Reminder dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::mailer::MockMailer;
    use crate::services::store::InMemoryReminderStore;
    use crate::{Reminder, ReminderContext};
    use chrono::FixedOffset;
    use uuid::Uuid;

    fn reminder(fire_at: DateTime<Utc>) -> Reminder {
        let offset = FixedOffset::east_opt(330 * 60).unwrap();
        Reminder::new(
            "patient@example.com",
            fire_at,
            ReminderContext {
                appointment_id: Uuid::new_v4(),
                doctor_id: Uuid::new_v4(),
                patient_id: Uuid::new_v4(),
                visit_time: (fire_at + Duration::minutes(20)).with_timezone(&offset),
            },
        )
    }

    #[tokio::test]
    async fn sends_due_reminders_once() {
        let store = Arc::new(InMemoryReminderStore::new());
        let now = Utc::now();
        store.put(&reminder(now - Duration::minutes(1))).await.unwrap();
        store.put(&reminder(now + Duration::hours(1))).await.unwrap();

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .withf(|to, subject, _| {
                to.to_string() == "patient@example.com" && subject.to_string() == "Appointment reminder"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));

        let dispatcher = ReminderDispatcher::new(store.clone(), Arc::new(mailer));
        let report = dispatcher.run_once(now).await.unwrap();

        assert_eq!(report.sent, 1);
        assert_eq!(store.len().await, 1);
        assert!(dispatcher.run_once(now).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_delivery_is_retried_then_dropped() {
        let store = Arc::new(InMemoryReminderStore::new());
        let now = Utc::now();
        let pending = reminder(now);
        let appointment_id = pending.appointment_id;
        store.put(&pending).await.unwrap();

        let mut mailer = MockMailer::new();
        mailer
            .expect_send()
            .times(3)
            .returning(|_, _, _| Err(ReminderError::DeliveryError("smtp down".to_string())));

        let dispatcher = ReminderDispatcher::new(store.clone(), Arc::new(mailer));

        let first = dispatcher.run_once(now).await.unwrap();
        assert_eq!(first.retried, 1);
        let stored = store.get(appointment_id).await.unwrap().unwrap();
        assert_eq!(stored.attempts, 1);
        assert_eq!(stored.fire_at, now + Duration::minutes(1));

        // Not yet due again.
        assert!(dispatcher.run_once(now).await.unwrap().is_empty());

        let second = dispatcher.run_once(now + Duration::minutes(1)).await.unwrap();
        assert_eq!(second.retried, 1);

        let third = dispatcher.run_once(now + Duration::minutes(2)).await.unwrap();
        assert_eq!(third.dropped, 1);
        assert!(store.is_empty().await);
    }
}
