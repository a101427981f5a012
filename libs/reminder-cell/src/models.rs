use chrono::{DateTime, Duration, FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the reminder email talks about. `visit_time` carries the clinic
/// offset so it renders as local wall-clock time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderContext {
    pub appointment_id: Uuid,
    pub doctor_id: Uuid,
    pub patient_id: Uuid,
    pub visit_time: DateTime<FixedOffset>,
}

/// A pending reminder. There is at most one per appointment; scheduling
/// again replaces it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reminder {
    pub appointment_id: Uuid,
    pub recipient: String,
    pub fire_at: DateTime<Utc>,
    pub context: ReminderContext,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Reminder {
    pub fn new(recipient: impl Into<String>, fire_at: DateTime<Utc>, context: ReminderContext) -> Self {
        let now = Utc::now();
        Self {
            appointment_id: context.appointment_id,
            recipient: recipient.into(),
            fire_at,
            context,
            attempts: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.fire_at <= now
    }

    /// Pushes the reminder back for another delivery attempt.
    pub fn retry_later(mut self, now: DateTime<Utc>, backoff: Duration) -> Self {
        self.attempts += 1;
        self.fire_at = now + backoff;
        self.updated_at = now;
        self
    }

    pub fn subject(&self) -> String {
        "Appointment reminder".to_string()
    }

    pub fn body(&self) -> String {
        format!(
            "This is a reminder that your appointment (ref {}) is expected to start at {} on {}. \
             Please arrive a few minutes early.",
            self.context.appointment_id,
            self.context.visit_time.format("%H:%M"),
            self.context.visit_time.format("%A, %d %B %Y"),
        )
    }
}

/// Outcome of one dispatcher pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchReport {
    pub sent: usize,
    pub retried: usize,
    pub dropped: usize,
}

impl DispatchReport {
    pub fn is_empty(&self) -> bool {
        self.sent == 0 && self.retried == 0 && self.dropped == 0
    }
}
