use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReminderError {
    #[error("Reminder store error: {0}")]
    StoreError(String),

    #[error("Redis connection error: {0}")]
    RedisError(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Mail delivery failed: {0}")]
    DeliveryError(String),

    #[error("Mail service is not configured")]
    MailerNotConfigured,
}
