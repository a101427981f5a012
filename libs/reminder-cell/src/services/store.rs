use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deadpool_redis::{Config, Connection, Pool, Runtime};
use redis::AsyncCommands;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{Reminder, ReminderError};

/// Durable home of pending reminders, keyed by appointment id.
#[async_trait]
pub trait ReminderStore: Send + Sync {
    /// Inserts or replaces the reminder for `reminder.appointment_id`.
    async fn put(&self, reminder: &Reminder) -> Result<(), ReminderError>;

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Reminder>, ReminderError>;

    /// Returns whether anything was removed.
    async fn remove(&self, appointment_id: Uuid) -> Result<bool, ReminderError>;

    /// Ids whose fire time has passed, earliest first.
    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>, ReminderError>;

    /// Atomically takes a due reminder out of the store. Only one caller ever
    /// receives `Some` for a given scheduling of a reminder.
    async fn claim(&self, appointment_id: Uuid, now: DateTime<Utc>) -> Result<Option<Reminder>, ReminderError>;
}

// ==============================================================================
// IN-MEMORY
// ==============================================================================

#[derive(Default)]
pub struct InMemoryReminderStore {
    reminders: RwLock<HashMap<Uuid, Reminder>>,
}

impl InMemoryReminderStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.reminders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.reminders.read().await.is_empty()
    }
}

#[async_trait]
impl ReminderStore for InMemoryReminderStore {
    async fn put(&self, reminder: &Reminder) -> Result<(), ReminderError> {
        self.reminders
            .write()
            .await
            .insert(reminder.appointment_id, reminder.clone());
        Ok(())
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Reminder>, ReminderError> {
        Ok(self.reminders.read().await.get(&appointment_id).cloned())
    }

    async fn remove(&self, appointment_id: Uuid) -> Result<bool, ReminderError> {
        Ok(self.reminders.write().await.remove(&appointment_id).is_some())
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>, ReminderError> {
        let reminders = self.reminders.read().await;
        let mut due: Vec<&Reminder> = reminders.values().filter(|r| r.is_due(now)).collect();
        due.sort_by_key(|r| r.fire_at);
        Ok(due.into_iter().take(limit).map(|r| r.appointment_id).collect())
    }

    async fn claim(&self, appointment_id: Uuid, now: DateTime<Utc>) -> Result<Option<Reminder>, ReminderError> {
        let mut reminders = self.reminders.write().await;
        match reminders.get(&appointment_id) {
            Some(reminder) if reminder.is_due(now) => Ok(reminders.remove(&appointment_id)),
            _ => Ok(None),
        }
    }
}

// ==============================================================================
// REDIS
// ==============================================================================

const DUE_SET_KEY: &str = "reminders:due";

// Removes the id from the due set only while it is still due, then hands the
// payload to exactly one caller.
const CLAIM_SCRIPT: &str = r#"
local score = redis.call('ZSCORE', KEYS[1], ARGV[1])
if not score or tonumber(score) > tonumber(ARGV[2]) then
    return false
end
redis.call('ZREM', KEYS[1], ARGV[1])
local data = redis.call('HGET', KEYS[2], 'data')
redis.call('DEL', KEYS[2])
return data
"#;

/// Sorted set `reminders:due` scored by fire time (epoch millis) plus one
/// hash `reminder:{appointment_id}` holding the serialized reminder.
pub struct RedisReminderStore {
    pool: Pool,
    claim_script: redis::Script,
}

impl RedisReminderStore {
    pub async fn connect(redis_url: &str) -> Result<Self, ReminderError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg.create_pool(Some(Runtime::Tokio1)).map_err(|e| {
            ReminderError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to create Redis pool",
                format!("Pool creation error: {}", e),
            )))
        })?;

        let store = Self::from_pool(pool);
        let mut conn = store.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        info!("Redis reminder store initialized");

        Ok(store)
    }

    pub fn from_pool(pool: Pool) -> Self {
        Self {
            pool,
            claim_script: redis::Script::new(CLAIM_SCRIPT),
        }
    }

    async fn get_connection(&self) -> Result<Connection, ReminderError> {
        self.pool.get().await.map_err(|e| {
            ReminderError::RedisError(redis::RedisError::from((
                redis::ErrorKind::IoError,
                "Failed to get Redis connection",
                format!("Connection error: {}", e),
            )))
        })
    }

    fn reminder_key(appointment_id: Uuid) -> String {
        format!("reminder:{}", appointment_id)
    }
}

#[async_trait]
impl ReminderStore for RedisReminderStore {
    async fn put(&self, reminder: &Reminder) -> Result<(), ReminderError> {
        let mut conn = self.get_connection().await?;
        let data = serde_json::to_string(reminder)?;

        let _: () = redis::pipe()
            .atomic()
            .hset(Self::reminder_key(reminder.appointment_id), "data", data)
            .ignore()
            .zadd(
                DUE_SET_KEY,
                reminder.appointment_id.to_string(),
                reminder.fire_at.timestamp_millis(),
            )
            .ignore()
            .query_async(&mut conn)
            .await?;

        debug!("Reminder for appointment {} stored, fires at {}", reminder.appointment_id, reminder.fire_at);
        Ok(())
    }

    async fn get(&self, appointment_id: Uuid) -> Result<Option<Reminder>, ReminderError> {
        let mut conn = self.get_connection().await?;
        let data: Option<String> = conn.hget(Self::reminder_key(appointment_id), "data").await?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, appointment_id: Uuid) -> Result<bool, ReminderError> {
        let mut conn = self.get_connection().await?;

        let (deleted, unscheduled): (i64, i64) = redis::pipe()
            .atomic()
            .del(Self::reminder_key(appointment_id))
            .zrem(DUE_SET_KEY, appointment_id.to_string())
            .query_async(&mut conn)
            .await?;

        Ok(deleted > 0 || unscheduled > 0)
    }

    async fn due(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Uuid>, ReminderError> {
        let mut conn = self.get_connection().await?;
        let ids: Vec<String> = conn
            .zrangebyscore_limit(DUE_SET_KEY, "-inf", now.timestamp_millis(), 0, limit as isize)
            .await?;

        Ok(ids
            .into_iter()
            .filter_map(|id| match Uuid::parse_str(&id) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Ignoring malformed reminder id {:?} in due set", id);
                    None
                }
            })
            .collect())
    }

    async fn claim(&self, appointment_id: Uuid, now: DateTime<Utc>) -> Result<Option<Reminder>, ReminderError> {
        let mut conn = self.get_connection().await?;

        let data: Option<String> = self
            .claim_script
            .key(DUE_SET_KEY)
            .key(Self::reminder_key(appointment_id))
            .arg(appointment_id.to_string())
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        match data {
            Some(data) => Ok(Some(serde_json::from_str(&data)?)),
            None => Ok(None),
        }
    }
}
