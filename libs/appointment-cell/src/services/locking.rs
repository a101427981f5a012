// libs/appointment-cell/src/services/locking.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, Runtime};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::models::{BookingError, DayKey};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LockError {
    #[error("Timed out waiting for {0}")]
    Busy(DayKey),

    #[error("Lock backend error: {0}")]
    Backend(String),
}

impl From<LockError> for BookingError {
    fn from(err: LockError) -> Self {
        match err {
            LockError::Busy(key) => BookingError::Busy(key.calendar_date),
            LockError::Backend(msg) => BookingError::Storage(msg),
        }
    }
}

/// Proof of holding the exclusive lock for one doctor-day. Dropping a local
/// lease frees it; a Redis lease also expires on its own after the TTL.
pub struct DayLease {
    key: DayKey,
    token: String,
    _local: Option<LocalHold>,
}

impl DayLease {
    pub fn key(&self) -> DayKey {
        self.key
    }
}

/// Serializes check-then-append and re-flow per (doctor, day). Different
/// doctors or days never contend.
#[async_trait]
pub trait DayLockManager: Send + Sync {
    /// Waits at most the manager's configured bound, then fails with `Busy`.
    async fn acquire(&self, key: DayKey) -> Result<DayLease, LockError>;

    async fn release(&self, lease: DayLease) -> Result<(), LockError>;
}

// ==============================================================================
// PROCESS-LOCAL
// ==============================================================================

type SlotMap = Arc<StdMutex<HashMap<DayKey, Arc<Mutex<()>>>>>;

fn lock_slots(slots: &SlotMap) -> MutexGuard<'_, HashMap<DayKey, Arc<Mutex<()>>>> {
    // The map stays consistent even if a holder panicked.
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

// Only the map holds the slot when nobody owns or awaits it.
fn prune_idle(slots: &SlotMap, key: DayKey) {
    let mut slots = lock_slots(slots);
    if slots.get(&key).is_some_and(|slot| Arc::strong_count(slot) == 1) {
        slots.remove(&key);
    }
}

/// Owned guard on a local slot. Pruning happens on drop, so a lease that is
/// never passed to `release` still leaves no idle entry behind.
struct LocalHold {
    key: DayKey,
    guard: Option<OwnedMutexGuard<()>>,
    slots: SlotMap,
}

impl Drop for LocalHold {
    fn drop(&mut self) {
        // The guard keeps the slot alive, so free it before counting.
        self.guard.take();
        prune_idle(&self.slots, self.key);
    }
}

/// One async mutex per doctor-day, created on demand and pruned once idle.
pub struct LocalDayLocks {
    slots: SlotMap,
    wait: Duration,
}

impl LocalDayLocks {
    pub fn new(wait: Duration) -> Self {
        Self {
            slots: Arc::new(StdMutex::new(HashMap::new())),
            wait,
        }
    }

    pub fn tracked_keys(&self) -> usize {
        lock_slots(&self.slots).len()
    }
}

#[async_trait]
impl DayLockManager for LocalDayLocks {
    async fn acquire(&self, key: DayKey) -> Result<DayLease, LockError> {
        let slot = lock_slots(&self.slots)
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let acquired = tokio::time::timeout(self.wait, slot.lock_owned()).await;
        match acquired {
            Ok(guard) => Ok(DayLease {
                key,
                token: Uuid::new_v4().to_string(),
                _local: Some(LocalHold {
                    key,
                    guard: Some(guard),
                    slots: self.slots.clone(),
                }),
            }),
            Err(_) => {
                prune_idle(&self.slots, key);
                warn!("Gave up waiting {:?} for day lock {}", self.wait, key);
                Err(LockError::Busy(key))
            }
        }
    }

    async fn release(&self, lease: DayLease) -> Result<(), LockError> {
        debug!("Released day lock {}", lease.key);
        drop(lease);
        Ok(())
    }
}

// ==============================================================================
// REDIS
// ==============================================================================

// Deletes the lease only if it still carries our token.
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// `SET key token NX PX ttl` leases so several API processes share one
/// lock per doctor-day.
pub struct RedisDayLocks {
    pool: Pool,
    wait: Duration,
    ttl: Duration,
    retry_interval: Duration,
    release_script: redis::Script,
}

impl RedisDayLocks {
    pub async fn connect(redis_url: &str, wait: Duration, ttl: Duration) -> Result<Self, LockError> {
        let cfg = Config::from_url(redis_url);
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| LockError::Backend(format!("Pool creation error: {}", e)))?;

        let locks = Self::from_pool(pool, wait, ttl);
        let mut conn = locks.get_connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;
        info!("Redis day locks initialized");

        Ok(locks)
    }

    pub fn from_pool(pool: Pool, wait: Duration, ttl: Duration) -> Self {
        Self {
            pool,
            wait,
            ttl,
            retry_interval: Duration::from_millis(50),
            release_script: redis::Script::new(RELEASE_SCRIPT),
        }
    }

    async fn get_connection(&self) -> Result<Connection, LockError> {
        self.pool
            .get()
            .await
            .map_err(|e| LockError::Backend(format!("Connection error: {}", e)))
    }

    fn lock_key(key: DayKey) -> String {
        format!("booking_lock:{}", key)
    }
}

#[async_trait]
impl DayLockManager for RedisDayLocks {
    async fn acquire(&self, key: DayKey) -> Result<DayLease, LockError> {
        let token = Uuid::new_v4().to_string();
        let redis_key = Self::lock_key(key);
        let deadline = Instant::now() + self.wait;
        let mut conn = self.get_connection().await?;

        loop {
            let acquired: Option<String> = redis::cmd("SET")
                .arg(&redis_key)
                .arg(&token)
                .arg("NX")
                .arg("PX")
                .arg(self.ttl.as_millis() as u64)
                .query_async(&mut conn)
                .await
                .map_err(|e| LockError::Backend(e.to_string()))?;

            if acquired.is_some() {
                debug!("Acquired {}", redis_key);
                return Ok(DayLease {
                    key,
                    token,
                    _local: None,
                });
            }

            if Instant::now() + self.retry_interval > deadline {
                warn!("Gave up waiting {:?} for {}", self.wait, redis_key);
                return Err(LockError::Busy(key));
            }
            tokio::time::sleep(self.retry_interval).await;
        }
    }

    async fn release(&self, lease: DayLease) -> Result<(), LockError> {
        let redis_key = Self::lock_key(lease.key);
        let mut conn = self.get_connection().await?;

        let deleted: i64 = self
            .release_script
            .key(&redis_key)
            .arg(&lease.token)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| LockError::Backend(e.to_string()))?;

        if deleted == 0 {
            warn!("Lease on {} expired before release", redis_key);
        }
        Ok(())
    }
}
