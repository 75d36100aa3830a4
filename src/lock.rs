use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::warn;

use crate::clock::SharedClock;
use crate::error::CacheError;
use crate::utils::lock_token;

/// Lock acquisition/expiry settings.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Locks auto-expire this long after acquisition, bounding the blast
    /// radius of a crashed holder.
    pub ttl_ms: u64,

    /// Number of re-attempts after the first failed acquisition.
    pub retry_count: u32,

    /// Base delay between attempts; doubles per attempt.
    pub retry_delay: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        LockConfig {
            ttl_ms: 10_000,
            retry_count: 3,
            retry_delay: Duration::from_millis(50),
        }
    }
}

/// Proof of a (probably) exclusive lock on one cache key.
///
/// "Probably": TTL auto-expiry makes this weak mutual exclusion. Holders
/// must [`LockManager::validate`] before the final write if they may have
/// outlived the TTL.
#[derive(Debug, Clone)]
pub struct LockGuard {
    key: String,
    token: String,
    expires_at: i64,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

/// Per-key mutual exclusion used around the "recompute origin value and
/// write to cache" critical section. Never used around cache reads.
#[async_trait]
pub trait LockManager: Send + Sync {
    /// Acquire the lock for `key`, retrying with backoff up to the
    /// configured attempt count.
    ///
    /// Failure returns [`CacheError::LockAcquisition`]; callers treat that
    /// as "someone else is refreshing this key" rather than as an error.
    async fn lock(&self, key: &str) -> Result<LockGuard, CacheError>;

    /// Whether the guard still owns the lock (fencing check before the
    /// final store write).
    async fn validate(&self, guard: &LockGuard) -> bool;

    /// Release early. Idempotent: releasing an expired or already released
    /// lock is a no-op.
    async fn unlock(&self, guard: LockGuard);
}

struct Holder {
    token: String,
    expires_at: i64,
}

/// In-process lock manager for single-node deployments and tests.
pub struct MemoryLockManager {
    state: Mutex<HashMap<String, Holder>>,
    clock: SharedClock,
    config: LockConfig,
}

impl MemoryLockManager {
    pub fn new(clock: SharedClock, config: LockConfig) -> Self {
        MemoryLockManager {
            state: Mutex::new(HashMap::new()),
            clock,
            config,
        }
    }

    async fn try_acquire(&self, key: &str) -> Option<LockGuard> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock().await;

        if let Some(holder) = state.get(key)
            && holder.expires_at > now
        {
            return None;
        }

        let token = lock_token();
        let expires_at = now + self.config.ttl_ms as i64;
        state.insert(
            key.to_string(),
            Holder {
                token: token.clone(),
                expires_at,
            },
        );

        Some(LockGuard {
            key: key.to_string(),
            token,
            expires_at,
        })
    }
}

#[async_trait]
impl LockManager for MemoryLockManager {
    async fn lock(&self, key: &str) -> Result<LockGuard, CacheError> {
        let mut delay = self.config.retry_delay;

        for attempt in 0..=self.config.retry_count {
            if let Some(guard) = self.try_acquire(key).await {
                return Ok(guard);
            }

            if attempt < self.config.retry_count {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(CacheError::LockAcquisition(key.to_string()))
    }

    async fn validate(&self, guard: &LockGuard) -> bool {
        let now = self.clock.now_ms();
        let state = self.state.lock().await;

        state
            .get(&guard.key)
            .is_some_and(|h| h.token == guard.token && h.expires_at > now)
    }

    async fn unlock(&self, guard: LockGuard) {
        let mut state = self.state.lock().await;

        // Only the owning token may release; an expired-and-reacquired lock
        // belongs to the new holder.
        if state.get(&guard.key).is_some_and(|h| h.token == guard.token) {
            state.remove(&guard.key);
        }
    }
}

/// Redis-backed distributed lock manager.
///
/// `SET key token NX PX ttl` to acquire; release compares the stored token
/// before deleting so a holder can never release someone else's lock.
pub struct RedisLockManager {
    connection: MultiplexedConnection,
    config: LockConfig,
    clock: SharedClock,
}

const LOCK_KEY_PREFIX: &str = "swr:lock:";

const UNLOCK_SCRIPT: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

impl RedisLockManager {
    pub async fn new(
        url: &str,
        clock: SharedClock,
        config: LockConfig,
    ) -> Result<Self, CacheError> {
        let client = redis::Client::open(url).map_err(|e| {
            CacheError::unavailable("redis", "", format!("failed to create Redis client: {}", e))
        })?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| {
                CacheError::unavailable("redis", "", format!("failed to connect to Redis: {}", e))
            })?;

        Ok(RedisLockManager {
            connection,
            config,
            clock,
        })
    }

    fn lock_key(key: &str) -> String {
        format!("{}{}", LOCK_KEY_PREFIX, key)
    }

    async fn try_acquire(&self, key: &str) -> Result<Option<LockGuard>, CacheError> {
        let mut conn = self.connection.clone();
        let token = lock_token();

        let reply: Option<String> = redis::cmd("SET")
            .arg(Self::lock_key(key))
            .arg(&token)
            .arg("NX")
            .arg("PX")
            .arg(self.config.ttl_ms)
            .query_async(&mut conn)
            .await
            .map_err(|e| CacheError::unavailable("redis", key, format!("SET NX failed: {}", e)))?;

        Ok(reply.map(|_| LockGuard {
            key: key.to_string(),
            token,
            expires_at: self.clock.now_ms() + self.config.ttl_ms as i64,
        }))
    }
}

#[async_trait]
impl LockManager for RedisLockManager {
    async fn lock(&self, key: &str) -> Result<LockGuard, CacheError> {
        let mut delay = self.config.retry_delay;

        for attempt in 0..=self.config.retry_count {
            if let Some(guard) = self.try_acquire(key).await? {
                return Ok(guard);
            }

            if attempt < self.config.retry_count {
                tokio::time::sleep(delay).await;
                delay *= 2;
            }
        }

        Err(CacheError::LockAcquisition(key.to_string()))
    }

    async fn validate(&self, guard: &LockGuard) -> bool {
        let mut conn = self.connection.clone();

        let holder: Result<Option<String>, _> = redis::cmd("GET")
            .arg(Self::lock_key(&guard.key))
            .query_async(&mut conn)
            .await;

        matches!(holder, Ok(Some(token)) if token == guard.token)
    }

    async fn unlock(&self, guard: LockGuard) {
        let mut conn = self.connection.clone();

        let result: Result<i64, _> = redis::Script::new(UNLOCK_SCRIPT)
            .key(Self::lock_key(&guard.key))
            .arg(&guard.token)
            .invoke_async(&mut conn)
            .await;

        if let Err(e) = result {
            warn!(key = %guard.key, error = %e, "failed to release redis lock, waiting for TTL expiry");
        }
    }
}
