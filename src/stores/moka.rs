use async_trait::async_trait;
use moka::future::Cache;
use std::time::Duration;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::Store;

/// Configuration for MokaStore.
#[derive(Debug, Clone)]
pub struct MokaStoreConfig {
    /// Maximum number of entries the cache can hold.
    pub max_capacity: u64,

    /// Retention window: entries are dropped this long after insertion.
    /// `None` means entries only leave by capacity pressure or removal.
    pub time_to_live: Option<Duration>,

    /// Entries are dropped if not accessed within this duration.
    pub time_to_idle: Option<Duration>,
}

impl Default for MokaStoreConfig {
    fn default() -> Self {
        MokaStoreConfig {
            max_capacity: 10_000,
            time_to_live: None,
            time_to_idle: None,
        }
    }
}

/// High-performance concurrent cache store using Moka.
///
/// Lock-free concurrent access with automatic background eviction; the
/// better choice over [`MemoryStore`](crate::stores::memory::MemoryStore)
/// under high concurrency or large key counts.
pub struct MokaStore {
    cache: Cache<String, CacheEntry>,
}

impl MokaStore {
    /// Create a new MokaStore with the given configuration.
    pub fn new(config: MokaStoreConfig) -> Self {
        let mut builder = Cache::builder().max_capacity(config.max_capacity);

        if let Some(ttl) = config.time_to_live {
            builder = builder.time_to_live(ttl);
        }

        if let Some(tti) = config.time_to_idle {
            builder = builder.time_to_idle(tti);
        }

        MokaStore {
            cache: builder.build(),
        }
    }

    /// Get cache statistics (for monitoring/debugging).
    pub fn stats(&self) -> (u64, u64) {
        (self.cache.entry_count(), self.cache.weighted_size())
    }
}

#[async_trait]
impl Store for MokaStore {
    fn name(&self) -> &'static str {
        "moka"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        Ok(self.cache.get(key).await)
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        // last-write-wins by timestamp; the upsert closure runs under the
        // key's entry lock, so concurrent writers cannot interleave a
        // regression past the check.
        self.cache
            .entry(key.to_string())
            .and_upsert_with(|existing| {
                let value = match existing {
                    Some(current) if current.value().last_modified > entry.last_modified => {
                        current.into_value()
                    }
                    _ => entry,
                };
                std::future::ready(value)
            })
            .await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        self.cache.invalidate(key).await;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        Ok(self.cache.iter().map(|(k, _)| (*k).clone()).collect())
    }
}
