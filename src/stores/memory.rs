use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::store::Store;
use crate::utils::rand_simple;

/// Configuration for eviction on set operations.
#[derive(Debug, Clone)]
pub struct EvictOnSetConfig {
    /// Provide a number between 0 and 1 to calculate whether eviction should run on each set.
    ///
    /// - `1.0` -> run eviction on every `set`
    /// - `0.5` -> run eviction on every 2nd `set` (on average)
    /// - `0.0` -> disable eviction
    pub frequency: f64,

    /// Remove items until the number of items in the map is lower than `max_items`.
    pub max_items: usize,
}

/// Configuration for MemoryStore.
#[derive(Debug, Clone, Default)]
pub struct MemoryStoreConfig {
    /// Trim the oldest entries on `set` once `max_items` is exceeded.
    pub evict_on_set: Option<EvictOnSetConfig>,
}

/// Thread-safe in-memory cache store using HashMap with RwLock.
///
/// Suitable for single-node deployments and tests. Entries carry no
/// expiration; staleness is decided by the resolver against each query
/// spec's `max_age`, and eviction (if enabled) trims by write age.
pub struct MemoryStore {
    state: RwLock<HashMap<String, CacheEntry>>,
    evict_on_set: Option<EvictOnSetConfig>,
}

impl MemoryStore {
    /// Create a new MemoryStore with the given configuration.
    pub fn new(config: MemoryStoreConfig) -> Self {
        MemoryStore {
            state: RwLock::new(HashMap::new()),
            evict_on_set: config.evict_on_set,
        }
    }

    /// Run eviction if configured and random check passes.
    async fn maybe_evict(&self) {
        let Some(ref config) = self.evict_on_set else {
            return;
        };

        if config.frequency <= 0.0 {
            return;
        }

        let should_evict = if config.frequency >= 1.0 {
            true
        } else {
            rand_simple() < config.frequency
        };

        if !should_evict {
            return;
        }

        let mut state = self.state.write().await;
        if state.len() <= config.max_items {
            return;
        }

        // Remove oldest entries first, by write timestamp.
        let mut entries: Vec<_> = state
            .iter()
            .map(|(k, v)| (k.clone(), v.last_modified))
            .collect();
        entries.sort_by_key(|(_, last_modified)| *last_modified);

        let to_remove = state.len() - config.max_items;
        for (key, _) in entries.into_iter().take(to_remove) {
            state.remove(&key);
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError> {
        let state = self.state.read().await;
        Ok(state.get(key).cloned())
    }

    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError> {
        {
            let mut state = self.state.write().await;

            // last-write-wins by timestamp: drop writes older than the stored entry
            if let Some(existing) = state.get(key)
                && existing.last_modified > entry.last_modified
            {
                return Ok(());
            }

            state.insert(key.to_string(), entry);
        }

        self.maybe_evict().await;
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.state.write().await;
        state.remove(key);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        let state = self.state.read().await;
        Ok(state.keys().cloned().collect())
    }
}
