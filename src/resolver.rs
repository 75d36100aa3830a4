use std::sync::Arc;
use tracing::{debug, warn};

use crate::clock::SharedClock;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::query::{QueryRegistry, QuerySpec};
use crate::queue::RefreshQueue;
use crate::store::Store;

/// Orchestrates the stale-while-revalidate read/write protocol.
///
/// Per-key read states and transitions:
/// - `Absent`: fetch from the origin synchronously, store, return. The one
///   path where request latency includes the origin call.
/// - `Fresh` (age < max_age): return the cached value immediately.
/// - `Stale` (age >= max_age): return the cached value immediately and
///   enqueue a background refresh. A full queue or unavailable store never
///   blocks or fails the read path.
#[derive(Clone)]
pub struct SwrResolver {
    store: Arc<dyn Store>,
    queue: Arc<dyn RefreshQueue>,
    registry: Arc<QueryRegistry>,
    clock: SharedClock,
}

impl SwrResolver {
    pub fn new(
        store: Arc<dyn Store>,
        queue: Arc<dyn RefreshQueue>,
        registry: Arc<QueryRegistry>,
        clock: SharedClock,
    ) -> Self {
        SwrResolver {
            store,
            queue,
            registry,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<QueryRegistry> {
        &self.registry
    }

    /// Get the value for a query, serving from cache when possible.
    ///
    /// Never blocks on the origin when any cached value (even a stale one)
    /// is available. Store faults degrade the read to a direct origin
    /// fetch.
    pub async fn get<Q: QuerySpec>(
        &self,
        spec: &Q,
        payload: &Q::Payload,
    ) -> Result<Q::Value, CacheError> {
        let key = spec.key(payload);

        let entry = match self.store.get(&key).await {
            Ok(entry) => entry,
            Err(CacheError::InvalidValue { .. }) => {
                // The stored envelope itself does not parse: invalidate so
                // the key heals instead of degrading every future read.
                warn!(key = %key, "undecodable cache entry, invalidating");
                if let Err(e) = self.store.remove(&key).await {
                    warn!(key = %key, error = %e, "failed to remove invalid entry");
                }
                return self.fetch_and_store(spec, payload, &key).await;
            }
            Err(e) => {
                // Reads treat an unreachable store as a miss.
                warn!(key = %key, error = %e, "cache unavailable, fetching from origin directly");
                return spec.fetch(payload.clone()).await;
            }
        };

        let Some(entry) = entry else {
            return self.fetch_and_store(spec, payload, &key).await;
        };

        let value: Q::Value = match entry.decode() {
            Ok(value) => value,
            Err(e) => {
                // Malformed entry: invalidate instead of serving it.
                warn!(key = %key, error = %e, "invalid cached value, invalidating");
                if let Err(e) = self.store.remove(&key).await {
                    warn!(key = %key, error = %e, "failed to remove invalid entry");
                }
                return self.fetch_and_store(spec, payload, &key).await;
            }
        };

        let now = self.clock.now_ms();
        let max_age_ms = spec.max_age().as_millis() as i64;

        if entry.is_stale(now, max_age_ms) {
            // Serve stale, refresh in the background. Enqueue failure only
            // degrades freshness, never the response.
            match self.queue.enqueue(&key).await {
                Ok(true) => debug!(key = %key, age_ms = entry.age_ms(now), "queued stale key for refresh"),
                Ok(false) => debug!(key = %key, "refresh already pending"),
                Err(e) => warn!(key = %key, error = %e, "failed to enqueue refresh, serving stale"),
            }
        }

        Ok(value)
    }

    /// Proactively write a known-fresh value (mutation side-effect).
    /// Write errors surface to the caller.
    pub async fn set_value<Q: QuerySpec>(
        &self,
        spec: &Q,
        payload: &Q::Payload,
        value: &Q::Value,
    ) -> Result<(), CacheError> {
        let key = spec.key(payload);
        let entry = CacheEntry::from_typed(value, self.clock.now_ms())?;
        self.store.set(&key, entry).await
    }

    /// Drop the cached value, forcing the next read down the absent path
    /// (mutation side-effect). Idempotent.
    pub async fn remove_value<Q: QuerySpec>(
        &self,
        spec: &Q,
        payload: &Q::Payload,
    ) -> Result<(), CacheError> {
        self.store.remove(&spec.key(payload)).await
    }

    /// Eagerly refresh in the background without dropping the current value
    /// (mutation side-effect).
    pub async fn refresh<Q: QuerySpec>(
        &self,
        spec: &Q,
        payload: &Q::Payload,
    ) -> Result<(), CacheError> {
        self.queue.enqueue(&spec.key(payload)).await.map(|_| ())
    }

    /// Raw-key write for administrative tooling.
    pub async fn set_raw(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
        let entry = CacheEntry::new(value, self.clock.now_ms());
        self.store.set(key, entry).await
    }

    /// Raw-key removal for administrative tooling. Idempotent.
    pub async fn remove_raw(&self, key: &str) -> Result<(), CacheError> {
        self.store.remove(key).await
    }

    /// Queue a refresh for a raw key, e.g. one found via enumeration.
    /// Rejects keys no registered spec can decode.
    pub async fn refresh_key(&self, key: &str) -> Result<(), CacheError> {
        if self.registry.resolve(key).is_none() {
            return Err(CacheError::UnknownKey(key.to_string()));
        }
        self.queue.enqueue(key).await.map(|_| ())
    }

    /// Enumerate all cached keys.
    pub async fn list_keys(&self) -> Result<Vec<String>, CacheError> {
        self.store.list_keys().await
    }

    async fn fetch_and_store<Q: QuerySpec>(
        &self,
        spec: &Q,
        payload: &Q::Payload,
        key: &str,
    ) -> Result<Q::Value, CacheError> {
        let value = spec.fetch(payload.clone()).await?;

        // Persistence is best-effort on the read path; the response is
        // correct either way.
        match CacheEntry::from_typed(&value, self.clock.now_ms()) {
            Ok(entry) => {
                if let Err(e) = self.store.set(key, entry).await {
                    warn!(key = %key, error = %e, "failed to store fetched value");
                }
            }
            Err(e) => warn!(key = %key, error = %e, "failed to encode fetched value"),
        }

        Ok(value)
    }
}
