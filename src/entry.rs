use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// A cache entry: a JSON value plus the timestamp it was written at.
///
/// Entries are immutable once written and replaced wholesale on update.
/// Staleness is not a property of the entry itself; it is computed at read
/// time against the owning query spec's `max_age`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// The cached value, type-erased to JSON.
    pub value: serde_json::Value,

    /// Unix timestamp in milliseconds of the write.
    /// Monotonically non-decreasing per key; stores drop older writes.
    pub last_modified: i64,
}

impl CacheEntry {
    pub fn new(value: serde_json::Value, last_modified: i64) -> Self {
        CacheEntry {
            value,
            last_modified,
        }
    }

    /// Build an entry from a typed value.
    pub fn from_typed<V: Serialize>(value: &V, last_modified: i64) -> Result<Self, CacheError> {
        let value = serde_json::to_value(value)
            .map_err(|e| CacheError::Serialization(format!("encode failed: {}", e)))?;
        Ok(CacheEntry {
            value,
            last_modified,
        })
    }

    /// Decode the entry back into a typed value.
    ///
    /// A failure here means the stored shape no longer matches the expected
    /// type; callers invalidate the entry rather than serve it.
    pub fn decode<V: DeserializeOwned>(&self) -> Result<V, CacheError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| CacheError::Serialization(format!("decode failed: {}", e)))
    }

    /// Age of the entry at `now_ms`, clamped to zero.
    pub fn age_ms(&self, now_ms: i64) -> i64 {
        (now_ms - self.last_modified).max(0)
    }

    /// The entry is fresh while its age is below `max_age_ms`.
    pub fn is_fresh(&self, now_ms: i64, max_age_ms: i64) -> bool {
        self.age_ms(now_ms) < max_age_ms
    }

    /// The entry is stale once its age reaches `max_age_ms`.
    pub fn is_stale(&self, now_ms: i64, max_age_ms: i64) -> bool {
        !self.is_fresh(now_ms, max_age_ms)
    }
}
