use async_trait::async_trait;

use crate::entry::CacheEntry;
use crate::error::CacheError;

/// A store is a common interface for storing, reading, deleting and
/// enumerating cache entries by key.
///
/// Keys are opaque strings derived by query specs; the store does not
/// interpret them. Backend faults surface as [`CacheError::Unavailable`] so
/// that readers can degrade to a direct origin fetch.
#[async_trait]
pub trait Store: Send + Sync {
    /// A name for tracing.
    ///
    /// # Example
    /// - "memory"
    /// - "redis"
    fn name(&self) -> &'static str;

    /// Return the entry for `key`, or `None` on a miss.
    async fn get(&self, key: &str) -> Result<Option<CacheEntry>, CacheError>;

    /// Store the entry, overwriting any prior one.
    ///
    /// Implementations must keep `last_modified` non-decreasing per key:
    /// a write carrying an older timestamp than the stored entry is dropped.
    async fn set(&self, key: &str, entry: CacheEntry) -> Result<(), CacheError>;

    /// Remove the key. Idempotent: removing an absent key succeeds.
    async fn remove(&self, key: &str) -> Result<(), CacheError>;

    /// Enumerate all keys currently present, in no particular order.
    async fn list_keys(&self) -> Result<Vec<String>, CacheError>;
}
