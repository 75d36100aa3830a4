use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

use crate::error::CacheError;

/// Declarative description of one kind of cacheable query: how to key it,
/// how to recover the payload from a key, and how to compute a fresh value
/// from the origin.
///
/// Specs are created once at startup, registered in a [`QueryRegistry`],
/// and shared by all requests.
///
/// The key derivation must be invertible: `payload(key(p)) == Some(p)` for
/// every valid payload. That guarantee is what lets bulk cache-repair
/// tooling re-trigger a fetch for any key found by store enumeration; the
/// registry verifies it against `example_payload` at build time.
#[async_trait]
pub trait QuerySpec: Send + Sync + 'static {
    type Payload: Serialize + DeserializeOwned + PartialEq + Clone + Send + Sync;
    type Value: Serialize + DeserializeOwned + Clone + Send + Sync;

    /// A name for tracing and error messages.
    fn name(&self) -> &'static str;

    /// Derive the cache key for a payload. Pure.
    fn key(&self, payload: &Self::Payload) -> String;

    /// Inverse of [`key`](Self::key): recover the payload from a key, or
    /// `None` when the key does not belong to this spec.
    fn payload(&self, key: &str) -> Option<Self::Payload>;

    /// A representative payload used for the build-time invertibility check.
    fn example_payload(&self) -> Self::Payload;

    /// Age at which a cached value stops being fresh.
    fn max_age(&self) -> Duration;

    /// Compute a fresh value from the origin. May perform I/O; must be safe
    /// to retry.
    async fn fetch(&self, payload: Self::Payload) -> Result<Self::Value, CacheError>;
}

/// Object-safe view of a [`QuerySpec`] with the value type erased to JSON.
///
/// This is what the registry and the refresh workers operate on: given only
/// a key recovered from storage, they can route it to the owning spec and
/// recompute its value.
#[async_trait]
pub trait ErasedQuerySpec: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this spec owns the given key.
    fn matches(&self, key: &str) -> bool;

    /// Recover the payload from `key` and fetch a fresh value from the
    /// origin, erased to JSON.
    async fn refresh(&self, key: &str) -> Result<serde_json::Value, CacheError>;

    /// Check that the example payload round-trips through the key.
    fn verify_invertibility(&self) -> Result<(), CacheError>;
}

#[async_trait]
impl<Q: QuerySpec> ErasedQuerySpec for Q {
    fn name(&self) -> &'static str {
        QuerySpec::name(self)
    }

    fn matches(&self, key: &str) -> bool {
        self.payload(key).is_some()
    }

    async fn refresh(&self, key: &str) -> Result<serde_json::Value, CacheError> {
        let payload = self
            .payload(key)
            .ok_or_else(|| CacheError::UnknownKey(key.to_string()))?;

        let value = self.fetch(payload).await?;

        serde_json::to_value(value)
            .map_err(|e| CacheError::Serialization(format!("encode failed: {}", e)))
    }

    fn verify_invertibility(&self) -> Result<(), CacheError> {
        let example = self.example_payload();
        let key = self.key(&example);

        match self.payload(&key) {
            Some(ref recovered) if *recovered == example => Ok(()),
            _ => Err(CacheError::invalid_value(
                key,
                format!(
                    "query spec '{}': example payload does not round-trip through its key",
                    QuerySpec::name(self)
                ),
            )),
        }
    }
}

/// Immutable set of all registered query specs, built once at startup and
/// passed by reference into the resolver and workers.
pub struct QueryRegistry {
    specs: Vec<Arc<dyn ErasedQuerySpec>>,
}

impl QueryRegistry {
    pub fn builder() -> QueryRegistryBuilder {
        QueryRegistryBuilder { specs: Vec::new() }
    }

    /// Find the spec owning `key`.
    pub fn resolve(&self, key: &str) -> Option<&Arc<dyn ErasedQuerySpec>> {
        self.specs.iter().find(|spec| spec.matches(key))
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Builder for [`QueryRegistry`].
pub struct QueryRegistryBuilder {
    specs: Vec<Arc<dyn ErasedQuerySpec>>,
}

impl QueryRegistryBuilder {
    /// Register a query spec.
    pub fn register<Q: QuerySpec>(mut self, spec: Q) -> Self {
        self.specs.push(Arc::new(spec));
        self
    }

    /// Verify every registered spec's invertibility and freeze the registry.
    pub fn build(self) -> Result<QueryRegistry, CacheError> {
        for spec in &self.specs {
            spec.verify_invertibility()?;
        }

        Ok(QueryRegistry { specs: self.specs })
    }
}
