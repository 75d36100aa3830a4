use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::connection::{Connection, ConnectionArgs, resolve_connection};
use crate::error::CacheError;
use crate::resolver::SwrResolver;

/// Administrative operations, named for authorization decisions and audit
/// logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdminAction {
    SetValue,
    RemoveValue,
    ListKeys,
    RefreshValue,
}

impl fmt::Display for AdminAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdminAction::SetValue => "set_value",
            AdminAction::RemoveValue => "remove_value",
            AdminAction::ListKeys => "list_keys",
            AdminAction::RefreshValue => "refresh_value",
        };
        write!(f, "{}", name)
    }
}

/// Hook for the host application's authorization logic. The cache never
/// decides who is allowed; it only asks.
#[async_trait]
pub trait Authorizer: Send + Sync {
    /// Return `Ok(())` to allow the action, or an error describing the
    /// denial.
    async fn authorize(&self, action: AdminAction) -> Result<(), CacheError>;
}

/// Permits everything. For tests and trusted internal tooling.
pub struct AllowAll;

#[async_trait]
impl Authorizer for AllowAll {
    async fn authorize(&self, _action: AdminAction) -> Result<(), CacheError> {
        Ok(())
    }
}

/// Authorization-gated front door for cache surgery: inspect keys, overwrite
/// or drop entries, and force refreshes, all by raw key.
pub struct CacheAdmin {
    resolver: SwrResolver,
    authorizer: Arc<dyn Authorizer>,
    list_page_limit: usize,
}

impl CacheAdmin {
    pub fn new(
        resolver: SwrResolver,
        authorizer: Arc<dyn Authorizer>,
        list_page_limit: usize,
    ) -> Self {
        CacheAdmin {
            resolver,
            authorizer,
            list_page_limit,
        }
    }

    /// Overwrite the entry for `key` with an operator-supplied value. The
    /// value is trusted as-is; a shape the owning query cannot decode will
    /// be invalidated on the next read.
    pub async fn set_value(&self, key: &str, value: serde_json::Value) -> Result<(), CacheError> {
        self.authorizer.authorize(AdminAction::SetValue).await?;
        info!(key = %key, action = %AdminAction::SetValue, "admin cache write");
        self.resolver.set_raw(key, value).await
    }

    /// Drop the entry for `key`. Idempotent: removing an absent key
    /// succeeds.
    pub async fn remove_value(&self, key: &str) -> Result<(), CacheError> {
        self.authorizer.authorize(AdminAction::RemoveValue).await?;
        info!(key = %key, action = %AdminAction::RemoveValue, "admin cache removal");
        self.resolver.remove_raw(key).await
    }

    /// Enumerate cached keys, sorted, one page at a time. The key itself is
    /// the cursor.
    pub async fn list_keys(
        &self,
        args: &ConnectionArgs,
    ) -> Result<Connection<String>, CacheError> {
        self.authorizer.authorize(AdminAction::ListKeys).await?;

        let mut keys = self.resolver.list_keys().await?;
        keys.sort_unstable();

        resolve_connection(keys, args, self.list_page_limit, |key| key.clone())
    }

    /// Queue an immediate background refresh for `key`. Rejects keys no
    /// registered query spec can decode, since they could never be
    /// recomputed.
    pub async fn update_value(&self, key: &str) -> Result<(), CacheError> {
        self.authorizer.authorize(AdminAction::RefreshValue).await?;
        info!(key = %key, action = %AdminAction::RefreshValue, "admin refresh request");
        self.resolver.refresh_key(key).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::query::{QueryRegistry, QuerySpec};
    use crate::queue::{MemoryQueue, RefreshQueue};
    use crate::store::Store;
    use crate::stores::memory::{MemoryStore, MemoryStoreConfig};
    use std::time::Duration;

    struct ArticleQuery;

    #[async_trait]
    impl QuerySpec for ArticleQuery {
        type Payload = u64;
        type Value = String;

        fn name(&self) -> &'static str {
            "article"
        }

        fn key(&self, payload: &u64) -> String {
            format!("article:{}", payload)
        }

        fn payload(&self, key: &str) -> Option<u64> {
            key.strip_prefix("article:")?.parse().ok()
        }

        fn example_payload(&self) -> u64 {
            1
        }

        fn max_age(&self) -> Duration {
            Duration::from_secs(60)
        }

        async fn fetch(&self, payload: u64) -> Result<String, CacheError> {
            Ok(format!("article body {}", payload))
        }
    }

    /// Denies every action.
    struct DenyAll;

    #[async_trait]
    impl Authorizer for DenyAll {
        async fn authorize(&self, action: AdminAction) -> Result<(), CacheError> {
            Err(CacheError::Unauthorized(action.to_string()))
        }
    }

    struct Fixture {
        admin: CacheAdmin,
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
    }

    fn fixture(authorizer: Arc<dyn Authorizer>) -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
        let queue = Arc::new(MemoryQueue::new(clock.clone()));
        let registry = Arc::new(QueryRegistry::builder().register(ArticleQuery).build().unwrap());
        let resolver = SwrResolver::new(store.clone(), queue.clone(), registry, clock);
        Fixture {
            admin: CacheAdmin::new(resolver, authorizer, 500),
            store,
            queue,
        }
    }

    #[tokio::test]
    async fn test_set_and_remove_value() {
        let f = fixture(Arc::new(AllowAll));

        f.admin
            .set_value("article:7", serde_json::json!("patched body"))
            .await
            .unwrap();
        let entry = f.store.get("article:7").await.unwrap().unwrap();
        assert_eq!(entry.value, serde_json::json!("patched body"));

        f.admin.remove_value("article:7").await.unwrap();
        assert!(f.store.get("article:7").await.unwrap().is_none());

        // Removing again is fine.
        f.admin.remove_value("article:7").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_keys_sorted_and_paginated() {
        let f = fixture(Arc::new(AllowAll));

        for id in [3u64, 1, 2] {
            f.admin
                .set_value(&format!("article:{}", id), serde_json::json!("x"))
                .await
                .unwrap();
        }

        let page = f.admin.list_keys(&ConnectionArgs::first(2)).await.unwrap();
        assert_eq!(page.nodes, vec!["article:1", "article:2"]);
        assert_eq!(page.total_count, 3);
        assert!(page.has_next_page);

        let args = ConnectionArgs {
            first: Some(2),
            after: page.end_cursor,
            ..ConnectionArgs::default()
        };
        let rest = f.admin.list_keys(&args).await.unwrap();
        assert_eq!(rest.nodes, vec!["article:3"]);
        assert!(!rest.has_next_page);
    }

    #[tokio::test]
    async fn test_update_value_queues_known_key_only() {
        let f = fixture(Arc::new(AllowAll));

        f.admin.update_value("article:7").await.unwrap();
        assert_eq!(f.queue.pending_len().await, 1);

        let result = f.admin.update_value("mystery:1").await;
        assert!(matches!(result, Err(CacheError::UnknownKey(_))));
    }

    #[tokio::test]
    async fn test_denied_actions_touch_nothing() {
        let f = fixture(Arc::new(DenyAll));

        let result = f.admin.set_value("article:7", serde_json::json!("x")).await;
        assert!(matches!(result, Err(CacheError::Unauthorized(_))));
        assert!(f.store.get("article:7").await.unwrap().is_none());

        assert!(f.admin.remove_value("article:7").await.is_err());
        assert!(f.admin.list_keys(&ConnectionArgs::default()).await.is_err());

        assert!(f.admin.update_value("article:7").await.is_err());
        assert_eq!(f.queue.pending_len().await, 0);
    }
}
