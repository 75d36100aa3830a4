//! swr-resolver - stale-while-revalidate caching with update coalescing
//!
//! Serves reads from cache whenever any value exists, even a stale one, and
//! refreshes stale entries in the background:
//! - Per-query cache specs with invertible key derivation
//! - Deduplicating refresh queue: N stale reads cost one origin fetch
//! - Per-key locking (in-memory or Redis) around the refresh write
//! - Memory, moka and Redis cache stores
//! - Authorization-gated admin operations with paginated key listing
//!
//! # Example
//!
//! ```ignore
//! use swr_resolver::{
//!     MemoryQueue, MemoryStore, MemoryStoreConfig, QueryRegistry, QuerySpec,
//!     SwrResolver, SystemClock,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let clock = Arc::new(SystemClock);
//!     let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
//!     let queue = Arc::new(MemoryQueue::new(clock.clone()));
//!
//!     let registry = Arc::new(
//!         QueryRegistry::builder()
//!             .register(ArticleQuery) // impl QuerySpec
//!             .build()
//!             .unwrap(),
//!     );
//!
//!     let resolver = SwrResolver::new(store, queue, registry, clock);
//!
//!     // Absent: fetched from the origin synchronously.
//!     // Fresh: served from cache.
//!     // Stale: served from cache, refreshed in the background.
//!     let article = resolver.get(&ArticleQuery, &123).await.unwrap();
//! }
//! ```

mod admin;
mod clock;
mod config;
mod connection;
mod entry;
mod error;
mod lock;
mod query;
mod queue;
mod resolver;
mod store;
pub mod stores;
mod utils;
mod worker;

// Re-export public API
pub use admin::{AdminAction, AllowAll, Authorizer, CacheAdmin};
pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::ResolverConfig;
pub use connection::{Connection, ConnectionArgs, resolve_connection};
pub use entry::CacheEntry;
pub use error::CacheError;
pub use lock::{LockConfig, LockGuard, LockManager, MemoryLockManager, RedisLockManager};
pub use query::{ErasedQuerySpec, QueryRegistry, QueryRegistryBuilder, QuerySpec};
pub use queue::{MemoryQueue, RefreshJob, RefreshQueue};
pub use resolver::SwrResolver;
pub use store::Store;
pub use stores::memory::{EvictOnSetConfig, MemoryStore, MemoryStoreConfig};
pub use stores::moka::{MokaStore, MokaStoreConfig};
pub use stores::redis::{RedisStore, RedisStoreConfig};
pub use worker::{RefreshWorker, WorkerConfig, WorkerPool};
