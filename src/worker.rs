use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::clock::SharedClock;
use crate::entry::CacheEntry;
use crate::error::CacheError;
use crate::lock::LockManager;
use crate::query::QueryRegistry;
use crate::queue::{RefreshJob, RefreshQueue};
use crate::store::Store;

/// Settings for the refresh worker pool.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Number of concurrent worker loops draining the queue.
    pub concurrency: usize,

    /// Re-attempts after a failed origin fetch, inside one job.
    pub retry_limit: u32,

    /// Base delay between fetch attempts; doubles per attempt.
    pub retry_delay: Duration,

    /// Idle sleep when the queue is empty.
    pub poll_interval: Duration,

    /// In-flight jobs older than this are presumed abandoned and re-queued.
    pub stalled_after: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        WorkerConfig {
            concurrency: 4,
            retry_limit: 3,
            retry_delay: Duration::from_millis(250),
            poll_interval: Duration::from_millis(100),
            stalled_after: Duration::from_secs(30),
        }
    }
}

/// Drains the refresh queue: per job, acquire the key's lock, recompute the
/// origin value, write it back, release.
///
/// Errors never leave the worker; they are logged and the stale cache entry
/// stays servable.
#[derive(Clone)]
pub struct RefreshWorker {
    store: Arc<dyn Store>,
    registry: Arc<QueryRegistry>,
    locks: Arc<dyn LockManager>,
    queue: Arc<dyn RefreshQueue>,
    clock: SharedClock,
    config: WorkerConfig,
}

impl RefreshWorker {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<QueryRegistry>,
        locks: Arc<dyn LockManager>,
        queue: Arc<dyn RefreshQueue>,
        clock: SharedClock,
        config: WorkerConfig,
    ) -> Self {
        RefreshWorker {
            store,
            registry,
            locks,
            queue,
            clock,
            config,
        }
    }

    /// Worker loop: process jobs until the task is aborted.
    pub async fn run(self) {
        loop {
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(self.config.poll_interval).await,
                Err(e) => {
                    warn!(error = %e, "refresh queue unavailable, backing off");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// Process at most one job. Returns `false` when the queue was empty.
    pub async fn process_next(&self) -> Result<bool, CacheError> {
        let Some(job) = self.queue.dequeue().await? else {
            return Ok(false);
        };

        self.process_job(&job).await;
        self.queue.complete(&job.key).await?;
        Ok(true)
    }

    async fn process_job(&self, job: &RefreshJob) {
        let Some(spec) = self.registry.resolve(&job.key) else {
            warn!(key = %job.key, "no query spec matches queued key, dropping job");
            return;
        };

        let guard = match self.locks.lock(&job.key).await {
            Ok(guard) => guard,
            Err(CacheError::LockAcquisition(_)) => {
                // Another holder is refreshing this key right now; its write
                // will serve us too.
                debug!(key = %job.key, "refresh already in flight elsewhere, dropping job");
                return;
            }
            Err(e) => {
                warn!(key = %job.key, error = %e, "lock manager unavailable, dropping job");
                return;
            }
        };

        let mut delay = self.config.retry_delay;
        for attempt in 0..=self.config.retry_limit {
            match spec.refresh(&job.key).await {
                Ok(value) => {
                    // Fencing: a lock lost to TTL expiry mid-fetch means
                    // another holder may have written a newer value.
                    if self.locks.validate(&guard).await {
                        let entry = CacheEntry::new(value, self.clock.now_ms());
                        if let Err(e) = self.store.set(&job.key, entry).await {
                            error!(key = %job.key, error = %e, "failed to store refreshed value");
                        } else {
                            debug!(key = %job.key, spec = spec.name(), "refreshed cache entry");
                        }
                    } else {
                        warn!(key = %job.key, "lock expired mid-fetch, discarding refreshed value");
                    }
                    break;
                }
                Err(e) if attempt < self.config.retry_limit => {
                    debug!(key = %job.key, attempt, error = %e, "origin fetch failed, retrying");
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => {
                    // Permanent failure is reported, not silently dropped;
                    // the stale entry remains servable.
                    error!(
                        key = %job.key,
                        retries = self.config.retry_limit,
                        error = %e,
                        "refresh permanently failed"
                    );
                }
            }
        }

        self.locks.unlock(guard).await;
    }
}

/// Pool of worker loops plus the stalled-job sweep.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.concurrency` workers and one periodic sweep that
    /// reclaims jobs from dead workers.
    pub fn spawn(worker: RefreshWorker) -> Self {
        let config = worker.config.clone();
        let mut handles = Vec::with_capacity(config.concurrency + 1);

        for id in 0..config.concurrency {
            let worker = worker.clone();
            handles.push(tokio::spawn(async move {
                debug!(worker = id, "refresh worker started");
                worker.run().await;
            }));
        }

        let queue = worker.queue.clone();
        let stalled_after = config.stalled_after;
        handles.push(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(stalled_after / 2);
            loop {
                ticker.tick().await;
                match queue.requeue_stalled(stalled_after).await {
                    Ok(0) => {}
                    Ok(n) => info!(count = n, "re-queued stalled refresh jobs"),
                    Err(e) => warn!(error = %e, "stalled-job sweep failed"),
                }
            }
        }));

        WorkerPool { handles }
    }

    /// Abort all workers and wait for them to wind down.
    pub async fn shutdown(self) {
        for handle in &self.handles {
            handle.abort();
        }
        let _ = join_all(self.handles).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::lock::{LockConfig, MemoryLockManager};
    use crate::query::QuerySpec;
    use crate::queue::MemoryQueue;
    use crate::stores::memory::{MemoryStore, MemoryStoreConfig};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct ArticleQuery {
        fetch_count: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

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
            let n = self.fetch_count.fetch_add(1, Ordering::SeqCst);
            if self.fail.load(Ordering::SeqCst) {
                return Err(CacheError::origin_fetch(
                    format!("article:{}", payload),
                    "origin down",
                ));
            }
            Ok(format!("article {} rev {}", payload, n))
        }
    }

    struct Fixture {
        worker: RefreshWorker,
        store: Arc<MemoryStore>,
        queue: Arc<MemoryQueue>,
        locks: Arc<MemoryLockManager>,
        clock: Arc<ManualClock>,
        fetch_count: Arc<AtomicUsize>,
        fail: Arc<AtomicBool>,
    }

    fn fixture(config: WorkerConfig) -> Fixture {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = Arc::new(MemoryStore::new(MemoryStoreConfig::default()));
        let queue = Arc::new(MemoryQueue::new(clock.clone()));
        let locks = Arc::new(MemoryLockManager::new(
            clock.clone(),
            LockConfig {
                retry_count: 0,
                retry_delay: Duration::from_millis(1),
                ..LockConfig::default()
            },
        ));
        let fetch_count = Arc::new(AtomicUsize::new(0));
        let fail = Arc::new(AtomicBool::new(false));
        let registry = Arc::new(
            QueryRegistry::builder()
                .register(ArticleQuery {
                    fetch_count: fetch_count.clone(),
                    fail: fail.clone(),
                })
                .build()
                .unwrap(),
        );
        let worker = RefreshWorker::new(
            store.clone(),
            registry,
            locks.clone(),
            queue.clone(),
            clock.clone(),
            config,
        );
        Fixture {
            worker,
            store,
            queue,
            locks,
            clock,
            fetch_count,
            fail,
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            concurrency: 1,
            retry_limit: 2,
            retry_delay: Duration::from_millis(1),
            poll_interval: Duration::from_millis(1),
            stalled_after: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn test_job_refreshes_entry() {
        let f = fixture(fast_config());

        f.queue.enqueue("article:7").await.unwrap();
        assert!(f.worker.process_next().await.unwrap());

        let entry = f.store.get("article:7").await.unwrap().unwrap();
        assert_eq!(entry.value, serde_json::json!("article 7 rev 0"));
        assert_eq!(entry.last_modified, f.clock.now_ms());
        assert_eq!(f.fetch_count.load(Ordering::SeqCst), 1);

        // Job is gone; the key can be queued again.
        assert!(f.queue.enqueue("article:7").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_queue_reports_idle() {
        let f = fixture(fast_config());
        assert!(!f.worker.process_next().await.unwrap());
    }

    #[tokio::test]
    async fn test_held_lock_drops_job_without_fetching() {
        let f = fixture(fast_config());

        // Someone else is refreshing this key.
        let guard = f.locks.lock("article:7").await.unwrap();

        f.queue.enqueue("article:7").await.unwrap();
        assert!(f.worker.process_next().await.unwrap());

        // No fetch, no write, no error.
        assert_eq!(f.fetch_count.load(Ordering::SeqCst), 0);
        assert!(f.store.get("article:7").await.unwrap().is_none());

        f.locks.unlock(guard).await;
    }

    #[tokio::test]
    async fn test_fetch_retries_then_reports_permanent_failure() {
        let f = fixture(fast_config());

        // Pre-existing stale value must survive the failed refresh.
        f.store
            .set("article:7", CacheEntry::new(serde_json::json!("old"), 500))
            .await
            .unwrap();

        f.fail.store(true, Ordering::SeqCst);
        f.queue.enqueue("article:7").await.unwrap();
        assert!(f.worker.process_next().await.unwrap());

        // retry_limit=2 means 3 attempts total.
        assert_eq!(f.fetch_count.load(Ordering::SeqCst), 3);
        let entry = f.store.get("article:7").await.unwrap().unwrap();
        assert_eq!(entry.value, serde_json::json!("old"));

        // The lock was released despite the failure.
        assert!(f.locks.lock("article:7").await.is_ok());
    }

    #[tokio::test]
    async fn test_unknown_key_job_is_dropped() {
        let f = fixture(fast_config());

        f.queue.enqueue("mystery:1").await.unwrap();
        assert!(f.worker.process_next().await.unwrap());

        assert_eq!(f.fetch_count.load(Ordering::SeqCst), 0);
        assert!(f.queue.enqueue("mystery:1").await.unwrap());
    }

    #[tokio::test]
    async fn test_concurrent_triggers_fetch_once() {
        let f = fixture(fast_config());

        // N concurrent stale-read triggers coalesce into one job...
        for _ in 0..10 {
            f.queue.enqueue("article:7").await.unwrap();
        }
        assert_eq!(f.queue.pending_len().await, 1);

        // ...and that one job fetches exactly once.
        assert!(f.worker.process_next().await.unwrap());
        assert!(!f.worker.process_next().await.unwrap());
        assert_eq!(f.fetch_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_worker_pool_drains_in_background() {
        let f = fixture(fast_config());

        f.queue.enqueue("article:7").await.unwrap();
        let pool = WorkerPool::spawn(f.worker.clone());

        // Give the pool a moment to pick the job up.
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown().await;

        let entry = f.store.get("article:7").await.unwrap().unwrap();
        assert_eq!(entry.value, serde_json::json!("article 7 rev 0"));
    }
}
