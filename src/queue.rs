use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;
use tokio::sync::Mutex;

use crate::clock::SharedClock;
use crate::error::CacheError;

/// A background refresh request for one cache key.
#[derive(Debug, Clone)]
pub struct RefreshJob {
    pub key: String,
    pub enqueued_at: i64,
}

/// Queue of keys awaiting background refresh.
///
/// Deduplicated by key: while a job for a key is pending or in flight,
/// further enqueues for that key are no-ops. This is what coalesces a
/// thundering herd of stale reads into a single origin fetch.
#[async_trait]
pub trait RefreshQueue: Send + Sync {
    /// Enqueue a refresh for `key`. Returns `false` when a job for the key
    /// is already pending or in flight.
    async fn enqueue(&self, key: &str) -> Result<bool, CacheError>;

    /// Hand out the next job, moving it to the in-flight set with a
    /// heartbeat timestamp. `None` when the queue is empty.
    async fn dequeue(&self) -> Result<Option<RefreshJob>, CacheError>;

    /// Mark the in-flight job for `key` as done (success or permanent
    /// failure); the key becomes enqueueable again.
    async fn complete(&self, key: &str) -> Result<(), CacheError>;

    /// Re-queue in-flight jobs whose heartbeat is older than
    /// `stalled_after`, reclaiming work from workers that died
    /// mid-processing. Returns the number of jobs re-queued.
    async fn requeue_stalled(&self, stalled_after: Duration) -> Result<usize, CacheError>;

    /// Number of jobs waiting to be dequeued.
    async fn pending_len(&self) -> usize;
}

struct InFlight {
    started_at: i64,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<RefreshJob>,
    pending_keys: HashSet<String>,
    in_flight: HashMap<String, InFlight>,
}

/// In-memory refresh queue.
///
/// Pending order is FIFO. All state lives under one mutex, which makes the
/// "enqueue if not present" check atomic.
pub struct MemoryQueue {
    state: Mutex<QueueState>,
    clock: SharedClock,
}

impl MemoryQueue {
    pub fn new(clock: SharedClock) -> Self {
        MemoryQueue {
            state: Mutex::new(QueueState::default()),
            clock,
        }
    }
}

#[async_trait]
impl RefreshQueue for MemoryQueue {
    async fn enqueue(&self, key: &str) -> Result<bool, CacheError> {
        let mut state = self.state.lock().await;

        if state.pending_keys.contains(key) || state.in_flight.contains_key(key) {
            return Ok(false);
        }

        state.pending_keys.insert(key.to_string());
        state.pending.push_back(RefreshJob {
            key: key.to_string(),
            enqueued_at: self.clock.now_ms(),
        });

        Ok(true)
    }

    async fn dequeue(&self) -> Result<Option<RefreshJob>, CacheError> {
        let mut state = self.state.lock().await;

        let Some(job) = state.pending.pop_front() else {
            return Ok(None);
        };

        state.pending_keys.remove(&job.key);
        state.in_flight.insert(
            job.key.clone(),
            InFlight {
                started_at: self.clock.now_ms(),
            },
        );

        Ok(Some(job))
    }

    async fn complete(&self, key: &str) -> Result<(), CacheError> {
        let mut state = self.state.lock().await;
        state.in_flight.remove(key);
        Ok(())
    }

    async fn requeue_stalled(&self, stalled_after: Duration) -> Result<usize, CacheError> {
        let now = self.clock.now_ms();
        let cutoff = now - stalled_after.as_millis() as i64;
        let mut state = self.state.lock().await;

        let stalled: Vec<String> = state
            .in_flight
            .iter()
            .filter(|(_, f)| f.started_at <= cutoff)
            .map(|(k, _)| k.clone())
            .collect();

        for key in &stalled {
            state.in_flight.remove(key);
            state.pending_keys.insert(key.clone());
            state.pending.push_back(RefreshJob {
                key: key.clone(),
                enqueued_at: now,
            });
        }

        Ok(stalled.len())
    }

    async fn pending_len(&self) -> usize {
        self.state.lock().await.pending.len()
    }
}
