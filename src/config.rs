use std::env;
use std::time::Duration;

use crate::lock::LockConfig;
use crate::worker::WorkerConfig;

/// Runtime settings, loadable from the environment.
///
/// All fields have working defaults; `from_env()` only overrides what is
/// set, so a bare environment gives a usable single-node configuration.
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Redis endpoint for the shared store and lock manager. `None` keeps
    /// everything in-process.
    pub redis_url: Option<String>,
    pub default_max_age_ms: u64,
    pub lock_ttl_ms: u64,
    pub lock_retry_count: u32,
    pub lock_retry_delay_ms: u64,
    pub worker_concurrency: usize,
    pub job_retry_limit: u32,
    pub job_retry_delay_ms: u64,
    pub stalled_after_ms: u64,
    pub poll_interval_ms: u64,
    /// Page-size cap for administrative key listing.
    pub list_page_limit: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        ResolverConfig {
            redis_url: None,
            default_max_age_ms: 60_000,
            lock_ttl_ms: 10_000,
            lock_retry_count: 3,
            lock_retry_delay_ms: 50,
            worker_concurrency: 4,
            job_retry_limit: 3,
            job_retry_delay_ms: 250,
            stalled_after_ms: 30_000,
            poll_interval_ms: 100,
            list_page_limit: 500,
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

impl ResolverConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let defaults = ResolverConfig::default();
        ResolverConfig {
            redis_url: env::var("SWR_REDIS_URL").ok(),
            default_max_age_ms: env_parse("SWR_DEFAULT_MAX_AGE_MS", defaults.default_max_age_ms),
            lock_ttl_ms: env_parse("SWR_LOCK_TTL_MS", defaults.lock_ttl_ms),
            lock_retry_count: env_parse("SWR_LOCK_RETRY_COUNT", defaults.lock_retry_count),
            lock_retry_delay_ms: env_parse("SWR_LOCK_RETRY_DELAY_MS", defaults.lock_retry_delay_ms),
            worker_concurrency: env_parse("SWR_WORKER_CONCURRENCY", defaults.worker_concurrency),
            job_retry_limit: env_parse("SWR_JOB_RETRY_LIMIT", defaults.job_retry_limit),
            job_retry_delay_ms: env_parse("SWR_JOB_RETRY_DELAY_MS", defaults.job_retry_delay_ms),
            stalled_after_ms: env_parse("SWR_STALLED_AFTER_MS", defaults.stalled_after_ms),
            poll_interval_ms: env_parse("SWR_POLL_INTERVAL_MS", defaults.poll_interval_ms),
            list_page_limit: env_parse("SWR_LIST_PAGE_LIMIT", defaults.list_page_limit),
        }
    }

    pub fn default_max_age(&self) -> Duration {
        Duration::from_millis(self.default_max_age_ms)
    }

    pub fn lock_config(&self) -> LockConfig {
        LockConfig {
            ttl_ms: self.lock_ttl_ms,
            retry_count: self.lock_retry_count,
            retry_delay: Duration::from_millis(self.lock_retry_delay_ms),
        }
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            concurrency: self.worker_concurrency,
            retry_limit: self.job_retry_limit,
            retry_delay: Duration::from_millis(self.job_retry_delay_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            stalled_after: Duration::from_millis(self.stalled_after_ms),
        }
    }
}
