/// Error type for cache, lock, queue and pagination operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The store backend is unreachable. Reads treat this as a miss and
    /// degrade to a direct origin fetch; writes surface it.
    #[error("[{tier}] cache unavailable for key '{key}': {message}")]
    Unavailable {
        tier: String,
        key: String,
        message: String,
    },

    /// Lock contention. Expected-common; callers treat it as "someone else
    /// is already refreshing", never as a failure to surface.
    #[error("could not acquire lock for key '{0}'")]
    LockAcquisition(String),

    /// The origin fetch for a key failed.
    #[error("origin fetch failed for key '{key}': {message}")]
    OriginFetch { key: String, message: String },

    /// A cached or freshly fetched value failed decode/validation.
    /// Triggers invalidation of the entry rather than returning bad data.
    #[error("invalid cached value for key '{key}': {message}")]
    InvalidValue { key: String, message: String },

    /// Invalid pagination input (cursor or first/last combination).
    #[error("invalid pagination input: {0}")]
    UserInput(String),

    /// Serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// No registered query spec can decode this key back into a payload.
    #[error("no query spec matches key '{0}'")]
    UnknownKey(String),

    /// The refresh queue could not accept or hand out a job.
    #[error("refresh queue unavailable: {0}")]
    QueueUnavailable(String),

    /// An administrative operation was rejected by the authorization hook.
    #[error("administrative action not authorized: {0}")]
    Unauthorized(String),
}

impl CacheError {
    /// Create a new store-unavailable error.
    pub fn unavailable(
        tier: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Unavailable {
            tier: tier.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new origin-fetch error.
    pub fn origin_fetch(key: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::OriginFetch {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new invalid-value error.
    pub fn invalid_value(key: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::InvalidValue {
            key: key.into(),
            message: message.into(),
        }
    }
}
