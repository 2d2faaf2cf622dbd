/// Error type for cache operations.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    /// The cache was constructed with invalid settings. Fatal: a cache in
    /// this state is never handed out.
    #[error("invalid cache configuration: {0}")]
    Configuration(String),
    /// A striped-lock slot could not be acquired within the configured
    /// timeout. Recoverable; only surfaced when the lock policy asks for it.
    #[error("timed out acquiring lock slot {slot} for key '{key}'")]
    LockTimeout { key: String, slot: usize },
    /// A backing-store operation failed.
    #[error("[{store}] store error for key '{key}': {message}")]
    Store {
        store: String,
        key: String,
        message: String,
    },
    /// A notifier operation failed. Non-fatal for cache mutations; the
    /// synchronizer logs and carries on.
    #[error("[{provider}] notifier error: {message}")]
    Notifier { provider: String, message: String },
    /// Serialization or deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// The caller-supplied compute callback failed. Nothing is cached.
    #[error("compute failed for key '{key}': {message}")]
    Compute { key: String, message: String },
}

impl CacheError {
    /// Create a new configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        CacheError::Configuration(message.into())
    }

    /// Create a new lock-timeout error.
    pub fn lock_timeout(key: impl Into<String>, slot: usize) -> Self {
        CacheError::LockTimeout {
            key: key.into(),
            slot,
        }
    }

    /// Create a new store error.
    pub fn store(
        store: impl Into<String>,
        key: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        CacheError::Store {
            store: store.into(),
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a new notifier error.
    pub fn notifier(provider: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Notifier {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a new compute error.
    pub fn compute(key: impl Into<String>, message: impl Into<String>) -> Self {
        CacheError::Compute {
            key: key.into(),
            message: message.into(),
        }
    }
}
