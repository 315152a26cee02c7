//! Error types shared across keyway crates

use thiserror::Error;

/// Standard result type for core operations
pub type CoreResult<T> = std::result::Result<T, CoreError>;

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

impl CoreError {
    /// Create an invalid config error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Errors raised by a [`KeyValueStorage`](crate::KeyValueStorage) backend
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing store cannot be reached (e.g. storage disabled in the browser)
    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Storage IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Backend-specific failure (quota exceeded, security error, ...)
    #[error("Storage backend error: {0}")]
    Backend(String),
}
