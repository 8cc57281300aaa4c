//! Error types for cache operations

use thiserror::Error;

/// Main error type for all cache operations
#[derive(Error, Debug, Clone)]
pub enum CacheError {
    /// Serialization failed
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Store connection failed
    #[error("connection error: {0}")]
    Connection(String),

    /// Store operation failed
    #[error("backend error: {0}")]
    Backend(String),

    /// Stored value has the wrong shape for the requested operation
    #[error("type mismatch for key: {0}")]
    TypeMismatch(String),

    /// Configuration rejected at construction
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Timeout
    #[error("operation timed out")]
    Timeout,
}

impl CacheError {
    /// Whether the error means the store itself is unreachable.
    ///
    /// The object cache goes offline for good on these; any other error only
    /// fails the operation that raised it.
    pub fn is_connection(&self) -> bool {
        matches!(self, CacheError::Connection(_) | CacheError::Timeout)
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
