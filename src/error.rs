//! Error types for rate limiting operations.
//!
//! Errors fall into two classes:
//!
//! - **Validation**: malformed configuration or a missing identifier. Detected
//!   before any storage access and never retried.
//! - **Storage**: the backend failed, timed out, or returned a record that does
//!   not pass validation. How these reach the caller of
//!   [`RateLimitService::check_limit`](crate::RateLimitService::check_limit) is
//!   governed by [`FailureMode`](crate::FailureMode). Authentication failures
//!   are the one kind of connection error that retrying cannot fix.

use std::time::Duration;
use thiserror::Error;

/// Result type for rate limiting operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

/// Main error type for rate limiting operations.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// Storage backend error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Invalid caller input, such as an empty identifier.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Connection error (e.g., Redis connection failed).
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),
}

impl RateLimitError {
    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// True for errors caused by caller input or configuration.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::Config(_))
    }

    /// True for errors raised by the storage backend or its connection.
    pub fn is_storage(&self) -> bool {
        matches!(self, Self::Storage(_) | Self::Connection(_))
    }

    /// Check if retrying the operation could succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_retryable(),
            Self::Connection(e) => !matches!(e, ConnectionError::AuthFailed(_)),
            _ => false,
        }
    }
}

/// Storage-related errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Generic storage operation failed.
    #[error("{message}")]
    OperationFailed {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A stored record decoded but violates the state invariants.
    #[error("Invalid record for key {key}: {reason}")]
    InvalidRecord {
        /// Storage key of the record.
        key: String,
        /// Which invariant failed.
        reason: String,
    },

    /// Atomic operation failed (CAS conflict).
    #[error("Atomic operation failed, state was modified concurrently")]
    AtomicConflict,

    /// Connection pool exhausted.
    #[error("Connection pool exhausted")]
    PoolExhausted,
}

impl StorageError {
    /// Create a new operation failed error.
    pub fn operation_failed(message: impl Into<String>, retryable: bool) -> Self {
        Self::OperationFailed {
            message: message.into(),
            retryable,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::OperationFailed { retryable, .. } => *retryable,
            Self::AtomicConflict => true,
            Self::PoolExhausted => true,
            _ => false,
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A numeric limit is out of range.
    #[error("Invalid limit: {0}")]
    InvalidLimit(String),

    /// Invalid namespace.
    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    /// Unknown or misconfigured algorithm.
    #[error("Invalid algorithm configuration: {0}")]
    InvalidAlgorithm(String),

    /// Invalid storage configuration.
    #[error("Invalid storage configuration: {0}")]
    InvalidStorage(String),

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    /// Configuration document could not be parsed.
    #[error("Malformed configuration: {0}")]
    Parse(String),
}

/// Connection-related errors.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// Failed to connect.
    #[error("Failed to connect: {0}")]
    ConnectionFailed(String),

    /// Round trip did not complete in time.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Connection closed unexpectedly.
    #[error("Connection closed unexpectedly")]
    Closed,

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_retryable() {
        let err = StorageError::operation_failed("test", true);
        assert!(err.is_retryable());

        let err = StorageError::operation_failed("test", false);
        assert!(!err.is_retryable());

        let err = StorageError::AtomicConflict;
        assert!(err.is_retryable());

        let err = StorageError::Serialization("bad json".into());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_error_classes() {
        let err = RateLimitError::validation("identifier must not be empty");
        assert!(err.is_validation());
        assert!(!err.is_storage());
        assert_eq!(
            err.to_string(),
            "Validation failed: identifier must not be empty"
        );

        let err: RateLimitError = ConfigError::InvalidLimit("max_requests".into()).into();
        assert!(err.is_validation());

        let err: RateLimitError = ConnectionError::Timeout(Duration::from_millis(250)).into();
        assert!(err.is_storage());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("timed out"));

        let err: RateLimitError = ConnectionError::AuthFailed("WRONGPASS".into()).into();
        assert!(err.is_storage());
        assert!(!err.is_retryable());
    }
}
