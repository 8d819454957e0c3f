//! Storage error types.

use thiserror::Error;

/// Storage-specific errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Tuple not found.
    #[error("acl not found: {acl}")]
    AclNotFound { acl: String },

    /// Invalid input error.
    #[error("invalid input: {message}")]
    InvalidInput { message: String },

    /// Continuation token could not be decoded.
    #[error("invalid continuation token: {token}")]
    InvalidContinuationToken { token: String },

    /// Query error.
    #[error("storage query error: {message}")]
    QueryError { message: String },

    /// Internal error.
    #[error("internal storage error: {message}")]
    InternalError { message: String },
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
