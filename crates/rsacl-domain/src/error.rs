//! Domain error types for closure resolution and cache building.

use thiserror::Error;

/// Domain-specific errors for closure and check operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The underlying tuple store failed a query.
    #[error("tuple store error: {message}")]
    StoreError { message: String },

    /// The closure cache store failed a read or write.
    #[error("closure cache error: {message}")]
    CacheError { message: String },

    /// A tuple string could not be parsed.
    #[error("invalid acl format: {value}")]
    InvalidAclFormat { value: String },

    /// A permission check request is missing a field.
    #[error("invalid check request: {message}")]
    InvalidCheckRequest { message: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
