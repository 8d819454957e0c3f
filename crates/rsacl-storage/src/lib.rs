//! rsacl-storage: Storage abstraction layer
//!
//! This crate provides the persistence side of rsacl:
//! - DataStore trait for tuple and closure-row operations
//! - Offset-based pagination over distinct values
//! - In-memory implementation with a monotonic mutation counter
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               rsacl-storage                  │
//! ├─────────────────────────────────────────────┤
//! │  traits.rs   - DataStore trait definition   │
//! │  memory.rs   - In-memory implementation     │
//! └─────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod memory;
pub mod traits;

// Re-export commonly used types
pub use error::{StorageError, StorageResult};
pub use memory::MemoryDataStore;
pub use traits::{
    AclFilter, DataStore, PaginatedResult, PaginationOptions, StoredAcl, StoredUserRelations,
};
