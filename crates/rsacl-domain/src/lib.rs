//! rsacl-domain: Core relation-closure domain logic
//!
//! This crate contains the authorization graph logic including:
//! - Relation tuple model and per-namespace nesting configuration
//! - Closure resolver that expands a user's tuples through usersets
//! - Direct relation checker and per-request scratch memo
//! - Closure cache contract consumed by the build orchestrator
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │                rsacl-domain                  │
//! ├─────────────────────────────────────────────┤
//! │  model/      - Tuples & relation config     │
//! │  resolver/   - Closure & direct checks      │
//! │  cache/      - Closure record contract      │
//! └─────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod error;
pub mod model;
pub mod resolver;

// Re-export commonly used types at the crate root
pub use cache::{ClosureCacheStore, ClosureRecord};
pub use error::{DomainError, DomainResult};
pub use model::{Acl, AclSubject, NamespaceRelations, NsObject, RelationConfig};
pub use resolver::{
    DirectRelationChecker, RelationClosureResolver, RequestScratch, TupleReader,
    TupleRelationChecker,
};
