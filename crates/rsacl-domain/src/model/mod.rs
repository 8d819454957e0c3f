//! Relation tuple types and nesting configuration.
//!
//! This module contains:
//! - Core tuple definitions (Acl, AclSubject, NsObject)
//! - Per-namespace relation nesting rules

mod relation_config;
mod types;
#[cfg(test)]
mod types_proptest;

pub use relation_config::{NamespaceRelations, RelationConfig, RelationTable};
pub use types::*;
