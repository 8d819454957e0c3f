//! Per-namespace nesting rules consulted by the closure resolver.
//!
//! An entry `doc.nested["member"] = {"viewer"}` means that whoever holds
//! `doc:X#member` also reaches every tuple `Y#viewer@doc:X#member`, i.e. every
//! viewer grant that names the `doc:X#member` userset. Relations without an
//! entry are leaves and are never expanded.
//!
//! The table is immutable once published. Updates build a new table and swap
//! it in, so a resolver walking a snapshot never observes a half-applied
//! change.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// Nesting rules for a single namespace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceRelations {
    /// The namespace these rules apply to.
    pub namespace: String,
    /// Relation held → relations of the tuples that may point at it.
    #[serde(default)]
    pub nested: HashMap<String, HashSet<String>>,
}

impl NamespaceRelations {
    /// Creates an empty rule set for `namespace`.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            nested: HashMap::new(),
        }
    }

    /// Adds the relations reachable from `relation`.
    pub fn with_nested<I, S>(mut self, relation: impl Into<String>, reachable: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nested
            .entry(relation.into())
            .or_default()
            .extend(reachable.into_iter().map(Into::into));
        self
    }

    /// Returns the relations reachable from `relation`, if any.
    pub fn nested_relations(&self, relation: &str) -> Option<&HashSet<String>> {
        self.nested.get(relation).filter(|set| !set.is_empty())
    }
}

/// An immutable snapshot of every namespace's rules.
#[derive(Debug, Clone, Default)]
pub struct RelationTable {
    namespaces: HashMap<String, NamespaceRelations>,
}

impl RelationTable {
    /// Returns the relations reachable from `namespace#relation`.
    pub fn nested_relations(&self, namespace: &str, relation: &str) -> Option<&HashSet<String>> {
        self.namespaces
            .get(namespace)
            .and_then(|ns| ns.nested_relations(relation))
    }

    /// Returns the rules for a namespace.
    pub fn namespace(&self, namespace: &str) -> Option<&NamespaceRelations> {
        self.namespaces.get(namespace)
    }

    /// Number of configured namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    /// Returns true if no namespace is configured.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

/// Hot-swappable holder of the relation table.
///
/// Cloned handles are not shared; wrap in `Arc` to share one holder between
/// the resolver and whatever applies configuration updates.
#[derive(Debug, Default)]
pub struct RelationConfig {
    table: RwLock<Arc<RelationTable>>,
}

impl RelationConfig {
    /// Creates an empty configuration (every relation is a leaf).
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a configuration from a list of namespace rules.
    pub fn from_namespaces(namespaces: impl IntoIterator<Item = NamespaceRelations>) -> Self {
        let config = Self::new();
        config.replace_all(namespaces);
        config
    }

    /// Returns the current table. Cheap; the table itself is never mutated.
    pub fn snapshot(&self) -> Arc<RelationTable> {
        Arc::clone(&self.table.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Replaces every namespace. Namespaces missing from `namespaces` are dropped.
    pub fn replace_all(&self, namespaces: impl IntoIterator<Item = NamespaceRelations>) {
        let table = RelationTable {
            namespaces: namespaces
                .into_iter()
                .map(|ns| (ns.namespace.clone(), ns))
                .collect(),
        };
        *self.table.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(table);
    }

    /// Inserts or replaces the rules of one namespace.
    pub fn upsert_namespace(&self, namespace: NamespaceRelations) {
        self.update(|namespaces| {
            namespaces.insert(namespace.namespace.clone(), namespace);
        });
    }

    /// Removes the rules of one namespace. Returns true if it was present.
    pub fn remove_namespace(&self, namespace: &str) -> bool {
        let mut removed = false;
        self.update(|namespaces| removed = namespaces.remove(namespace).is_some());
        removed
    }

    fn update(&self, apply: impl FnOnce(&mut HashMap<String, NamespaceRelations>)) {
        let mut guard = self.table.write().unwrap_or_else(PoisonError::into_inner);
        let mut namespaces = guard.namespaces.clone();
        apply(&mut namespaces);
        *guard = Arc::new(RelationTable { namespaces });
    }
}
