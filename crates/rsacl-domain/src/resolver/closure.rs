//! Relation closure resolution.
//!
//! Expands a user's directly held tuples into every `(namespace, object)`
//! pair the user reaches through nested userset relations.
//!
//! # Algorithm
//!
//! Breadth-first walk over `(namespace, object, relation)` positions:
//!
//! 1. Seed the work list with the user's own tuples.
//! 2. Each dequeued position contributes its `(namespace, object)` pair.
//! 3. The relation config names which relations may point at the position
//!    through a userset. No entry means the position is a leaf.
//! 4. Tuples whose userset is the position and whose relation is listed are
//!    enqueued.
//!
//! Each position is expanded at most once. The visited set is checked before
//! enqueueing and again on dequeue, so cyclic graphs terminate after a
//! bounded number of store lookups regardless of config depth.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use tracing::{debug, instrument, trace};

use crate::error::DomainResult;
use crate::model::{Acl, NsObject, RelationConfig};

use super::traits::TupleReader;

/// A `(namespace, object, relation)` node of the tuple graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Position {
    namespace: String,
    object: String,
    relation: String,
}

impl Position {
    fn of(acl: &Acl) -> Self {
        Self {
            namespace: acl.namespace.clone(),
            object: acl.object.clone(),
            relation: acl.relation.clone(),
        }
    }
}

/// Computes per-user relation closures.
pub struct RelationClosureResolver<T> {
    reader: Arc<T>,
    config: Arc<RelationConfig>,
}

impl<T> RelationClosureResolver<T>
where
    T: TupleReader + 'static,
{
    /// Creates a resolver over `reader` guided by `config`.
    pub fn new(reader: Arc<T>, config: Arc<RelationConfig>) -> Self {
        Self { reader, config }
    }

    /// Returns the relation config this resolver reads.
    pub fn config(&self) -> &Arc<RelationConfig> {
        &self.config
    }

    /// Loads the tuples `user` holds directly and computes their closure.
    pub async fn closure_for(&self, user: &str) -> DomainResult<HashSet<NsObject>> {
        let start = self.reader.find_by_principal(user).await?;
        self.compute_closure(user, &start).await
    }

    /// Computes the closure reachable from `start`.
    ///
    /// Returns an empty set without touching the store when `start` is empty.
    #[instrument(skip(self, start), fields(start_tuples = start.len()))]
    pub async fn compute_closure(
        &self,
        user: &str,
        start: &[Acl],
    ) -> DomainResult<HashSet<NsObject>> {
        let mut closure = HashSet::new();
        if start.is_empty() {
            return Ok(closure);
        }

        // One snapshot per walk: a concurrent hot-swap must not mix tables.
        let table = self.config.snapshot();

        let mut expanded: HashSet<Position> = HashSet::new();
        let mut queue: VecDeque<Position> = start.iter().map(Position::of).collect();
        let mut lookups = 0usize;

        while let Some(position) = queue.pop_front() {
            if !expanded.insert(position.clone()) {
                continue;
            }
            if position.namespace.is_empty() || position.object.is_empty() {
                continue;
            }
            closure.insert(NsObject::new(&position.namespace, &position.object));

            if position.relation.is_empty() {
                continue;
            }
            let Some(nested) = table.nested_relations(&position.namespace, &position.relation)
            else {
                continue;
            };

            trace!(
                namespace = %position.namespace,
                object = %position.object,
                relation = %position.relation,
                "expanding userset position"
            );
            let pointing = self
                .reader
                .find_by_userset(&position.namespace, &position.object, &position.relation)
                .await?;
            lookups += 1;

            for acl in pointing {
                if !nested.contains(&acl.relation) {
                    continue;
                }
                let next = Position::of(&acl);
                if !expanded.contains(&next) {
                    queue.push_back(next);
                }
            }
        }

        debug!(pairs = closure.len(), lookups, "computed relation closure");
        Ok(closure)
    }
}
