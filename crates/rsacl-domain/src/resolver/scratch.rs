//! Per-resolution memo of the tags a user holds directly.
//!
//! Built for one closure computation (or one batch of them) and dropped
//! afterwards; never persisted.

use std::collections::{HashMap, HashSet};

use crate::error::DomainResult;
use crate::model::{Acl, WILDCARD};

use super::traits::TupleReader;

/// Memo of `user → directly held tags`.
#[derive(Debug, Default)]
pub struct RequestScratch {
    direct_tags: HashMap<String, HashSet<String>>,
    empty: HashSet<String>,
}

impl RequestScratch {
    /// Creates an empty scratch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the tags `user` holds directly, querying the store at most
    /// once per user.
    ///
    /// The wildcard `*` has no identity-bound tags: it yields an empty set
    /// without touching the store and is never memoized.
    pub async fn ensure<R>(&mut self, reader: &R, user: &str) -> DomainResult<&HashSet<String>>
    where
        R: TupleReader + ?Sized,
    {
        if user == WILDCARD {
            return Ok(&self.empty);
        }

        if !self.direct_tags.contains_key(user) {
            let acls = reader.find_by_principal(user).await?;
            self.prime(user, &acls);
        }

        Ok(self.direct_tags.get(user).unwrap_or(&self.empty))
    }

    /// Seeds the memo from tuples the caller already loaded for `user`.
    ///
    /// An existing entry is kept as is.
    pub fn prime(&mut self, user: &str, acls: &[Acl]) {
        if user == WILDCARD {
            return;
        }
        self.direct_tags
            .entry(user.to_string())
            .or_insert_with(|| acls.iter().map(Acl::tag).collect());
    }

    /// Returns the memoized tags without querying.
    pub fn tags(&self, user: &str) -> Option<&HashSet<String>> {
        self.direct_tags.get(user)
    }

    /// Returns true if `user` is memoized as directly holding `tag`.
    pub fn holds(&self, user: &str, tag: &str) -> bool {
        self.tags(user).is_some_and(|tags| tags.contains(tag))
    }
}
