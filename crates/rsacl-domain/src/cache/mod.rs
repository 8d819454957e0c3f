//! Materialized per-user closure records.
//!
//! A [`ClosureRecord`] holds every relation tag a user reaches through
//! nested usersets, plus the tuple-mutation watermark it was computed at.
//! Records are owned by the build orchestrator: each rebuild replaces the
//! whole record, so readers never see a partially written closure.
//!
//! # Staleness
//!
//! A record goes stale as soon as a tuple affecting its owner is written.
//! Staleness is not pushed to the record; the orchestrator compares
//! `max_tuple_version` against the store watermark the next time a rebuild
//! is triggered.

use std::collections::HashSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::DomainResult;

/// The cached closure of one user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosureRecord {
    /// The principal this closure belongs to.
    pub user: String,
    /// Matched relation tags (`namespace:object#relation`).
    pub relations: HashSet<String>,
    /// Latest tuple mutation version incorporated in this record.
    pub max_tuple_version: u64,
}

impl ClosureRecord {
    /// Creates a new record.
    pub fn new(user: impl Into<String>, relations: HashSet<String>, max_tuple_version: u64) -> Self {
        Self {
            user: user.into(),
            relations,
            max_tuple_version,
        }
    }

    /// Returns true if the record already reflects `watermark`.
    pub fn covers(&self, watermark: u64) -> bool {
        self.max_tuple_version >= watermark
    }

    /// Returns true if the record contains the given tag.
    pub fn contains(&self, tag: &str) -> bool {
        self.relations.contains(tag)
    }
}

/// Persistence contract for closure records.
///
/// `put` must replace the whole record atomically.
#[async_trait]
pub trait ClosureCacheStore: Send + Sync {
    /// Returns the record for `user`, if one was ever built.
    async fn get(&self, user: &str) -> DomainResult<Option<ClosureRecord>>;

    /// Replaces the record for `record.user`.
    async fn put(&self, record: ClosureRecord) -> DomainResult<()>;

    /// Removes every record.
    async fn delete_all(&self) -> DomainResult<()>;

    /// Number of stored records. Zero means the cache was never built.
    async fn count(&self) -> DomainResult<u64>;
}
