//! In-memory storage implementation.
//!
//! Tuples are keyed by their identity (everything but `id` and `version`),
//! so saving the same tuple twice keeps a single row. Every save and delete
//! draws a fresh value from one monotonic counter; the counter value is
//! also recorded per principal so that deletions advance the principal's
//! watermark even though the row itself is gone.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, instrument};

use crate::error::{StorageError, StorageResult};
use crate::traits::{
    paginate, validate_acl, AclFilter, AclKey, DataStore, PaginatedResult, PaginationOptions,
    StoredAcl, StoredUserRelations,
};

const WILDCARD: &str = "*";

/// In-memory implementation of DataStore.
///
/// # Performance Characteristics
///
/// - **Save / delete tuple**: O(1) average (DashMap keyed by tuple identity)
/// - **Read tuples**: O(N) linear scan for filtering
/// - **Distinct listings**: O(N log N) (collected into a sorted set per call)
/// - **Closure rows**: O(1) (DashMap lookup)
#[derive(Debug, Default)]
pub struct MemoryDataStore {
    acls: DashMap<AclKey, StoredAcl>,
    /// Last mutation counter value per principal, including deletions.
    principal_versions: DashMap<String, u64>,
    user_relations: DashMap<String, StoredUserRelations>,
    version: AtomicU64,
}

impl MemoryDataStore {
    /// Creates a new in-memory data store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new in-memory data store wrapped in Arc.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Current value of the mutation counter.
    pub fn current_version(&self) -> u64 {
        self.version.load(Ordering::SeqCst)
    }

    fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn touch_principal(&self, acl: &StoredAcl, version: u64) {
        if let Some(user) = &acl.user {
            let mut entry = self.principal_versions.entry(user.clone()).or_insert(0);
            *entry = (*entry).max(version);
        }
    }

    fn distinct<F>(&self, select: F) -> Vec<String>
    where
        F: Fn(&StoredAcl) -> Option<String>,
    {
        self.acls
            .iter()
            .filter_map(|entry| select(entry.value()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

#[async_trait]
impl DataStore for MemoryDataStore {
    #[instrument(skip(self, acl), fields(acl = %acl))]
    async fn save_acl(&self, mut acl: StoredAcl) -> StorageResult<StoredAcl> {
        validate_acl(&acl)?;

        let version = self.next_version();
        let stored = {
            let mut entry = self.acls.entry(acl.key()).or_insert_with(|| {
                acl.version = version;
                acl.clone()
            });
            entry.version = version;
            entry.clone()
        };
        self.touch_principal(&stored, version);

        debug!(version, "saved acl");
        Ok(stored)
    }

    #[instrument(skip(self, acl), fields(acl = %acl))]
    async fn delete_acl(&self, acl: &StoredAcl) -> StorageResult<()> {
        validate_acl(acl)?;

        let Some((_, removed)) = self.acls.remove(&acl.key()) else {
            return Err(StorageError::AclNotFound {
                acl: acl.to_string(),
            });
        };
        let version = self.next_version();
        self.touch_principal(&removed, version);

        debug!(version, "deleted acl");
        Ok(())
    }

    async fn read_acls(&self, filter: &AclFilter) -> StorageResult<Vec<StoredAcl>> {
        let mut rows: Vec<StoredAcl> = self
            .acls
            .iter()
            .filter(|entry| filter.matches(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        rows.sort_by_key(|row| row.version);
        Ok(rows)
    }

    async fn list_distinct_namespaces(
        &self,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<String>> {
        paginate(self.distinct(|acl| Some(acl.namespace.clone())), pagination)
    }

    async fn list_distinct_objects(
        &self,
        namespace: &str,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<String>> {
        let objects =
            self.distinct(|acl| (acl.namespace == namespace).then(|| acl.object.clone()));
        paginate(objects, pagination)
    }

    async fn list_distinct_end_users(
        &self,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<String>> {
        let users = self.distinct(|acl| acl.user.clone().filter(|user| user != WILDCARD));
        paginate(users, pagination)
    }

    async fn max_acl_version(&self, principal: &str) -> StorageResult<u64> {
        Ok(self
            .principal_versions
            .get(principal)
            .map(|v| *v.value())
            .unwrap_or(0))
    }

    async fn get_user_relations(&self, user: &str) -> StorageResult<Option<StoredUserRelations>> {
        Ok(self.user_relations.get(user).map(|row| row.value().clone()))
    }

    async fn put_user_relations(&self, row: StoredUserRelations) -> StorageResult<()> {
        if row.user.is_empty() {
            return Err(StorageError::InvalidInput {
                message: "user relation row requires a user".to_string(),
            });
        }
        self.user_relations.insert(row.user.clone(), row);
        Ok(())
    }

    async fn delete_all_user_relations(&self) -> StorageResult<()> {
        self.user_relations.clear();
        Ok(())
    }

    async fn count_user_relations(&self) -> StorageResult<u64> {
        Ok(self.user_relations.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn first_page(size: u32) -> PaginationOptions {
        PaginationOptions {
            page_size: Some(size),
            continuation_token: None,
        }
    }

    // Test: MemoryDataStore can be created as shared Arc
    #[tokio::test]
    async fn test_memory_store_shared() {
        let store = MemoryDataStore::new_shared();
        store
            .save_acl(StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await
            .unwrap();

        let store2 = Arc::clone(&store);
        let rows = store2.read_acls(&AclFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_save_assigns_increasing_versions() {
        let store = MemoryDataStore::new();
        let first = store
            .save_acl(StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await
            .unwrap();
        let second = store
            .save_acl(StoredAcl::user("doc", "d2", "viewer", "alice"))
            .await
            .unwrap();

        assert!(second.version > first.version);
        assert_eq!(store.max_acl_version("alice").await.unwrap(), second.version);
        assert_eq!(store.current_version(), second.version);
    }

    // Test: saving an identical tuple keeps one row and its original id
    #[tokio::test]
    async fn test_save_duplicate_keeps_single_row() {
        let store = MemoryDataStore::new();
        let first = store
            .save_acl(StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await
            .unwrap();
        let again = store
            .save_acl(StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await
            .unwrap();

        assert_eq!(again.id, first.id);
        assert!(again.version > first.version);
        assert_eq!(store.read_acls(&AclFilter::default()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_save_rejects_invalid_acl() {
        let store = MemoryDataStore::new();
        let result = store
            .save_acl(StoredAcl::user("", "d1", "viewer", "alice"))
            .await;

        assert!(matches!(result, Err(StorageError::InvalidInput { .. })));
        assert_eq!(store.current_version(), 0);
    }

    // Test: deletion advances the watermark of the removed tuple's principal
    #[tokio::test]
    async fn test_delete_advances_principal_version() {
        let store = MemoryDataStore::new();
        let saved = store
            .save_acl(StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await
            .unwrap();

        store
            .delete_acl(&StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await
            .unwrap();

        assert!(store.read_acls(&AclFilter::default()).await.unwrap().is_empty());
        assert!(store.max_acl_version("alice").await.unwrap() > saved.version);
    }

    #[tokio::test]
    async fn test_delete_missing_acl_is_not_found() {
        let store = MemoryDataStore::new();
        let result = store
            .delete_acl(&StoredAcl::user("doc", "d1", "viewer", "alice"))
            .await;

        assert!(matches!(result, Err(StorageError::AclNotFound { .. })));
    }

    #[tokio::test]
    async fn test_userset_rows_do_not_touch_principal_versions() {
        let store = MemoryDataStore::new();
        store
            .save_acl(StoredAcl::userset("doc", "d1", "viewer", "group", "eng", "member"))
            .await
            .unwrap();

        assert_eq!(store.max_acl_version("group:eng#member").await.unwrap(), 0);
        assert_eq!(store.current_version(), 1);
    }

    #[tokio::test]
    async fn test_read_acls_by_userset_and_object() {
        let store = MemoryDataStore::new();
        store
            .save_acl(StoredAcl::user("group", "eng", "member", "alice"))
            .await
            .unwrap();
        store
            .save_acl(StoredAcl::userset("doc", "d1", "viewer", "group", "eng", "member"))
            .await
            .unwrap();
        store
            .save_acl(StoredAcl::userset("doc", "d2", "viewer", "group", "ops", "member"))
            .await
            .unwrap();

        let pointing = store
            .read_acls(&AclFilter::by_userset("group", "eng", "member"))
            .await
            .unwrap();
        assert_eq!(pointing.len(), 1);
        assert_eq!(pointing[0].object, "d1");

        let on_object = store
            .read_acls(&AclFilter::by_object("group", "eng"))
            .await
            .unwrap();
        assert_eq!(on_object.len(), 1);
        assert_eq!(on_object[0].user.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_distinct_listings_paginate_sorted_values() {
        let store = MemoryDataStore::new();
        for (ns, obj, user) in [
            ("doc", "d1", "carol"),
            ("doc", "d2", "alice"),
            ("folder", "f1", "bob"),
            ("group", "g1", "alice"),
            ("doc", "d3", "*"),
        ] {
            store
                .save_acl(StoredAcl::user(ns, obj, "viewer", user))
                .await
                .unwrap();
        }

        let page = store.list_distinct_namespaces(&first_page(2)).await.unwrap();
        assert_eq!(page.items, vec!["doc", "folder"]);
        let next = PaginationOptions {
            page_size: Some(2),
            continuation_token: page.continuation_token,
        };
        let page = store.list_distinct_namespaces(&next).await.unwrap();
        assert_eq!(page.items, vec!["group"]);
        assert!(page.continuation_token.is_none());

        let users = store.list_distinct_end_users(&first_page(10)).await.unwrap();
        assert_eq!(users.items, vec!["alice", "bob", "carol"]);

        let objects = store
            .list_distinct_objects("doc", &first_page(10))
            .await
            .unwrap();
        assert_eq!(objects.items, vec!["d1", "d2", "d3"]);
    }

    #[tokio::test]
    async fn test_user_relation_rows_replace_and_count() {
        let store = MemoryDataStore::new();
        assert_eq!(store.count_user_relations().await.unwrap(), 0);

        store
            .put_user_relations(StoredUserRelations {
                user: "alice".to_string(),
                relations: HashSet::from(["doc:d1#viewer".to_string()]),
                max_acl_version: 1,
            })
            .await
            .unwrap();
        store
            .put_user_relations(StoredUserRelations {
                user: "alice".to_string(),
                relations: HashSet::new(),
                max_acl_version: 2,
            })
            .await
            .unwrap();

        let row = store.get_user_relations("alice").await.unwrap().unwrap();
        assert!(row.relations.is_empty());
        assert_eq!(row.max_acl_version, 2);
        assert_eq!(store.count_user_relations().await.unwrap(), 1);

        store.delete_all_user_relations().await.unwrap();
        assert_eq!(store.count_user_relations().await.unwrap(), 0);
        assert!(store.get_user_relations("alice").await.unwrap().is_none());
    }
}
