//! Adapters that bridge the storage layer to the domain layer.
//!
//! The domain layer (rsacl-domain) defines abstract traits for data access:
//! - `TupleReader`: Read tuples for closure resolution and checks
//! - `ClosureCacheStore`: Persist per-user closure records
//!
//! The storage layer (rsacl-storage) implements `DataStore` with concrete backends.
//! The adapters here implement the domain traits on top of any `DataStore`.

use std::sync::Arc;

use async_trait::async_trait;

use rsacl_domain::error::{DomainError, DomainResult};
use rsacl_domain::model::{Acl, AclSubject};
use rsacl_domain::resolver::{Page, PageRequest, TupleReader};
use rsacl_domain::{ClosureCacheStore, ClosureRecord};
use rsacl_storage::{
    AclFilter, DataStore, PaginatedResult, PaginationOptions, StorageError, StoredAcl,
    StoredUserRelations,
};

pub(crate) fn store_error(e: StorageError) -> DomainError {
    DomainError::StoreError {
        message: format!("storage error: {e}"),
    }
}

fn cache_error(e: StorageError) -> DomainError {
    DomainError::CacheError {
        message: format!("storage error: {e}"),
    }
}

/// Converts a domain tuple into its storage row.
pub fn acl_to_stored(acl: &Acl) -> StoredAcl {
    let mut row = match &acl.subject {
        AclSubject::User { user } => {
            StoredAcl::user(&acl.namespace, &acl.object, &acl.relation, user)
        }
        AclSubject::Userset {
            namespace,
            object,
            relation,
        } => StoredAcl::userset(
            &acl.namespace,
            &acl.object,
            &acl.relation,
            namespace,
            object,
            relation,
        ),
    };
    row.id = acl.id;
    row
}

/// Converts a storage row back into a domain tuple.
pub fn stored_to_acl(row: StoredAcl) -> DomainResult<Acl> {
    let subject = match (
        row.user,
        row.userset_namespace,
        row.userset_object,
        row.userset_relation,
    ) {
        (Some(user), None, None, None) => AclSubject::User { user },
        (None, Some(namespace), Some(object), Some(relation)) => AclSubject::Userset {
            namespace,
            object,
            relation,
        },
        _ => {
            return Err(DomainError::StoreError {
                message: format!("acl {} has no single subject", row.id),
            })
        }
    };

    Ok(Acl {
        id: row.id,
        namespace: row.namespace,
        object: row.object,
        relation: row.relation,
        subject,
    })
}

fn to_options(page: &PageRequest) -> PaginationOptions {
    PaginationOptions {
        page_size: Some(page.page_size),
        continuation_token: page.continuation_token.clone(),
    }
}

fn to_page(result: PaginatedResult<String>) -> Page<String> {
    Page {
        items: result.items,
        continuation_token: result.continuation_token,
    }
}

/// Adapter that implements `TupleReader` using a `DataStore`.
pub struct DataStoreTupleReader<S: DataStore> {
    storage: Arc<S>,
}

impl<S: DataStore> DataStoreTupleReader<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }

    async fn read(&self, filter: AclFilter) -> DomainResult<Vec<Acl>> {
        self.storage
            .read_acls(&filter)
            .await
            .map_err(store_error)?
            .into_iter()
            .map(stored_to_acl)
            .collect()
    }
}

#[async_trait]
impl<S: DataStore> TupleReader for DataStoreTupleReader<S> {
    async fn find_by_principal(&self, user: &str) -> DomainResult<Vec<Acl>> {
        self.read(AclFilter::by_user(user)).await
    }

    async fn find_by_userset(
        &self,
        namespace: &str,
        object: &str,
        relation: &str,
    ) -> DomainResult<Vec<Acl>> {
        self.read(AclFilter::by_userset(namespace, object, relation))
            .await
    }

    async fn find_by_namespace_object(
        &self,
        namespace: &str,
        object: &str,
    ) -> DomainResult<Vec<Acl>> {
        self.read(AclFilter::by_object(namespace, object)).await
    }

    async fn list_namespaces(&self, page: &PageRequest) -> DomainResult<Page<String>> {
        self.storage
            .list_distinct_namespaces(&to_options(page))
            .await
            .map(to_page)
            .map_err(store_error)
    }

    async fn list_objects(
        &self,
        namespace: &str,
        page: &PageRequest,
    ) -> DomainResult<Page<String>> {
        self.storage
            .list_distinct_objects(namespace, &to_options(page))
            .await
            .map(to_page)
            .map_err(store_error)
    }

    async fn list_end_users(&self, page: &PageRequest) -> DomainResult<Page<String>> {
        self.storage
            .list_distinct_end_users(&to_options(page))
            .await
            .map(to_page)
            .map_err(store_error)
    }

    async fn max_mutation_version(&self, user: &str) -> DomainResult<u64> {
        self.storage.max_acl_version(user).await.map_err(store_error)
    }
}

/// Adapter that implements `ClosureCacheStore` using a `DataStore`.
pub struct DataStoreClosureCache<S: DataStore> {
    storage: Arc<S>,
}

impl<S: DataStore> DataStoreClosureCache<S> {
    /// Creates a new adapter wrapping the given storage.
    pub fn new(storage: Arc<S>) -> Self {
        Self { storage }
    }
}

#[async_trait]
impl<S: DataStore> ClosureCacheStore for DataStoreClosureCache<S> {
    async fn get(&self, user: &str) -> DomainResult<Option<ClosureRecord>> {
        let row = self
            .storage
            .get_user_relations(user)
            .await
            .map_err(cache_error)?;
        Ok(row.map(|row| ClosureRecord::new(row.user, row.relations, row.max_acl_version)))
    }

    async fn put(&self, record: ClosureRecord) -> DomainResult<()> {
        self.storage
            .put_user_relations(StoredUserRelations {
                user: record.user,
                relations: record.relations,
                max_acl_version: record.max_tuple_version,
            })
            .await
            .map_err(cache_error)
    }

    async fn delete_all(&self) -> DomainResult<()> {
        self.storage
            .delete_all_user_relations()
            .await
            .map_err(cache_error)
    }

    async fn count(&self) -> DomainResult<u64> {
        self.storage.count_user_relations().await.map_err(cache_error)
    }
}
