//! DataStore trait definition.

use std::collections::HashSet;
use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{StorageError, StorageResult};

/// Default page size when the caller does not set one.
pub const DEFAULT_PAGE_SIZE: u32 = 100;

/// Filter for reading tuples. `None` fields match anything.
#[derive(Debug, Clone, Default)]
pub struct AclFilter {
    pub namespace: Option<String>,
    pub object: Option<String>,
    pub relation: Option<String>,
    /// Filter by concrete principal (or `*`).
    pub user: Option<String>,
    pub userset_namespace: Option<String>,
    pub userset_object: Option<String>,
    pub userset_relation: Option<String>,
}

impl AclFilter {
    /// Tuples whose subject is the principal `user`.
    pub fn by_user(user: impl Into<String>) -> Self {
        Self {
            user: Some(user.into()),
            ..Default::default()
        }
    }

    /// Tuples whose subject is the userset `namespace:object#relation`.
    pub fn by_userset(
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            userset_namespace: Some(namespace.into()),
            userset_object: Some(object.into()),
            userset_relation: Some(relation.into()),
            ..Default::default()
        }
    }

    /// Tuples on `namespace:object`.
    pub fn by_object(namespace: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            namespace: Some(namespace.into()),
            object: Some(object.into()),
            ..Default::default()
        }
    }

    /// Returns true if `acl` satisfies every set field.
    pub fn matches(&self, acl: &StoredAcl) -> bool {
        fn field(want: &Option<String>, have: &str) -> bool {
            want.as_deref().map_or(true, |w| w == have)
        }
        fn optional(want: &Option<String>, have: &Option<String>) -> bool {
            want.as_ref().map_or(true, |w| have.as_ref() == Some(w))
        }

        field(&self.namespace, &acl.namespace)
            && field(&self.object, &acl.object)
            && field(&self.relation, &acl.relation)
            && optional(&self.user, &acl.user)
            && optional(&self.userset_namespace, &acl.userset_namespace)
            && optional(&self.userset_object, &acl.userset_object)
            && optional(&self.userset_relation, &acl.userset_relation)
    }
}

/// A stored tuple.
///
/// Exactly one of `user` or the `userset_*` triple is set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAcl {
    pub id: Uuid,
    pub namespace: String,
    pub object: String,
    pub relation: String,
    pub user: Option<String>,
    pub userset_namespace: Option<String>,
    pub userset_object: Option<String>,
    pub userset_relation: Option<String>,
    /// Mutation counter value assigned by the store on save.
    pub version: u64,
}

impl StoredAcl {
    /// Creates a user-pointing row with a fresh ID.
    pub fn user(
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            object: object.into(),
            relation: relation.into(),
            user: Some(user.into()),
            userset_namespace: None,
            userset_object: None,
            userset_relation: None,
            version: 0,
        }
    }

    /// Creates a userset-pointing row with a fresh ID.
    pub fn userset(
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
        userset_namespace: impl Into<String>,
        userset_object: impl Into<String>,
        userset_relation: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            object: object.into(),
            relation: relation.into(),
            user: None,
            userset_namespace: Some(userset_namespace.into()),
            userset_object: Some(userset_object.into()),
            userset_relation: Some(userset_relation.into()),
            version: 0,
        }
    }

    /// Identity used for deduplication (everything but `id` and `version`).
    pub fn key(&self) -> AclKey {
        AclKey {
            namespace: self.namespace.clone(),
            object: self.object.clone(),
            relation: self.relation.clone(),
            user: self.user.clone(),
            userset_namespace: self.userset_namespace.clone(),
            userset_object: self.userset_object.clone(),
            userset_relation: self.userset_relation.clone(),
        }
    }
}

impl fmt::Display for StoredAcl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}#{}@", self.namespace, self.object, self.relation)?;
        match (&self.user, &self.userset_namespace, &self.userset_object, &self.userset_relation) {
            (Some(user), _, _, _) => f.write_str(user),
            (None, Some(ns), Some(obj), Some(rel)) => write!(f, "{ns}:{obj}#{rel}"),
            _ => f.write_str("?"),
        }
    }
}

/// Deduplication key of a [`StoredAcl`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AclKey {
    namespace: String,
    object: String,
    relation: String,
    user: Option<String>,
    userset_namespace: Option<String>,
    userset_object: Option<String>,
    userset_relation: Option<String>,
}

/// A persisted closure row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredUserRelations {
    pub user: String,
    pub relations: HashSet<String>,
    pub max_acl_version: u64,
}

/// Pagination options for list operations.
#[derive(Debug, Clone, Default)]
pub struct PaginationOptions {
    /// Maximum number of items to return; defaults to [`DEFAULT_PAGE_SIZE`].
    pub page_size: Option<u32>,
    /// Offset token returned by the previous page.
    pub continuation_token: Option<String>,
}

/// Paginated result.
#[derive(Debug, Clone)]
pub struct PaginatedResult<T> {
    pub items: Vec<T>,
    /// `None` on the last page.
    pub continuation_token: Option<String>,
}

/// Decodes an offset continuation token; `None` means offset 0.
pub fn parse_continuation_token(token: &Option<String>) -> StorageResult<usize> {
    match token {
        None => Ok(0),
        Some(token) => token
            .parse::<usize>()
            .map_err(|_| StorageError::InvalidContinuationToken {
                token: token.clone(),
            }),
    }
}

/// Cuts one page out of an already ordered item list.
pub fn paginate<T>(items: Vec<T>, pagination: &PaginationOptions) -> StorageResult<PaginatedResult<T>> {
    let page_size = pagination.page_size.unwrap_or(DEFAULT_PAGE_SIZE) as usize;
    if page_size == 0 {
        return Err(StorageError::InvalidInput {
            message: "page_size must be greater than 0".to_string(),
        });
    }
    let offset = parse_continuation_token(&pagination.continuation_token)?;

    let total = items.len();
    let items: Vec<T> = items.into_iter().skip(offset).take(page_size).collect();
    let next_offset = offset + items.len();
    let continuation_token = if next_offset < total {
        Some(next_offset.to_string())
    } else {
        None
    };

    Ok(PaginatedResult {
        items,
        continuation_token,
    })
}

/// Validates that a row names a full position and exactly one subject kind.
pub fn validate_acl(acl: &StoredAcl) -> StorageResult<()> {
    let invalid = |message: &str| {
        Err(StorageError::InvalidInput {
            message: format!("{message}: {acl}"),
        })
    };

    if acl.namespace.is_empty() || acl.object.is_empty() || acl.relation.is_empty() {
        return invalid("namespace, object and relation are required");
    }

    let userset = [
        &acl.userset_namespace,
        &acl.userset_object,
        &acl.userset_relation,
    ];
    let userset_fields = userset
        .iter()
        .filter(|f| f.as_deref().is_some_and(|v| !v.is_empty()))
        .count();

    match (&acl.user, userset_fields) {
        (Some(user), 0) if !user.is_empty() => Ok(()),
        (None, 3) => Ok(()),
        (Some(_), 0) => invalid("user must not be empty"),
        (Some(_), _) => invalid("acl cannot name both a user and a userset"),
        (None, _) => invalid("acl must name a user or a complete userset"),
    }
}

/// Abstract storage interface for tuples and closure rows.
///
/// Implementations must be thread-safe (Send + Sync) and support
/// async operations.
#[async_trait]
pub trait DataStore: Send + Sync + 'static {
    // Tuple operations

    /// Inserts a tuple, or refreshes the version of an identical one.
    ///
    /// Returns the stored row with its assigned version.
    async fn save_acl(&self, acl: StoredAcl) -> StorageResult<StoredAcl>;

    /// Deletes the tuple identical to `acl`.
    async fn delete_acl(&self, acl: &StoredAcl) -> StorageResult<()>;

    /// Reads tuples matching the filter, oldest first.
    async fn read_acls(&self, filter: &AclFilter) -> StorageResult<Vec<StoredAcl>>;

    /// Lists distinct namespaces, sorted.
    async fn list_distinct_namespaces(
        &self,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<String>>;

    /// Lists distinct objects in `namespace`, sorted.
    async fn list_distinct_objects(
        &self,
        namespace: &str,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<String>>;

    /// Lists distinct concrete principals, sorted, without the wildcard.
    async fn list_distinct_end_users(
        &self,
        pagination: &PaginationOptions,
    ) -> StorageResult<PaginatedResult<String>>;

    /// Latest mutation version that touched a tuple naming `principal`.
    ///
    /// Deletions count. Returns 0 for principals never written.
    async fn max_acl_version(&self, principal: &str) -> StorageResult<u64>;

    // Closure row operations

    /// Reads the closure row of `user`.
    async fn get_user_relations(&self, user: &str) -> StorageResult<Option<StoredUserRelations>>;

    /// Replaces the closure row of `row.user`.
    async fn put_user_relations(&self, row: StoredUserRelations) -> StorageResult<()>;

    /// Removes every closure row.
    async fn delete_all_user_relations(&self) -> StorageResult<()>;

    /// Number of closure rows.
    async fn count_user_relations(&self) -> StorageResult<u64>;
}
