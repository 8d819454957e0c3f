//! Traits for storage operations needed by the resolver.

use std::collections::HashSet;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::Acl;

use super::scratch::RequestScratch;

/// A page request for distinct-value listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Maximum number of items to return.
    pub page_size: u32,
    /// Opaque token returned by the previous page.
    pub continuation_token: Option<String>,
}

impl PageRequest {
    /// Requests the first page.
    pub fn first(page_size: u32) -> Self {
        Self {
            page_size,
            continuation_token: None,
        }
    }
}

/// One page of a distinct-value listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Token for the next page; `None` on the last page.
    pub continuation_token: Option<String>,
}

impl<T> Page<T> {
    /// Returns the request for the page after this one, if any.
    pub fn next_request(&self, page_size: u32) -> Option<PageRequest> {
        self.continuation_token
            .as_ref()
            .map(|token| PageRequest {
                page_size,
                continuation_token: Some(token.clone()),
            })
    }
}

/// Trait for tuple storage operations needed by the resolver and builder.
#[async_trait]
pub trait TupleReader: Send + Sync {
    /// Returns every tuple whose subject is the principal `user`.
    async fn find_by_principal(&self, user: &str) -> DomainResult<Vec<Acl>>;

    /// Returns every tuple whose subject is the userset
    /// `namespace:object#relation`.
    async fn find_by_userset(
        &self,
        namespace: &str,
        object: &str,
        relation: &str,
    ) -> DomainResult<Vec<Acl>>;

    /// Returns every tuple on `namespace:object`.
    async fn find_by_namespace_object(
        &self,
        namespace: &str,
        object: &str,
    ) -> DomainResult<Vec<Acl>>;

    /// Lists distinct namespaces that have any tuples.
    async fn list_namespaces(&self, page: &PageRequest) -> DomainResult<Page<String>>;

    /// Lists distinct objects within `namespace`.
    ///
    /// Part of the store's enumeration surface alongside namespaces and end
    /// users. Closure builds start from a user's own tuples and never call it.
    async fn list_objects(
        &self,
        namespace: &str,
        page: &PageRequest,
    ) -> DomainResult<Page<String>>;

    /// Lists distinct concrete principals (the wildcard is excluded).
    async fn list_end_users(&self, page: &PageRequest) -> DomainResult<Page<String>>;

    /// Latest mutation version among tuples naming `user`; 0 if none.
    async fn max_mutation_version(&self, user: &str) -> DomainResult<u64>;
}

/// A single, non-closure relation check.
///
/// Given one object and one user, returns the tags on that object the user
/// satisfies. The closure resolver decides *which* objects are worth
/// evaluating; the checker decides *what* the user holds on each of them.
#[async_trait]
pub trait DirectRelationChecker: Send + Sync {
    /// Returns the matched `namespace:object#relation` tags, restricted to
    /// `relation` when given.
    async fn evaluate(
        &self,
        namespace: &str,
        object: &str,
        relation: Option<&str>,
        user: &str,
        scratch: &mut RequestScratch,
    ) -> DomainResult<HashSet<String>>;
}
