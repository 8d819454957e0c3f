//! Permission check handler.
//!
//! Answers `user ∈ namespace:object#relation` either from the user's closure
//! record or, when the record is missing or a build is pending, by resolving
//! the closure live. Both paths agree on every answer:
//!
//! - **Cache**: directly held tags ∪ closure record ∪ wildcard grants.
//! - **Live**: closure pairs evaluated by the direct relation checker, plus
//!   wildcard grants on objects outside the closure.

use std::sync::Arc;

use tracing::{debug, instrument};

use rsacl_domain::error::{DomainError, DomainResult};
use rsacl_domain::model::tag;
use rsacl_domain::{
    ClosureCacheStore, DirectRelationChecker, NsObject, RequestScratch, TupleReader,
};

use crate::builder::CacheBuildOrchestrator;

/// A single permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckRequest {
    /// The principal being checked (e.g., "alice").
    pub user: String,
    /// Namespace of the target object (e.g., "doc").
    pub namespace: String,
    /// The target object id.
    pub object: String,
    /// The relation to check (e.g., "viewer").
    pub relation: String,
}

impl CheckRequest {
    pub fn new(
        user: impl Into<String>,
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            user: user.into(),
            namespace: namespace.into(),
            object: object.into(),
            relation: relation.into(),
        }
    }

    /// The `namespace:object#relation` tag being checked.
    pub fn tag(&self) -> String {
        tag(&self.namespace, &self.object, &self.relation)
    }

    /// Rejects requests with an empty field.
    pub fn validate(&self) -> DomainResult<()> {
        let fields = [
            ("user", &self.user),
            ("namespace", &self.namespace),
            ("object", &self.object),
            ("relation", &self.relation),
        ];
        for (name, value) in fields {
            if value.is_empty() {
                return Err(DomainError::InvalidCheckRequest {
                    message: format!("{name} cannot be empty"),
                });
            }
        }
        Ok(())
    }
}

/// Where a check answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckSource {
    Cache,
    Live,
}

/// Result of a permission check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResponse {
    pub allowed: bool,
    /// The granted tag, when allowed.
    pub matched: Option<String>,
    pub source: CheckSource,
}

impl CheckResponse {
    fn new(allowed: bool, wanted: String, source: CheckSource) -> Self {
        Self {
            allowed,
            matched: allowed.then_some(wanted),
            source,
        }
    }
}

/// Handler for permission checks.
pub struct CheckHandler<T, C, K> {
    orchestrator: Arc<CacheBuildOrchestrator<T, C, K>>,
}

impl<T, C, K> CheckHandler<T, C, K>
where
    T: TupleReader + 'static,
    C: ClosureCacheStore + 'static,
    K: DirectRelationChecker + 'static,
{
    pub fn new(orchestrator: Arc<CacheBuildOrchestrator<T, C, K>>) -> Self {
        Self { orchestrator }
    }

    /// Checks whether `request.user` holds `request.relation` on the object.
    #[instrument(skip(self, request), fields(user = %request.user, tag = %request.tag()))]
    pub async fn check(&self, request: &CheckRequest) -> DomainResult<CheckResponse> {
        request.validate()?;
        let wanted = request.tag();

        if self.orchestrator.can_use_cache(&request.user) {
            if let Some(record) = self.orchestrator.cache().get(&request.user).await? {
                let allowed = record.contains(&wanted)
                    || self.holds_directly(&request.user, &wanted).await?
                    || self.wildcard_grants(request).await?;
                return Ok(CheckResponse::new(allowed, wanted, CheckSource::Cache));
            }
            debug!("no closure record, resolving live");
        }

        let allowed = self.check_live(request, &wanted).await?;
        Ok(CheckResponse::new(allowed, wanted, CheckSource::Live))
    }

    async fn check_live(&self, request: &CheckRequest, wanted: &str) -> DomainResult<bool> {
        let reader = self.orchestrator.reader();
        let start = reader.find_by_principal(&request.user).await?;
        let mut scratch = RequestScratch::new();
        scratch.prime(&request.user, &start);

        let closure = self
            .orchestrator
            .resolver()
            .compute_closure(&request.user, &start)
            .await?;

        let target = NsObject::new(&request.namespace, &request.object);
        if !closure.contains(&target) {
            return self.wildcard_grants(request).await;
        }

        let matched = self
            .orchestrator
            .checker()
            .evaluate(
                &request.namespace,
                &request.object,
                Some(&request.relation),
                &request.user,
                &mut scratch,
            )
            .await?;
        Ok(matched.contains(wanted))
    }

    async fn holds_directly(&self, user: &str, wanted: &str) -> DomainResult<bool> {
        let mut scratch = RequestScratch::new();
        let direct = scratch
            .ensure(self.orchestrator.reader().as_ref(), user)
            .await?;
        Ok(direct.contains(wanted))
    }

    /// True when the object grants the relation to everyone.
    async fn wildcard_grants(&self, request: &CheckRequest) -> DomainResult<bool> {
        let acls = self
            .orchestrator
            .reader()
            .find_by_namespace_object(&request.namespace, &request.object)
            .await?;
        Ok(acls
            .iter()
            .any(|acl| acl.relation == request.relation && acl.subject.is_wildcard()))
    }
}
