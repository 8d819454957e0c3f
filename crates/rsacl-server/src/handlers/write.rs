//! Tuple write and delete handler.
//!
//! Persists the mutation, then asks the orchestrator to refresh whatever
//! closure records it may have invalidated.

use std::sync::Arc;

use tracing::{debug, instrument};

use rsacl_domain::error::DomainResult;
use rsacl_domain::model::WILDCARD;
use rsacl_domain::{Acl, ClosureCacheStore, DirectRelationChecker, TupleReader};
use rsacl_storage::DataStore;

use crate::adapters::{acl_to_stored, store_error, stored_to_acl};
use crate::builder::CacheBuildOrchestrator;

/// Which rebuild a mutation triggered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RebuildTrigger {
    /// Only the named principal's record was affected.
    User(String),
    /// A userset or wildcard tuple changed; every record may be affected.
    FullRebuild,
    /// Mutation-triggered rebuilds are turned off.
    None,
}

/// Result of a write or delete.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOutcome {
    /// The tuple as stored (for deletes, as requested).
    pub acl: Acl,
    pub rebuild: RebuildTrigger,
    /// False when the rebuild could not be enqueued, e.g. after shutdown. A
    /// full rebuild refused while another is pending still runs afterwards.
    pub accepted: bool,
}

/// Handler for tuple mutations.
pub struct WriteHandler<S, T, C, K> {
    storage: Arc<S>,
    orchestrator: Arc<CacheBuildOrchestrator<T, C, K>>,
}

impl<S, T, C, K> WriteHandler<S, T, C, K>
where
    S: DataStore,
    T: TupleReader + 'static,
    C: ClosureCacheStore + 'static,
    K: DirectRelationChecker + 'static,
{
    pub fn new(storage: Arc<S>, orchestrator: Arc<CacheBuildOrchestrator<T, C, K>>) -> Self {
        Self {
            storage,
            orchestrator,
        }
    }

    /// Stores `acl`. Writing an existing tuple keeps its id.
    #[instrument(skip(self, acl), fields(acl = %acl))]
    pub async fn write(&self, acl: &Acl) -> DomainResult<WriteOutcome> {
        let stored = self
            .storage
            .save_acl(acl_to_stored(acl))
            .await
            .map_err(store_error)?;
        let acl = stored_to_acl(stored)?;
        Ok(self.trigger(acl))
    }

    /// Removes `acl`. Fails with a store error when it does not exist.
    #[instrument(skip(self, acl), fields(acl = %acl))]
    pub async fn delete(&self, acl: &Acl) -> DomainResult<WriteOutcome> {
        self.storage
            .delete_acl(&acl_to_stored(acl))
            .await
            .map_err(store_error)?;
        Ok(self.trigger(acl.clone()))
    }

    fn trigger(&self, acl: Acl) -> WriteOutcome {
        if !self.orchestrator.config().update_on_acl_change {
            return WriteOutcome {
                acl,
                rebuild: RebuildTrigger::None,
                accepted: false,
            };
        }

        let (rebuild, accepted) = match acl.principal() {
            Some(user) if user != WILDCARD => (
                RebuildTrigger::User(user.to_string()),
                self.orchestrator.build_async(user),
            ),
            _ => (
                RebuildTrigger::FullRebuild,
                self.orchestrator.schedule_full_rebuild(),
            ),
        };
        debug!(?rebuild, accepted, "mutation rebuild requested");
        WriteOutcome {
            acl,
            rebuild,
            accepted,
        }
    }
}
