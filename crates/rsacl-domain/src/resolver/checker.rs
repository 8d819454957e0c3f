//! Tuple-backed direct relation checker.

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::DomainResult;
use crate::model::{tag, AclSubject, NsObject, WILDCARD};

use super::scratch::RequestScratch;
use super::traits::{DirectRelationChecker, TupleReader};

/// Type alias for boxed future to handle async recursion.
type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Memo and cycle guard for one `evaluate` call.
#[derive(Default)]
struct Evaluation {
    resolved: HashMap<NsObject, HashSet<String>>,
    visiting: HashSet<NsObject>,
}

/// Evaluates which tags a user satisfies on one object by reading its tuples.
///
/// A tuple on the object matches when it names the user, names the wildcard,
/// or names a userset the user belongs to. Userset membership is answered
/// from the request scratch first (tags the user holds directly) and
/// otherwise by evaluating the userset's object the same way.
pub struct TupleRelationChecker<T> {
    reader: Arc<T>,
}

impl<T> TupleRelationChecker<T>
where
    T: TupleReader + 'static,
{
    /// Creates a checker over `reader`.
    pub fn new(reader: Arc<T>) -> Self {
        Self { reader }
    }

    fn evaluate_object<'a>(
        &'a self,
        target: NsObject,
        user: &'a str,
        scratch: &'a mut RequestScratch,
        state: &'a mut Evaluation,
    ) -> BoxFuture<'a, DomainResult<HashSet<String>>> {
        Box::pin(async move {
            if let Some(tags) = state.resolved.get(&target) {
                return Ok(tags.clone());
            }
            // Cycle: the object is already being evaluated further up.
            if !state.visiting.insert(target.clone()) {
                return Ok(HashSet::new());
            }

            scratch.ensure(&*self.reader, user).await?;
            let acls = self
                .reader
                .find_by_namespace_object(&target.namespace, &target.object)
                .await?;

            let mut matched = HashSet::new();
            for acl in acls {
                let grants = match &acl.subject {
                    AclSubject::User { user: principal } => {
                        principal == user || principal == WILDCARD
                    }
                    AclSubject::Userset {
                        namespace,
                        object,
                        relation,
                    } => {
                        let member_tag = tag(namespace, object, relation);
                        if scratch.holds(user, &member_tag) {
                            true
                        } else {
                            let nested = self
                                .evaluate_object(
                                    NsObject::new(namespace, object),
                                    user,
                                    &mut *scratch,
                                    &mut *state,
                                )
                                .await?;
                            nested.contains(&member_tag)
                        }
                    }
                };
                if grants {
                    matched.insert(acl.tag());
                }
            }

            state.visiting.remove(&target);
            state.resolved.insert(target, matched.clone());
            Ok(matched)
        })
    }
}

#[async_trait]
impl<T> DirectRelationChecker for TupleRelationChecker<T>
where
    T: TupleReader + 'static,
{
    async fn evaluate(
        &self,
        namespace: &str,
        object: &str,
        relation: Option<&str>,
        user: &str,
        scratch: &mut RequestScratch,
    ) -> DomainResult<HashSet<String>> {
        let mut state = Evaluation::default();
        let mut matched = self
            .evaluate_object(NsObject::new(namespace, object), user, scratch, &mut state)
            .await?;

        if let Some(relation) = relation {
            let wanted = tag(namespace, object, relation);
            matched.retain(|t| *t == wanted);
        }
        Ok(matched)
    }
}
