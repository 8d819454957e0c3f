//! Core type definitions for relation tuples.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{DomainError, DomainResult};

/// The wildcard principal granting a relation to any user.
pub const WILDCARD: &str = "*";

/// Formats a relation tag (`namespace:object#relation`).
pub fn tag(namespace: &str, object: &str, relation: &str) -> String {
    format!("{namespace}:{object}#{relation}")
}

/// A `(namespace, object)` pair, the unit of closure membership.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NsObject {
    /// The namespace (e.g., "doc").
    pub namespace: String,
    /// The object ID within the namespace (e.g., "readme").
    pub object: String,
}

impl NsObject {
    /// Creates a new pair.
    pub fn new(namespace: impl Into<String>, object: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            object: object.into(),
        }
    }
}

impl fmt::Display for NsObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.object)
    }
}

/// The subject side of a tuple.
///
/// A tuple points either at a concrete principal (or the wildcard `*`) or at
/// the members of another object's relation, never both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AclSubject {
    /// A concrete principal or `*`.
    User { user: String },
    /// Anyone holding `relation` on `namespace:object`.
    Userset {
        namespace: String,
        object: String,
        relation: String,
    },
}

impl AclSubject {
    /// Returns true for the public wildcard principal.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, AclSubject::User { user } if user == WILDCARD)
    }
}

impl fmt::Display for AclSubject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AclSubject::User { user } => f.write_str(user),
            AclSubject::Userset {
                namespace,
                object,
                relation,
            } => write!(f, "{namespace}:{object}#{relation}"),
        }
    }
}

/// A relation tuple (`namespace:object#relation@subject`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Acl {
    /// Stable unique identifier.
    pub id: Uuid,
    pub namespace: String,
    pub object: String,
    pub relation: String,
    pub subject: AclSubject,
}

impl Acl {
    /// Creates a tuple with a fresh ID.
    pub fn new(
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
        subject: AclSubject,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace: namespace.into(),
            object: object.into(),
            relation: relation.into(),
            subject,
        }
    }

    /// Creates a user-pointing tuple.
    pub fn user(
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self::new(
            namespace,
            object,
            relation,
            AclSubject::User { user: user.into() },
        )
    }

    /// Creates a userset-pointing tuple.
    pub fn userset(
        namespace: impl Into<String>,
        object: impl Into<String>,
        relation: impl Into<String>,
        userset_namespace: impl Into<String>,
        userset_object: impl Into<String>,
        userset_relation: impl Into<String>,
    ) -> Self {
        Self::new(
            namespace,
            object,
            relation,
            AclSubject::Userset {
                namespace: userset_namespace.into(),
                object: userset_object.into(),
                relation: userset_relation.into(),
            },
        )
    }

    /// Parses `ns:obj#rel@user` or `ns:obj#rel@ns2:obj2#rel2`.
    pub fn parse(value: &str) -> DomainResult<Self> {
        let invalid = || DomainError::InvalidAclFormat {
            value: value.to_string(),
        };

        let (resource, subject) = value.split_once('@').ok_or_else(invalid)?;
        let (namespace, object, relation) = split_tag(resource).ok_or_else(invalid)?;

        let subject = if subject.contains('#') {
            let (ns, obj, rel) = split_tag(subject).ok_or_else(invalid)?;
            AclSubject::Userset {
                namespace: ns.to_string(),
                object: obj.to_string(),
                relation: rel.to_string(),
            }
        } else if subject.is_empty() {
            return Err(invalid());
        } else {
            AclSubject::User {
                user: subject.to_string(),
            }
        };

        Ok(Self::new(namespace, object, relation, subject))
    }

    /// Returns the `namespace:object#relation` tag of this tuple.
    pub fn tag(&self) -> String {
        tag(&self.namespace, &self.object, &self.relation)
    }

    /// Returns the `(namespace, object)` pair of this tuple.
    pub fn ns_object(&self) -> NsObject {
        NsObject::new(&self.namespace, &self.object)
    }

    /// Returns the principal for user-pointing tuples.
    pub fn principal(&self) -> Option<&str> {
        match &self.subject {
            AclSubject::User { user } => Some(user),
            AclSubject::Userset { .. } => None,
        }
    }

    /// Returns the target tag for userset-pointing tuples.
    pub fn userset_tag(&self) -> Option<String> {
        match &self.subject {
            AclSubject::User { .. } => None,
            AclSubject::Userset {
                namespace,
                object,
                relation,
            } => Some(tag(namespace, object, relation)),
        }
    }

    /// True when this tuple has no usable `(namespace, object, relation)`
    /// position to expand from.
    pub fn is_leaf_position(&self) -> bool {
        self.namespace.is_empty() || self.object.is_empty() || self.relation.is_empty()
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}",
            self.namespace, self.object, self.relation, self.subject
        )
    }
}

fn split_tag(value: &str) -> Option<(&str, &str, &str)> {
    let (ns_object, relation) = value.split_once('#')?;
    let (namespace, object) = ns_object.split_once(':')?;
    if namespace.is_empty() || object.is_empty() || relation.is_empty() {
        return None;
    }
    Some((namespace, object, relation))
}
