//! Relationship tuples and the references they are built from.
//!
//! The canonical text form follows the usual Zanzibar notation:
//!
//! ```text
//! item:photo1#owners@user:bob            concrete subject
//! item:photo1#viewers@group:eng#members  subject set
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// A resource being protected, e.g. `item:photo1`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub namespace: String,
    pub id: String,
}

impl ResourceRef {
    pub fn new(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

impl FromStr for ResourceRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (namespace, id) = parse_object(s)?;
        Ok(Self { namespace, id })
    }
}

/// The subject side of a tuple.
///
/// A concrete subject names one principal (`user:bob`). A subject set
/// names every subject reachable from a resource through a relation
/// (`group:eng#members`), which is how group membership and other
/// indirections are expressed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SubjectRef {
    Concrete {
        namespace: String,
        id: String,
    },
    SubjectSet {
        namespace: String,
        id: String,
        relation: String,
    },
}

impl SubjectRef {
    pub fn concrete(namespace: impl Into<String>, id: impl Into<String>) -> Self {
        Self::Concrete {
            namespace: namespace.into(),
            id: id.into(),
        }
    }

    pub fn subject_set(
        namespace: impl Into<String>,
        id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self::SubjectSet {
            namespace: namespace.into(),
            id: id.into(),
            relation: relation.into(),
        }
    }

    /// Shorthand for a concrete subject in the `user` namespace.
    pub fn user(id: impl Into<String>) -> Self {
        Self::concrete("user", id)
    }

    pub fn namespace(&self) -> &str {
        match self {
            Self::Concrete { namespace, .. } | Self::SubjectSet { namespace, .. } => namespace,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Concrete { id, .. } | Self::SubjectSet { id, .. } => id,
        }
    }

    pub fn subject_relation(&self) -> Option<&str> {
        match self {
            Self::Concrete { .. } => None,
            Self::SubjectSet { relation, .. } => Some(relation),
        }
    }

    pub fn is_subject_set(&self) -> bool {
        matches!(self, Self::SubjectSet { .. })
    }

    /// The resource this reference points at, with any subject relation
    /// stripped. Traversal re-enters evaluation through this resource.
    pub fn as_resource(&self) -> ResourceRef {
        ResourceRef::new(self.namespace(), self.id())
    }
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Concrete { namespace, id } => write!(f, "{namespace}:{id}"),
            Self::SubjectSet {
                namespace,
                id,
                relation,
            } => write!(f, "{namespace}:{id}#{relation}"),
        }
    }
}

impl FromStr for SubjectRef {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('#') {
            None => {
                let (namespace, id) = parse_object(s)?;
                Ok(Self::Concrete { namespace, id })
            }
            Some((object, relation)) => {
                let (namespace, id) = parse_object(object)?;
                if relation.is_empty() || relation.contains(['#', '@', ':']) {
                    return Err(ModelError::InvalidTupleText(format!(
                        "invalid subject relation in '{s}'"
                    )));
                }
                Ok(Self::SubjectSet {
                    namespace,
                    id,
                    relation: relation.to_string(),
                })
            }
        }
    }
}

/// One relationship fact: `resource#relation@subject`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tuple {
    pub resource: ResourceRef,
    pub relation: String,
    pub subject: SubjectRef,
    pub created_at: DateTime<Utc>,
}

impl Tuple {
    pub fn new(resource: ResourceRef, relation: impl Into<String>, subject: SubjectRef) -> Self {
        Self {
            resource,
            relation: relation.into(),
            subject,
            created_at: Utc::now(),
        }
    }

    /// True when two tuples name the same relationship, ignoring the
    /// creation timestamp.
    pub fn same_relationship(&self, other: &Tuple) -> bool {
        self.resource == other.resource
            && self.relation == other.relation
            && self.subject == other.subject
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}@{}", self.resource, self.relation, self.subject)
    }
}

impl FromStr for Tuple {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (lhs, subject_text) = s.split_once('@').ok_or_else(|| {
            ModelError::InvalidTupleText(format!(
                "expected 'namespace:id#relation@subject', got '{s}'"
            ))
        })?;
        let (resource_text, relation) = lhs.split_once('#').ok_or_else(|| {
            ModelError::InvalidTupleText(format!("missing '#relation' before '@' in '{s}'"))
        })?;
        if relation.is_empty() || relation.contains([':', '#', '@']) {
            return Err(ModelError::InvalidTupleText(format!(
                "invalid relation in '{s}'"
            )));
        }
        let resource = resource_text.parse()?;
        let subject = subject_text.parse()?;
        Ok(Self::new(resource, relation, subject))
    }
}

/// Field filter for reading tuples back out of a store.
///
/// Every `None` field matches anything. `subject_relation` is doubly
/// optional: `None` ignores it, `Some(None)` matches only concrete
/// subjects, and `Some(Some(rel))` matches only subject sets with that
/// relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TupleFilter {
    pub resource_namespace: Option<String>,
    pub resource_id: Option<String>,
    pub relation: Option<String>,
    pub subject_namespace: Option<String>,
    pub subject_id: Option<String>,
    pub subject_relation: Option<Option<String>>,
}

impl TupleFilter {
    /// Filter matching every tuple on one resource relation, the shape
    /// evaluation uses when listing subjects.
    pub fn for_resource_relation(resource: &ResourceRef, relation: impl Into<String>) -> Self {
        Self {
            resource_namespace: Some(resource.namespace.clone()),
            resource_id: Some(resource.id.clone()),
            relation: Some(relation.into()),
            ..Self::default()
        }
    }

    pub fn with_resource_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.resource_namespace = Some(namespace.into());
        self
    }

    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.resource_id = Some(id.into());
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_subject_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.subject_namespace = Some(namespace.into());
        self
    }

    pub fn with_subject_id(mut self, id: impl Into<String>) -> Self {
        self.subject_id = Some(id.into());
        self
    }

    pub fn with_subject_relation(mut self, relation: Option<String>) -> Self {
        self.subject_relation = Some(relation);
        self
    }

    pub fn matches(&self, tuple: &Tuple) -> bool {
        if let Some(ns) = &self.resource_namespace {
            if tuple.resource.namespace != *ns {
                return false;
            }
        }
        if let Some(id) = &self.resource_id {
            if tuple.resource.id != *id {
                return false;
            }
        }
        if let Some(relation) = &self.relation {
            if tuple.relation != *relation {
                return false;
            }
        }
        if let Some(ns) = &self.subject_namespace {
            if tuple.subject.namespace() != ns {
                return false;
            }
        }
        if let Some(id) = &self.subject_id {
            if tuple.subject.id() != id {
                return false;
            }
        }
        if let Some(subject_relation) = &self.subject_relation {
            if tuple.subject.subject_relation() != subject_relation.as_deref() {
                return false;
            }
        }
        true
    }
}

/// Opaque token naming one consistent revision of the tuple store.
///
/// Writes return the token for the revision they produced, so a caller
/// can hand it back and be guaranteed to observe its own write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct SnapshotToken(u64);

impl SnapshotToken {
    pub fn new(revision: u64) -> Self {
        Self(revision)
    }

    pub fn revision(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn parse_object(s: &str) -> Result<(String, String), ModelError> {
    let (namespace, id) = s.split_once(':').ok_or_else(|| {
        ModelError::InvalidTupleText(format!("expected 'namespace:id', got '{s}'"))
    })?;
    if namespace.is_empty() || id.is_empty() {
        return Err(ModelError::InvalidTupleText(format!(
            "empty namespace or id in '{s}'"
        )));
    }
    if namespace.contains(['#', '@']) || id.contains([':', '#', '@']) {
        return Err(ModelError::InvalidTupleText(format!(
            "reserved character in '{s}'"
        )));
    }
    Ok((namespace.to_string(), id.to_string()))
}
