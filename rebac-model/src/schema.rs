//! Permission schema: namespaces, relations, and rewrite expressions.
//!
//! A schema declares which namespaces exist, which relations each
//! namespace stores tuples under, and how permissions rewrite into
//! relations. Evaluation is driven entirely by this declaration, so a
//! schema can be built in code or loaded from JSON without touching the
//! engine.

use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::fmt;

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::ModelError;

/// Rewrite expression a permission evaluates through.
///
/// Serialized with the variant as the key:
///
/// ```json
/// { "union": [ { "relation": "owners" },
///              { "traverse": { "relation": "parents", "permission": "view" } } ] }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionExpr {
    /// Direct membership in a relation on the same resource.
    Relation(String),
    /// Grants when any child grants. Empty unions never grant.
    Union(Vec<PermissionExpr>),
    /// Follows tuples of `relation` to related resources and checks
    /// `permission` there, which is how hierarchy inheritance works.
    Traverse { relation: String, permission: String },
}

impl PermissionExpr {
    pub fn relation(name: impl Into<String>) -> Self {
        Self::Relation(name.into())
    }

    pub fn union(children: impl IntoIterator<Item = PermissionExpr>) -> Self {
        Self::Union(children.into_iter().collect())
    }

    pub fn traverse(relation: impl Into<String>, permission: impl Into<String>) -> Self {
        Self::Traverse {
            relation: relation.into(),
            permission: permission.into(),
        }
    }
}

/// A subject type a relation accepts: a plain namespace (`user`) or a
/// subject set shape (`group#members`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTypeRef {
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
}

impl SubjectTypeRef {
    pub fn namespace(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: None,
        }
    }

    pub fn subject_set(namespace: impl Into<String>, relation: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            relation: Some(relation.into()),
        }
    }
}

impl fmt::Display for SubjectTypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.relation {
            None => write!(f, "{}", self.namespace),
            Some(relation) => write!(f, "{}#{}", self.namespace, relation),
        }
    }
}

/// A relation tuples can be written under, with the subject types it
/// accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDef {
    pub name: String,
    pub subject_types: Vec<SubjectTypeRef>,
}

/// A named permission and the expression it rewrites into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDef {
    pub name: String,
    pub expr: PermissionExpr,
}

/// One namespace: its relations and permissions, keyed by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceDef {
    pub name: String,
    #[serde(default)]
    pub relations: BTreeMap<String, RelationDef>,
    #[serde(default)]
    pub permissions: BTreeMap<String, PermissionDef>,
}

impl NamespaceDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: BTreeMap::new(),
            permissions: BTreeMap::new(),
        }
    }

    pub fn with_relation(
        mut self,
        name: impl Into<String>,
        subject_types: impl IntoIterator<Item = SubjectTypeRef>,
    ) -> Self {
        let name = name.into();
        self.relations.insert(
            name.clone(),
            RelationDef {
                name,
                subject_types: subject_types.into_iter().collect(),
            },
        );
        self
    }

    pub fn with_permission(mut self, name: impl Into<String>, expr: PermissionExpr) -> Self {
        let name = name.into();
        self.permissions
            .insert(name.clone(), PermissionDef { name, expr });
        self
    }
}

/// The full permission schema evaluation runs against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    pub namespaces: BTreeMap<String, NamespaceDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, namespace: NamespaceDef) -> Self {
        self.namespaces.insert(namespace.name.clone(), namespace);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, ModelError> {
        serde_json::from_str(json).map_err(|e| ModelError::InvalidSchema(e.to_string()))
    }

    pub fn namespace(&self, namespace: &str) -> Result<&NamespaceDef, ModelError> {
        self.namespaces
            .get(namespace)
            .ok_or_else(|| ModelError::NamespaceNotFound(namespace.to_string()))
    }

    pub fn relation(&self, namespace: &str, relation: &str) -> Result<&RelationDef, ModelError> {
        self.namespace(namespace)?
            .relations
            .get(relation)
            .ok_or_else(|| ModelError::RelationNotFound {
                namespace: namespace.to_string(),
                relation: relation.to_string(),
            })
    }

    /// Resolves a permission or relation name to the expression to
    /// evaluate. Bare relation names behave as a permission that checks
    /// the relation directly, so `check(..., "owners", ...)` works
    /// without declaring a wrapper permission.
    pub fn resolve_expr(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Cow<'_, PermissionExpr>, ModelError> {
        let ns = self.namespace(namespace)?;
        if let Some(permission) = ns.permissions.get(name) {
            return Ok(Cow::Borrowed(&permission.expr));
        }
        if ns.relations.contains_key(name) {
            return Ok(Cow::Owned(PermissionExpr::Relation(name.to_string())));
        }
        Err(ModelError::PermissionNotFound {
            namespace: namespace.to_string(),
            permission: name.to_string(),
        })
    }

    /// Checks referential integrity: map keys match definition names,
    /// every referenced namespace, relation, and permission exists, and
    /// traversals land on namespaces that can answer the target
    /// permission. Also warns about permissions that can never grant.
    pub fn validate(&self) -> Result<(), ModelError> {
        for (ns_key, ns) in &self.namespaces {
            if *ns_key != ns.name {
                return Err(ModelError::InvalidSchema(format!(
                    "namespace key '{ns_key}' does not match name '{}'",
                    ns.name
                )));
            }
            for (rel_key, rel) in &ns.relations {
                if *rel_key != rel.name {
                    return Err(ModelError::InvalidSchema(format!(
                        "relation key '{rel_key}' in '{ns_key}' does not match name '{}'",
                        rel.name
                    )));
                }
                for subject_type in &rel.subject_types {
                    self.check_subject_type(ns_key, rel_key, subject_type)?;
                }
            }
            for (perm_key, perm) in &ns.permissions {
                if *perm_key != perm.name {
                    return Err(ModelError::InvalidSchema(format!(
                        "permission key '{perm_key}' in '{ns_key}' does not match name '{}'",
                        perm.name
                    )));
                }
                if ns.relations.contains_key(perm_key) {
                    return Err(ModelError::InvalidSchema(format!(
                        "'{ns_key}#{perm_key}' is declared as both a relation and a permission"
                    )));
                }
                self.check_expr(ns, perm_key, &perm.expr)?;
            }
        }
        self.warn_unsatisfiable_permissions();
        Ok(())
    }

    fn check_subject_type(
        &self,
        ns_key: &str,
        rel_key: &str,
        subject_type: &SubjectTypeRef,
    ) -> Result<(), ModelError> {
        let target = self.namespaces.get(&subject_type.namespace).ok_or_else(|| {
            ModelError::InvalidSchema(format!(
                "relation '{ns_key}#{rel_key}' accepts unknown namespace '{}'",
                subject_type.namespace
            ))
        })?;
        if let Some(sub_rel) = &subject_type.relation {
            if !target.relations.contains_key(sub_rel) {
                return Err(ModelError::InvalidSchema(format!(
                    "relation '{ns_key}#{rel_key}' accepts '{subject_type}', but '{}' has no relation '{sub_rel}'",
                    subject_type.namespace
                )));
            }
        }
        Ok(())
    }

    fn check_expr(
        &self,
        ns: &NamespaceDef,
        perm_key: &str,
        expr: &PermissionExpr,
    ) -> Result<(), ModelError> {
        match expr {
            PermissionExpr::Relation(relation) => {
                if !ns.relations.contains_key(relation) {
                    return Err(ModelError::InvalidSchema(format!(
                        "permission '{}#{perm_key}' references unknown relation '{relation}'",
                        ns.name
                    )));
                }
            }
            PermissionExpr::Union(children) => {
                for child in children {
                    self.check_expr(ns, perm_key, child)?;
                }
            }
            PermissionExpr::Traverse {
                relation,
                permission,
            } => {
                let rel = ns.relations.get(relation).ok_or_else(|| {
                    ModelError::InvalidSchema(format!(
                        "permission '{}#{perm_key}' traverses unknown relation '{relation}'",
                        ns.name
                    ))
                })?;
                for subject_type in &rel.subject_types {
                    // Subject-set shaped types are not traversal targets;
                    // only concrete target namespaces must answer the
                    // permission.
                    if subject_type.relation.is_some() {
                        continue;
                    }
                    if self.resolve_expr(&subject_type.namespace, permission).is_err() {
                        return Err(ModelError::InvalidSchema(format!(
                            "permission '{}#{perm_key}' traverses '{relation}' into '{}', which has no permission or relation '{permission}'",
                            ns.name, subject_type.namespace
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// A permission whose every expansion path recurses through other
    /// permissions, with no relation leaf anywhere, can never evaluate
    /// true. That is always a schema bug, so surface it loudly.
    fn warn_unsatisfiable_permissions(&self) {
        let mut graph: DiGraph<(), ()> = DiGraph::new();
        let mut nodes: BTreeMap<(&str, &str), NodeIndex> = BTreeMap::new();
        for (ns_key, ns) in &self.namespaces {
            for perm_key in ns.permissions.keys() {
                nodes.insert((ns_key.as_str(), perm_key.as_str()), graph.add_node(()));
            }
        }

        let mut seeds = Vec::new();
        for (ns_key, ns) in &self.namespaces {
            for (perm_key, perm) in &ns.permissions {
                let Some(&from) = nodes.get(&(ns_key.as_str(), perm_key.as_str())) else {
                    continue;
                };
                let mut direct = false;
                self.collect_grant_edges(ns, &perm.expr, from, &mut direct, &nodes, &mut graph);
                if direct {
                    seeds.push(from);
                }
            }
        }

        let mut satisfiable: HashSet<NodeIndex> = HashSet::new();
        let mut stack = seeds;
        while let Some(node) = stack.pop() {
            if satisfiable.insert(node) {
                stack.extend(graph.neighbors_directed(node, Direction::Incoming));
            }
        }

        for ((ns_key, perm_key), node) in &nodes {
            if !satisfiable.contains(node) {
                warn!(
                    namespace = %ns_key,
                    permission = %perm_key,
                    "permission has no direct grant path and can never evaluate true"
                );
            }
        }
    }

    fn collect_grant_edges(
        &self,
        ns: &NamespaceDef,
        expr: &PermissionExpr,
        from: NodeIndex,
        direct: &mut bool,
        nodes: &BTreeMap<(&str, &str), NodeIndex>,
        graph: &mut DiGraph<(), ()>,
    ) {
        match expr {
            PermissionExpr::Relation(_) => *direct = true,
            PermissionExpr::Union(children) => {
                for child in children {
                    self.collect_grant_edges(ns, child, from, direct, nodes, graph);
                }
            }
            PermissionExpr::Traverse {
                relation,
                permission,
            } => {
                let Some(rel) = ns.relations.get(relation) else {
                    return;
                };
                for subject_type in &rel.subject_types {
                    if subject_type.relation.is_some() {
                        continue;
                    }
                    match nodes.get(&(subject_type.namespace.as_str(), permission.as_str())) {
                        Some(&to) => {
                            graph.add_edge(from, to, ());
                        }
                        // A bare relation target grants directly.
                        None => *direct = true,
                    }
                }
            }
        }
    }

    /// Bundled schema for the resource catalog this engine ships with:
    /// users, groups, items, and nestable collections with
    /// view/edit/delete permissions inherited down the hierarchy.
    pub fn catalog_schema() -> Self {
        Self::new()
            .with_namespace(NamespaceDef::new("user"))
            .with_namespace(
                NamespaceDef::new("group").with_relation("members", member_subject_types()),
            )
            .with_namespace(catalog_entry("item"))
            .with_namespace(catalog_entry("collection"))
    }
}

fn member_subject_types() -> Vec<SubjectTypeRef> {
    vec![
        SubjectTypeRef::namespace("user"),
        SubjectTypeRef::subject_set("group", "members"),
    ]
}

fn catalog_entry(name: &str) -> NamespaceDef {
    NamespaceDef::new(name)
        .with_relation("owners", member_subject_types())
        .with_relation("editors", member_subject_types())
        .with_relation("viewers", member_subject_types())
        .with_relation("parents", [SubjectTypeRef::namespace("collection")])
        .with_permission(
            "view",
            PermissionExpr::union([
                PermissionExpr::relation("viewers"),
                PermissionExpr::relation("editors"),
                PermissionExpr::relation("owners"),
                PermissionExpr::traverse("parents", "view"),
            ]),
        )
        .with_permission(
            "edit",
            PermissionExpr::union([
                PermissionExpr::relation("editors"),
                PermissionExpr::relation("owners"),
                PermissionExpr::traverse("parents", "edit"),
            ]),
        )
        .with_permission("delete", PermissionExpr::relation("owners"))
}
