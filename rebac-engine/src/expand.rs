//! Expansion of a relation or permission into the tree of subjects it
//! reaches.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use rebac_model::{PermissionExpr, ResourceRef, Schema, SnapshotToken, SubjectRef};
use rebac_store::TupleStore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::EngineConfig;
use crate::error::CheckError;

/// Node in an expansion tree: who holds `name` on `resource`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectTree {
    pub resource: ResourceRef,
    pub name: String,
    /// Concrete subjects written directly on this node's relations.
    pub subjects: Vec<SubjectRef>,
    /// Indirections this node unions in: subject sets and traversals.
    pub children: Vec<SubjectTree>,
    /// True when expansion stopped here because the node was already
    /// expanded elsewhere in the tree or the depth cap was reached.
    pub truncated: bool,
}

impl SubjectTree {
    fn new(resource: &ResourceRef, name: &str) -> Self {
        Self {
            resource: resource.clone(),
            name: name.to_string(),
            subjects: Vec::new(),
            children: Vec::new(),
            truncated: false,
        }
    }

    /// Flattens the tree into the set of concrete subjects it contains.
    pub fn concrete_subjects(&self) -> BTreeSet<SubjectRef> {
        let mut out = BTreeSet::new();
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut BTreeSet<SubjectRef>) {
        for subject in &self.subjects {
            out.insert(subject.clone());
        }
        for child in &self.children {
            child.collect_into(out);
        }
    }
}

/// Expands who has a relation or permission on a resource.
///
/// Unlike checks, expansion never fails on cycles or depth: it marks the
/// node truncated and keeps the rest of the tree usable.
pub struct SubjectExpander {
    store: Arc<dyn TupleStore>,
    schema: Arc<Schema>,
    config: EngineConfig,
}

impl SubjectExpander {
    pub fn new(store: Arc<dyn TupleStore>, schema: Arc<Schema>, config: EngineConfig) -> Self {
        Self {
            store,
            schema,
            config,
        }
    }

    pub async fn expand(
        &self,
        resource: &ResourceRef,
        name: &str,
        snapshot: Option<SnapshotToken>,
    ) -> Result<SubjectTree, CheckError> {
        let snapshot = match snapshot {
            Some(token) => token,
            None => self.store.head_snapshot().await?,
        };
        let mut visited = HashSet::new();
        self.expand_node(resource, name, snapshot, &mut visited, 0)
            .await
    }

    async fn expand_node(
        &self,
        resource: &ResourceRef,
        name: &str,
        snapshot: SnapshotToken,
        visited: &mut HashSet<String>,
        depth: u32,
    ) -> Result<SubjectTree, CheckError> {
        Box::pin(async move {
            let mut node = SubjectTree::new(resource, name);
            if depth >= self.config.expand_max_depth {
                debug!(resource = %resource, name, "expansion depth cap reached");
                node.truncated = true;
                return Ok(node);
            }
            let key = format!("{resource}#{name}");
            if !visited.insert(key) {
                node.truncated = true;
                return Ok(node);
            }
            let expr = self.schema.resolve_expr(&resource.namespace, name)?;
            self.expand_expr(&mut node, expr.as_ref(), snapshot, visited, depth)
                .await?;
            Ok(node)
        })
        .await
    }

    async fn expand_expr(
        &self,
        node: &mut SubjectTree,
        expr: &PermissionExpr,
        snapshot: SnapshotToken,
        visited: &mut HashSet<String>,
        depth: u32,
    ) -> Result<(), CheckError> {
        Box::pin(async move {
            match expr {
                PermissionExpr::Relation(relation) => {
                    let subjects = self
                        .store
                        .list_subjects(&node.resource, relation, Some(snapshot))
                        .await?;
                    for subject in subjects {
                        if let SubjectRef::SubjectSet {
                            relation: member_relation,
                            ..
                        } = &subject
                        {
                            let member_relation = member_relation.clone();
                            let set_resource = subject.as_resource();
                            let child = self
                                .expand_node(
                                    &set_resource,
                                    &member_relation,
                                    snapshot,
                                    visited,
                                    depth + 1,
                                )
                                .await?;
                            node.children.push(child);
                        } else {
                            node.subjects.push(subject);
                        }
                    }
                }
                PermissionExpr::Union(parts) => {
                    for part in parts {
                        self.expand_expr(node, part, snapshot, visited, depth).await?;
                    }
                }
                PermissionExpr::Traverse {
                    relation,
                    permission,
                } => {
                    let relation_def = self.schema.relation(&node.resource.namespace, relation)?;
                    let targets: HashSet<&str> = relation_def
                        .subject_types
                        .iter()
                        .filter(|st| st.relation.is_none())
                        .map(|st| st.namespace.as_str())
                        .collect();
                    let neighbors = self
                        .store
                        .list_subjects(&node.resource, relation, Some(snapshot))
                        .await?;
                    for neighbor in neighbors {
                        if neighbor.is_subject_set() || !targets.contains(neighbor.namespace()) {
                            continue;
                        }
                        let hop = neighbor.as_resource();
                        let child = self
                            .expand_node(&hop, permission, snapshot, visited, depth + 1)
                            .await?;
                        node.children.push(child);
                    }
                }
            }
            Ok(())
        })
        .await
    }
}
