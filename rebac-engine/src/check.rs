//! Permission check evaluation.
//!
//! A check asks "does `subject` hold `permission` on `resource`". The
//! checker resolves the permission to its rewrite expression and walks
//! it: direct membership reads tuples, unions fan out concurrently and
//! stop at the first grant, subject sets and hierarchy traversal recurse
//! into further checks. Cycles resolve to false, depth is capped, and
//! identical sub-checks inside one request are answered from a memo
//! table.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use rebac_model::{PermissionExpr, ResourceRef, Schema, SnapshotToken, SubjectRef};
use rebac_store::TupleStore;
use tokio::time::timeout;
use tracing::debug;

use crate::config::EngineConfig;
use crate::context::{node_key, CheckContext};
use crate::engine::CheckResponse;
use crate::error::CheckError;

/// Evaluates permission checks against a schema and tuple store.
pub struct PermissionChecker {
    store: Arc<dyn TupleStore>,
    schema: Arc<Schema>,
    config: EngineConfig,
}

impl PermissionChecker {
    pub fn new(store: Arc<dyn TupleStore>, schema: Arc<Schema>, config: EngineConfig) -> Self {
        Self {
            store,
            schema,
            config,
        }
    }

    /// Answers one check.
    ///
    /// With `snapshot: None` the evaluation is pinned to the store head
    /// at entry, so a single request never straddles two revisions.
    /// Everything, including that snapshot resolution, runs under the
    /// configured timeout.
    pub async fn check(
        &self,
        subject: &SubjectRef,
        permission: &str,
        resource: &ResourceRef,
        snapshot: Option<SnapshotToken>,
    ) -> Result<CheckResponse, CheckError> {
        let evaluation = async {
            let snapshot = match snapshot {
                Some(token) => token,
                None => self.store.head_snapshot().await?,
            };
            let ctx = CheckContext::new(snapshot);
            let allowed = self.check_node(subject, permission, resource, ctx).await?;
            Ok(CheckResponse { allowed, snapshot })
        };
        match timeout(self.config.check_timeout(), evaluation).await {
            Ok(result) => result,
            Err(_) => Err(CheckError::Timeout {
                elapsed_ms: self.config.check_timeout_ms,
            }),
        }
    }

    /// One evaluation node: a (resource, name, subject) triple.
    ///
    /// Memoized results are returned as-is. Re-entering a node that is
    /// still in flight means the graph looped back into itself, and that
    /// branch resolves to false so the surrounding union can still grant
    /// through other operands.
    async fn check_node(
        &self,
        subject: &SubjectRef,
        name: &str,
        resource: &ResourceRef,
        ctx: CheckContext,
    ) -> Result<bool, CheckError> {
        Box::pin(async move {
            if ctx.depth >= self.config.max_depth {
                return Err(CheckError::DepthExceeded {
                    max_depth: self.config.max_depth,
                });
            }

            let key = node_key(resource, name, subject);
            if let Some(allowed) = ctx.memoized(&key) {
                debug!(node = %key, allowed, "memoized result");
                return Ok(allowed);
            }
            if !ctx.mark_visited(key.clone()) {
                debug!(node = %key, "cycle detected, resolving branch to false");
                return Ok(false);
            }

            let expr = self.schema.resolve_expr(&resource.namespace, name)?;
            let allowed = self.eval_expr(subject, resource, expr.as_ref(), &ctx).await?;
            ctx.memoize(key, allowed);
            Ok(allowed)
        })
        .await
    }

    async fn eval_expr(
        &self,
        subject: &SubjectRef,
        resource: &ResourceRef,
        expr: &PermissionExpr,
        ctx: &CheckContext,
    ) -> Result<bool, CheckError> {
        Box::pin(async move {
            match expr {
                PermissionExpr::Relation(relation) => {
                    self.eval_relation(subject, relation, resource, ctx).await
                }
                PermissionExpr::Union(children) => {
                    let branches: FuturesUnordered<_> = children
                        .iter()
                        .map(|child| self.eval_expr(subject, resource, child, ctx))
                        .collect();
                    drain_union(branches).await
                }
                PermissionExpr::Traverse {
                    relation,
                    permission,
                } => {
                    self.eval_traverse(subject, relation, permission, resource, ctx)
                        .await
                }
            }
        })
        .await
    }

    /// Direct membership: a matching subject on the relation's tuples,
    /// or membership through any subject set written there. The concrete
    /// scan runs first so a direct hit never waits on recursion.
    async fn eval_relation(
        &self,
        subject: &SubjectRef,
        relation: &str,
        resource: &ResourceRef,
        ctx: &CheckContext,
    ) -> Result<bool, CheckError> {
        let subjects = self
            .store
            .list_subjects(resource, relation, Some(ctx.snapshot))
            .await?;

        let mut sets: Vec<(ResourceRef, String)> = Vec::new();
        for candidate in &subjects {
            if candidate == subject {
                debug!(resource = %resource, relation, subject = %subject, "direct membership");
                return Ok(true);
            }
            if let SubjectRef::SubjectSet {
                relation: member_relation,
                ..
            } = candidate
            {
                sets.push((candidate.as_resource(), member_relation.clone()));
            }
        }
        if sets.is_empty() {
            return Ok(false);
        }

        let branches: FuturesUnordered<_> = sets
            .iter()
            .map(|(set_resource, member_relation)| {
                self.check_node(subject, member_relation, set_resource, ctx.descend())
            })
            .collect();
        drain_union(branches).await
    }

    /// Hierarchy traversal: follow the tupleset relation to related
    /// resources and check the target permission there. Only neighbors
    /// in the relation's declared concrete namespaces are followed;
    /// anything else written there is skipped.
    async fn eval_traverse(
        &self,
        subject: &SubjectRef,
        relation: &str,
        permission: &str,
        resource: &ResourceRef,
        ctx: &CheckContext,
    ) -> Result<bool, CheckError> {
        let relation_def = self.schema.relation(&resource.namespace, relation)?;
        let targets: HashSet<&str> = relation_def
            .subject_types
            .iter()
            .filter(|st| st.relation.is_none())
            .map(|st| st.namespace.as_str())
            .collect();
        if targets.is_empty() {
            return Ok(false);
        }

        let neighbors = self
            .store
            .list_subjects(resource, relation, Some(ctx.snapshot))
            .await?;
        let mut hops: Vec<ResourceRef> = Vec::new();
        for neighbor in neighbors {
            if neighbor.is_subject_set() || !targets.contains(neighbor.namespace()) {
                debug!(neighbor = %neighbor, relation, "skipping non-traversable neighbor");
                continue;
            }
            hops.push(neighbor.as_resource());
        }
        if hops.is_empty() {
            return Ok(false);
        }

        let branches: FuturesUnordered<_> = hops
            .iter()
            .map(|target| self.check_node(subject, permission, target, ctx.descend()))
            .collect();
        drain_union(branches).await
    }
}

/// Resolves a union of branches. The first `true` wins and the early
/// return drops the set, cancelling every branch still in flight. A
/// branch error is deferred and reported only if no other branch grants,
/// so one failing read cannot veto an access another tuple proves.
async fn drain_union<F>(mut branches: FuturesUnordered<F>) -> Result<bool, CheckError>
where
    F: Future<Output = Result<bool, CheckError>>,
{
    let mut deferred: Option<CheckError> = None;
    while let Some(result) = branches.next().await {
        match result {
            Ok(true) => return Ok(true),
            Ok(false) => {}
            Err(err) => {
                if deferred.is_none() {
                    deferred = Some(err);
                }
            }
        }
    }
    match deferred {
        Some(err) => Err(err),
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rebac_model::{ModelError, NamespaceDef, Tuple};
    use rebac_store::MemoryTupleStore;

    fn checker(store: Arc<MemoryTupleStore>) -> PermissionChecker {
        PermissionChecker::new(
            store,
            Arc::new(Schema::catalog_schema()),
            EngineConfig::default(),
        )
    }

    fn tuple(text: &str) -> Tuple {
        text.parse().unwrap()
    }

    #[tokio::test]
    async fn test_direct_membership_grants() {
        let store = Arc::new(MemoryTupleStore::new());
        store.write(tuple("item:i1#owners@user:bob"));
        let checker = checker(store);

        let resource = ResourceRef::new("item", "i1");
        let allowed = checker
            .check(&SubjectRef::user("bob"), "delete", &resource, None)
            .await
            .unwrap()
            .allowed;
        assert!(allowed);

        let denied = checker
            .check(&SubjectRef::user("carol"), "delete", &resource, None)
            .await
            .unwrap()
            .allowed;
        assert!(!denied);
    }

    #[tokio::test]
    async fn test_membership_through_subject_set() {
        let store = Arc::new(MemoryTupleStore::new());
        store.write(tuple("item:i1#viewers@group:g1#members"));
        store.write(tuple("group:g1#members@user:dave"));
        let checker = checker(store);

        let resource = ResourceRef::new("item", "i1");
        let allowed = checker
            .check(&SubjectRef::user("dave"), "view", &resource, None)
            .await
            .unwrap()
            .allowed;
        assert!(allowed);
    }

    #[tokio::test]
    async fn test_empty_relation_is_false_not_error() {
        let store = Arc::new(MemoryTupleStore::new());
        let checker = checker(store);

        let resource = ResourceRef::new("item", "lonely");
        let response = checker
            .check(&SubjectRef::user("bob"), "view", &resource, None)
            .await
            .unwrap();
        assert!(!response.allowed);
    }

    #[tokio::test]
    async fn test_unknown_permission_is_an_error() {
        let store = Arc::new(MemoryTupleStore::new());
        let checker = checker(store);

        let resource = ResourceRef::new("item", "i1");
        let err = checker
            .check(&SubjectRef::user("bob"), "publish", &resource, None)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_traversal_over_undeclared_relation_is_an_error() {
        // Built outside AuthorizationEngine, so nothing has validated the
        // schema: "view" walks a "parents" relation that was never declared.
        let schema = Schema::new()
            .with_namespace(NamespaceDef::new("user"))
            .with_namespace(
                NamespaceDef::new("doc")
                    .with_permission("view", PermissionExpr::traverse("parents", "view")),
            );
        let store = Arc::new(MemoryTupleStore::new());
        let checker = PermissionChecker::new(store, Arc::new(schema), EngineConfig::default());

        let err = checker
            .check(
                &SubjectRef::user("bob"),
                "view",
                &ResourceRef::new("doc", "d1"),
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            CheckError::Model(ModelError::RelationNotFound { .. })
        ));
    }
}
