use std::collections::BTreeSet;
use std::sync::Arc;

use futures::future::join_all;
use rebac_model::{ResourceRef, Schema, SnapshotToken, SubjectRef, Tuple, TupleFilter};
use rebac_store::TupleStore;
use serde::{Deserialize, Serialize};
use tokio::time::timeout;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::check::PermissionChecker;
use crate::config::EngineConfig;
use crate::error::CheckError;
use crate::expand::{SubjectExpander, SubjectTree};

/// One check in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub subject: SubjectRef,
    pub permission: String,
    pub resource: ResourceRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snapshot: Option<SnapshotToken>,
}

/// Result of a check, with the snapshot it was evaluated at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub snapshot: SnapshotToken,
}

/// Facade over checking, expansion, and tuple reads.
pub struct AuthorizationEngine {
    /// Storage for relationship tuples
    store: Arc<dyn TupleStore>,

    /// Permission schema evaluation runs against
    schema: Arc<Schema>,

    /// Checker answering allow/deny questions
    checker: Arc<PermissionChecker>,

    /// Expander listing who holds a relation or permission
    expander: Arc<SubjectExpander>,

    /// Evaluation limits
    config: EngineConfig,
}

impl AuthorizationEngine {
    /// Builds an engine over a store and a validated schema.
    pub fn new(store: Arc<dyn TupleStore>, schema: Schema) -> Result<Self, CheckError> {
        schema.validate()?;
        let schema = Arc::new(schema);
        let config = EngineConfig::default();
        Ok(Self {
            checker: Arc::new(PermissionChecker::new(
                store.clone(),
                schema.clone(),
                config.clone(),
            )),
            expander: Arc::new(SubjectExpander::new(
                store.clone(),
                schema.clone(),
                config.clone(),
            )),
            store,
            schema,
            config,
        })
    }

    /// Replaces the evaluation limits.
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self.rebuild();
        self
    }

    fn rebuild(&mut self) {
        self.checker = Arc::new(PermissionChecker::new(
            self.store.clone(),
            self.schema.clone(),
            self.config.clone(),
        ));
        self.expander = Arc::new(SubjectExpander::new(
            self.store.clone(),
            self.schema.clone(),
            self.config.clone(),
        ));
    }

    // =============================================================================
    // Core Authorization Operations
    // =============================================================================

    /// Checks whether a subject holds a permission on a resource at the
    /// latest committed revision.
    pub async fn check(
        &self,
        subject: &SubjectRef,
        permission: &str,
        resource: &ResourceRef,
    ) -> Result<CheckResponse, CheckError> {
        self.check_at(subject, permission, resource, None).await
    }

    /// Checks at an explicit snapshot. Passing the token returned by a
    /// write guarantees the check observes that write.
    pub async fn check_at(
        &self,
        subject: &SubjectRef,
        permission: &str,
        resource: &ResourceRef,
        snapshot: Option<SnapshotToken>,
    ) -> Result<CheckResponse, CheckError> {
        let check_id = Uuid::new_v4();
        debug!(%check_id, subject = %subject, permission, resource = %resource, "check started");
        let result = self
            .checker
            .check(subject, permission, resource, snapshot)
            .await;
        match &result {
            Ok(response) => {
                debug!(
                    %check_id,
                    allowed = response.allowed,
                    snapshot = %response.snapshot,
                    "check finished"
                );
            }
            Err(err) => warn!(%check_id, error = %err, "check failed"),
        }
        result
    }

    /// Runs a batch of checks concurrently and returns one result per
    /// request, in order. Requests without an explicit snapshot share
    /// one head token resolved at entry, so the batch reads a single
    /// consistent view; if that resolution fails or runs out of budget,
    /// each request resolves its own snapshot under its own timeout.
    /// Each request succeeds or fails on its own.
    pub async fn batch_check(
        &self,
        requests: Vec<CheckRequest>,
    ) -> Vec<Result<CheckResponse, CheckError>> {
        let head = timeout(self.config.check_timeout(), self.store.head_snapshot())
            .await
            .ok()
            .and_then(|resolved| resolved.ok());
        let checks = requests.into_iter().map(|request| {
            let snapshot = request.snapshot.or(head);
            async move {
                self.checker
                    .check(
                        &request.subject,
                        &request.permission,
                        &request.resource,
                        snapshot,
                    )
                    .await
            }
        });
        join_all(checks).await
    }

    // =============================================================================
    // Expansion and Reads
    // =============================================================================

    /// Expands who holds a relation or permission on a resource.
    pub async fn expand(
        &self,
        resource: &ResourceRef,
        name: &str,
        snapshot: Option<SnapshotToken>,
    ) -> Result<SubjectTree, CheckError> {
        debug!(resource = %resource, name, "expanding subjects");
        self.expander.expand(resource, name, snapshot).await
    }

    /// Reads tuples matching a filter.
    pub async fn read_tuples(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<Tuple>, CheckError> {
        Ok(self.store.read_tuples(filter, snapshot).await?)
    }

    /// Resources in one namespace the subject holds a permission on.
    /// The namespace must exist in the schema.
    ///
    /// Discovery is tuple-driven: every resource id mentioned in the
    /// namespace is a candidate, and candidates are checked concurrently
    /// at one pinned snapshot. Suited to development-scale stores; large
    /// deployments want a purpose-built reverse index.
    pub async fn list_resources(
        &self,
        subject: &SubjectRef,
        permission: &str,
        namespace: &str,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<ResourceRef>, CheckError> {
        self.schema.namespace(namespace)?;
        let snapshot = match snapshot {
            Some(token) => token,
            None => timeout(self.config.check_timeout(), self.store.head_snapshot())
                .await
                .map_err(|_| CheckError::Timeout {
                    elapsed_ms: self.config.check_timeout_ms,
                })??,
        };
        let filter = TupleFilter::default().with_resource_namespace(namespace);
        let tuples = self.store.read_tuples(&filter, Some(snapshot)).await?;
        let candidates: BTreeSet<String> = tuples.into_iter().map(|t| t.resource.id).collect();
        debug!(
            subject = %subject,
            permission,
            namespace,
            candidates = candidates.len(),
            "listing resources"
        );

        let checks = candidates.iter().map(|id| {
            let resource = ResourceRef::new(namespace, id.clone());
            async move {
                let response = self
                    .checker
                    .check(subject, permission, &resource, Some(snapshot))
                    .await?;
                Ok::<_, CheckError>((resource, response.allowed))
            }
        });

        let mut allowed = Vec::new();
        for result in join_all(checks).await {
            let (resource, granted) = result?;
            if granted {
                allowed.push(resource);
            }
        }
        Ok(allowed)
    }

    // =============================================================================
    // Schema Management
    // =============================================================================

    /// Current schema.
    pub fn get_schema(&self) -> Arc<Schema> {
        self.schema.clone()
    }

    /// Swaps in a new schema after validating it.
    pub fn update_schema(&mut self, schema: Schema) -> Result<(), CheckError> {
        schema.validate()?;
        self.schema = Arc::new(schema);
        self.rebuild();
        Ok(())
    }
}
