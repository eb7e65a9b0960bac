use async_trait::async_trait;
use rebac_model::{ResourceRef, SnapshotToken, SubjectRef, Tuple, TupleFilter};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Read interface over relationship tuples.
///
/// `snapshot` pins the read to one committed revision; `None` reads the
/// latest. Requesting a revision the store has never committed is an
/// error, so a token can never silently fall back to a different view.
#[async_trait]
pub trait TupleStore: Send + Sync {
    /// Subjects directly related to a resource through one relation.
    async fn list_subjects(
        &self,
        resource: &ResourceRef,
        relation: &str,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<SubjectRef>, StoreError>;

    /// Tuples matching the given filter. `None` fields act as wildcards.
    async fn read_tuples(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<Tuple>, StoreError>;

    /// Token for the latest committed revision. Evaluation resolves
    /// `None` through this once per request so one check never straddles
    /// two revisions.
    async fn head_snapshot(&self) -> Result<SnapshotToken, StoreError>;
}

/// Batch of tuple writes and deletes applied as one revision.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WriteRequest {
    pub writes: Vec<Tuple>,
    pub deletes: Vec<Tuple>,
}

impl WriteRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(mut self, tuple: Tuple) -> Self {
        self.writes.push(tuple);
        self
    }

    pub fn delete(mut self, tuple: Tuple) -> Self {
        self.deletes.push(tuple);
        self
    }
}
