//! Snapshot-isolated in-memory tuple store.

use async_trait::async_trait;
use parking_lot::RwLock;
use rebac_model::{ResourceRef, SnapshotToken, SubjectRef, Tuple, TupleFilter};
use tracing::debug;

use crate::error::StoreError;
use crate::store::{TupleStore, WriteRequest};

#[derive(Debug, Clone)]
struct TupleRecord {
    tuple: Tuple,
    created_rev: u64,
    deleted_rev: Option<u64>,
}

impl TupleRecord {
    fn visible_at(&self, revision: u64) -> bool {
        self.created_rev <= revision && self.deleted_rev.map_or(true, |d| d > revision)
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    records: Vec<TupleRecord>,
    head: u64,
}

/// In-memory tuple store with snapshot isolation.
///
/// Revisions are one monotonically increasing counter. Each record keeps
/// the revision interval it was live for, so a read at an old token
/// reconstructs exactly the view that revision committed, and reads
/// pinned to a token are repeatable while writes keep landing.
#[derive(Debug, Default)]
pub struct MemoryTupleStore {
    inner: RwLock<StoreInner>,
}

impl MemoryTupleStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes one tuple and returns the token for the revision it
    /// committed at. Re-writing a live relationship is a no-op that
    /// returns the current head token.
    pub fn write(&self, tuple: Tuple) -> SnapshotToken {
        let mut inner = self.inner.write();
        let head = inner.head;
        if Self::find_visible(&inner, &tuple, head).is_some() {
            return SnapshotToken::new(head);
        }
        inner.head += 1;
        let committed = inner.head;
        debug!(tuple = %tuple, revision = committed, "writing tuple");
        inner.records.push(TupleRecord {
            tuple,
            created_rev: committed,
            deleted_rev: None,
        });
        SnapshotToken::new(committed)
    }

    /// Deletes one relationship. Deleting something that is not there is
    /// a no-op that returns the current head token.
    pub fn delete(&self, tuple: &Tuple) -> SnapshotToken {
        let mut inner = self.inner.write();
        let head = inner.head;
        match Self::find_visible(&inner, tuple, head) {
            None => SnapshotToken::new(head),
            Some(idx) => {
                inner.head += 1;
                let committed = inner.head;
                debug!(tuple = %tuple, revision = committed, "deleting tuple");
                inner.records[idx].deleted_rev = Some(committed);
                SnapshotToken::new(committed)
            }
        }
    }

    /// Applies a batch as one revision: a reader sees all of it or none
    /// of it. Deletes are applied after writes, so deleting a
    /// relationship written in the same request removes it.
    pub fn apply(&self, request: WriteRequest) -> SnapshotToken {
        let mut inner = self.inner.write();
        let next = inner.head + 1;
        let mut changed = false;
        for tuple in request.writes {
            if Self::find_visible(&inner, &tuple, next).is_none() {
                inner.records.push(TupleRecord {
                    tuple,
                    created_rev: next,
                    deleted_rev: None,
                });
                changed = true;
            }
        }
        for tuple in &request.deletes {
            if let Some(idx) = Self::find_visible(&inner, tuple, next) {
                inner.records[idx].deleted_rev = Some(next);
                changed = true;
            }
        }
        if changed {
            inner.head = next;
            debug!(revision = next, "applied write batch");
        }
        SnapshotToken::new(inner.head)
    }

    /// Token for the latest committed revision.
    pub fn head(&self) -> SnapshotToken {
        SnapshotToken::new(self.inner.read().head)
    }

    fn find_visible(inner: &StoreInner, tuple: &Tuple, revision: u64) -> Option<usize> {
        inner
            .records
            .iter()
            .position(|r| r.visible_at(revision) && r.tuple.same_relationship(tuple))
    }

    fn resolve_revision(
        inner: &StoreInner,
        snapshot: Option<SnapshotToken>,
    ) -> Result<u64, StoreError> {
        match snapshot {
            None => Ok(inner.head),
            Some(token) if token.revision() > inner.head => {
                Err(StoreError::UnknownSnapshot(token))
            }
            Some(token) => Ok(token.revision()),
        }
    }
}

#[async_trait]
impl TupleStore for MemoryTupleStore {
    async fn list_subjects(
        &self,
        resource: &ResourceRef,
        relation: &str,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<SubjectRef>, StoreError> {
        let inner = self.inner.read();
        let revision = Self::resolve_revision(&inner, snapshot)?;
        Ok(inner
            .records
            .iter()
            .filter(|r| {
                r.visible_at(revision)
                    && r.tuple.resource == *resource
                    && r.tuple.relation == relation
            })
            .map(|r| r.tuple.subject.clone())
            .collect())
    }

    async fn read_tuples(
        &self,
        filter: &TupleFilter,
        snapshot: Option<SnapshotToken>,
    ) -> Result<Vec<Tuple>, StoreError> {
        let inner = self.inner.read();
        let revision = Self::resolve_revision(&inner, snapshot)?;
        Ok(inner
            .records
            .iter()
            .filter(|r| r.visible_at(revision) && filter.matches(&r.tuple))
            .map(|r| r.tuple.clone())
            .collect())
    }

    async fn head_snapshot(&self) -> Result<SnapshotToken, StoreError> {
        Ok(self.head())
    }
}
