//! Per-request evaluation state.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use rebac_model::{ResourceRef, SnapshotToken, SubjectRef};

type Hasher = ahash::RandomState;

/// Shared state for one check request.
///
/// Clones share the visited set and the memo table, so parallel branches
/// see each other's progress. `depth` is per clone: each branch tracks
/// its own distance from the root.
#[derive(Debug, Clone)]
pub(crate) struct CheckContext {
    visited: Arc<DashSet<String, Hasher>>,
    memo: Arc<DashMap<String, bool, Hasher>>,
    pub(crate) depth: u32,
    pub(crate) snapshot: SnapshotToken,
}

impl CheckContext {
    pub(crate) fn new(snapshot: SnapshotToken) -> Self {
        Self {
            visited: Arc::new(DashSet::with_hasher(Hasher::default())),
            memo: Arc::new(DashMap::with_hasher(Hasher::default())),
            depth: 0,
            snapshot,
        }
    }

    /// Context for a branch one indirection deeper.
    pub(crate) fn descend(&self) -> Self {
        let mut child = self.clone();
        child.depth += 1;
        child
    }

    pub(crate) fn memoized(&self, key: &str) -> Option<bool> {
        self.memo.get(key).map(|entry| *entry)
    }

    pub(crate) fn memoize(&self, key: String, allowed: bool) {
        self.memo.insert(key, allowed);
    }

    /// Marks a node as in flight. Returns false when the node was
    /// already marked, meaning this branch looped back into itself.
    pub(crate) fn mark_visited(&self, key: String) -> bool {
        self.visited.insert(key)
    }
}

/// Canonical key for one evaluation node, in tuple text form.
pub(crate) fn node_key(resource: &ResourceRef, name: &str, subject: &SubjectRef) -> String {
    format!("{resource}#{name}@{subject}")
}
