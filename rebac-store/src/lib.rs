//! # ReBAC Store
//!
//! Read interface the evaluator pulls relationship tuples through, plus
//! a snapshot-isolated in-memory store backing tests, development, and
//! small deployments.
//!
//! Evaluation only ever reads, so [`TupleStore`] exposes reads alone.
//! Mutation lives on the concrete store types, and every write returns
//! the [`SnapshotToken`](rebac_model::SnapshotToken) for the revision it
//! produced so callers can read their own writes.

pub mod error;
pub mod memory;
pub mod store;

pub use error::StoreError;
pub use memory::MemoryTupleStore;
pub use store::{TupleStore, WriteRequest};
