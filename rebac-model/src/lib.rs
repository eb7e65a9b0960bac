//! # ReBAC Model
//!
//! Core data model for relationship-based access control: relationship
//! tuples, subject references, snapshot tokens, and the permission schema
//! that drives evaluation.
//!
//! ## Core Concepts
//!
//! - **Relationship Tuple**: a fact of the form `resource#relation@subject`,
//!   e.g. `item:photo1#owners@user:bob`
//! - **Subject**: either a concrete subject (`user:bob`) or a subject set
//!   (`group:eng#members`, meaning "every subject related to `group:eng`
//!   through `members`")
//! - **Schema**: declares namespaces, their relations (with the subject
//!   types each relation accepts), and their permissions as rewrite
//!   expressions over relations
//! - **Snapshot Token**: an opaque store revision used to pin reads to a
//!   consistent view of the tuple data
//!
//! ## Example
//!
//! ```
//! use rebac_model::{Schema, Tuple};
//!
//! let schema = Schema::catalog_schema();
//! schema.validate().expect("bundled schema is valid");
//!
//! let tuple: Tuple = "item:photo1#owners@user:bob".parse().expect("valid tuple text");
//! assert_eq!(tuple.relation, "owners");
//! ```

pub mod error;
pub mod schema;
pub mod tuple;

pub use error::ModelError;
pub use schema::{
    NamespaceDef, PermissionDef, PermissionExpr, RelationDef, Schema, SubjectTypeRef,
};
pub use tuple::{ResourceRef, SnapshotToken, SubjectRef, Tuple, TupleFilter};
