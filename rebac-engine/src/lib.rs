//! # ReBAC Engine
//!
//! Relationship-based permission evaluation in the Zanzibar style:
//! permissions rewrite into unions over relations, subject sets pull in
//! group membership, and hierarchy traversal inherits access from
//! parent resources.
//!
//! ## Guarantees
//!
//! - Union branches evaluate concurrently and the first grant cancels
//!   the rest
//! - Cycles in the relationship graph resolve to `allowed: false`
//!   instead of hanging
//! - Recursion depth and wall-clock time are capped, surfacing as
//!   distinct errors
//! - Repeated sub-checks within one request are memoized
//! - Every check reports the store snapshot it was evaluated at
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use rebac_engine::AuthorizationEngine;
//! use rebac_model::{ResourceRef, Schema, SubjectRef};
//! use rebac_store::MemoryTupleStore;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), rebac_engine::CheckError> {
//! let store = Arc::new(MemoryTupleStore::new());
//! store.write("item:photo1#owners@user:bob".parse()?);
//!
//! let engine = AuthorizationEngine::new(store, Schema::catalog_schema())?;
//! let response = engine
//!     .check(
//!         &SubjectRef::user("bob"),
//!         "view",
//!         &ResourceRef::new("item", "photo1"),
//!     )
//!     .await?;
//! assert!(response.allowed);
//! # Ok(())
//! # }
//! ```

pub mod check;
pub mod config;
mod context;
pub mod engine;
pub mod error;
pub mod expand;

pub use check::PermissionChecker;
pub use config::EngineConfig;
pub use engine::{AuthorizationEngine, CheckRequest, CheckResponse};
pub use error::CheckError;
pub use expand::{SubjectExpander, SubjectTree};
