use rebac_model::ModelError;
use rebac_store::StoreError;
use thiserror::Error;

/// Errors a check can finish with.
///
/// Every variant is distinct from `allowed: false`. A subject that
/// simply lacks access gets a successful response with `allowed: false`;
/// these errors mean the question could not be answered.
#[derive(Error, Debug)]
pub enum CheckError {
    /// Schema lookups that failed: unknown namespace, relation, or
    /// permission, or malformed tuple text.
    #[error(transparent)]
    Model(#[from] ModelError),

    /// The tuple store could not serve a read.
    #[error("Tuple store error: {0}")]
    Store(#[from] StoreError),

    #[error("Depth limit exceeded: check recursed past {max_depth} levels")]
    DepthExceeded { max_depth: u32 },

    #[error("Check timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

impl CheckError {
    /// True when the failure is a lookup of something the schema does
    /// not declare, which API layers typically map to a 404.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Model(
                ModelError::NamespaceNotFound(_)
                    | ModelError::RelationNotFound { .. }
                    | ModelError::PermissionNotFound { .. }
            )
        )
    }
}
