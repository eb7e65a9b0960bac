use thiserror::Error;

/// Errors produced by schema lookups and tuple text parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Relation not found: {namespace}#{relation}")]
    RelationNotFound { namespace: String, relation: String },

    #[error("Permission not found: {namespace}#{permission}")]
    PermissionNotFound {
        namespace: String,
        permission: String,
    },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Invalid tuple text: {0}")]
    InvalidTupleText(String),
}
