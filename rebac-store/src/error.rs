use rebac_model::SnapshotToken;
use thiserror::Error;

/// Errors a tuple store can surface to the evaluator.
///
/// These are infrastructure failures. "No matching tuples" is an empty
/// result, never an error.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Tuple store unavailable: {0}")]
    Unavailable(#[from] anyhow::Error),

    #[error("Unknown snapshot: revision {0} has not been committed")]
    UnknownSnapshot(SnapshotToken),
}
