use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// An id did not resolve to a record of the named entity.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A uniqueness rule would be violated (duplicate conversation id,
    /// second direct conversation for the same pair).
    #[error("conflict: {0}")]
    Conflict(String),
}
