use thiserror::Error;

use peerly_store::StoreError;

/// Errors surfaced by the messaging service.
///
/// Every operation is all-or-nothing: when one of these comes back, no
/// store mutation happened (or, for store-level conflicts, none remains
/// applied).
#[derive(Error, Debug)]
pub enum ChatError {
    /// Input failed a local check (blank text, unknown emoji, sender not a
    /// member).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An id did not resolve to the named entity, or the entities are
    /// unrelated.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// A non-idempotent duplicate, e.g. a second direct conversation for
    /// the same pair of users.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<StoreError> for ChatError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(entity) => Self::NotFound(entity),
            StoreError::Conflict(msg) => Self::Conflict(msg),
        }
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChatError>;
