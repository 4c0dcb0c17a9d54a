use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    /// A conditional update's `WHERE status = $expected` matched zero rows:
    /// another actor already moved the row out from under the caller.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("invalid state: {0}")]
    InvalidState(String),
    /// Rejected before ever touching the database: `from -> to` is not in
    /// §8's allowed edge set.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("serialization failure: {0}")]
    Serialization(#[from] serde_json::Error),
}
