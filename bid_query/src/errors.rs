use thiserror::Error;

#[derive(Debug, Error)]
pub enum ListBidsError {
    #[error("invalid_cursor")]
    InvalidCursor,

    #[error("bid read storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Bid read storage query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Bid read storage timed out after {0}ms")]
    Timeout(u64),
}
