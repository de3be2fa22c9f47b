use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("History storage query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("History storage timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Failed to decode event payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown topic {0}")]
    UnknownTopic(String),
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("Failed to connect to broker: {0}")]
    Connection(#[from] lapin::Error),
}
