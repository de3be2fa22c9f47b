use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to talk to metadata cache: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Failed to encode metadata: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Metadata cache timed out after {0}ms")]
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
