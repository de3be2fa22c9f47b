use thiserror::Error;

/// Rejection kinds surfaced to bidders.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum BidRejected {
    #[error("auction_not_found")]
    AuctionNotFound,

    #[error("auction_closed")]
    AuctionClosed,

    #[error("invalid_amount")]
    InvalidAmount,

    #[error("invalid_bidder_id")]
    InvalidBidderId,

    #[error("below_min_increment: next valid bid must be >= {min_next_bid:.2}")]
    BelowMinIncrement { min_next_bid: f64 },

    #[error("version_conflict")]
    VersionConflict,
}

impl BidRejected {
    /// Stable label used for metrics and problem documents.
    pub fn reason(&self) -> &'static str {
        match self {
            BidRejected::AuctionNotFound => "auction_not_found",
            BidRejected::AuctionClosed => "auction_closed",
            BidRejected::InvalidAmount => "invalid_amount",
            BidRejected::InvalidBidderId => "invalid_bidder_id",
            BidRejected::BelowMinIncrement { .. } => "below_min_increment",
            BidRejected::VersionConflict => "version_conflict",
        }
    }
}

#[derive(Debug, Error)]
pub enum PlaceBidError {
    #[error(transparent)]
    Rejected(#[from] BidRejected),

    #[error("metadata cache failure: {0}")]
    Cache(#[from] CacheError),

    #[error("bid storage failure: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Failed to talk to metadata cache: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Corrupt metadata payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Metadata cache timed out after {0}ms")]
    Timeout(u64),
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Bid storage query failed: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Bid storage timed out after {0}ms")]
    Timeout(u64),
}

impl StorageError {
    /// Postgres aborts one of two competing serializable transactions with a
    /// serialization failure (40001) or deadlock (40P01); both are retriable
    /// by the client.
    pub fn is_conflict(&self) -> bool {
        match self {
            StorageError::Sqlx(sqlx::Error::Database(db)) => {
                matches!(db.code().as_deref(), Some("40001") | Some("40P01"))
            }
            _ => false,
        }
    }
}

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Failed to publish to broker: {0}")]
    Broker(#[from] lapin::Error),

    #[error("Failed to encode event: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Publish timed out after {0}ms")]
    Timeout(u64),

    #[error("Publisher task is gone")]
    PublisherGone,
}
