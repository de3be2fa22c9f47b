pub mod bid_repository;
pub mod metadata_cache;
pub mod migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::{AuctionMetadata, Bid};
use crate::errors::{CacheError, StorageError};

/// Latest accepted bid of an auction as read under the row lock.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestBid {
    pub bid_id: String,
    pub amount: f64,
    pub seq: i64,
    pub at: DateTime<Utc>,
}

/// A persisted bid row together with its store-assigned sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredBid {
    pub bid: Bid,
    pub seq: i64,
}

#[async_trait]
pub trait MetadataStore: Send + Sync {
    /// A missing key is a distinguished `None`, not an error.
    async fn get(&self, auction_id: &str) -> Result<Option<AuctionMetadata>, CacheError>;
}

/// Authoritative bid store. `begin` opens a transaction already serialized
/// for the given auction; bids on other auctions proceed in parallel.
#[async_trait]
pub trait BidStore: Send + Sync {
    async fn begin(&self, auction_id: &str) -> Result<Box<dyn BidTx>, StorageError>;
}

/// Scoped transaction handle. Dropping it without `commit` rolls the
/// transaction back; passing the handle down is how nested work reuses the
/// outer transaction.
#[async_trait]
pub trait BidTx: Send {
    async fn latest_bid(&mut self) -> Result<Option<LatestBid>, StorageError>;

    async fn find_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<StoredBid>, StorageError>;

    async fn insert(
        &mut self,
        bid: &Bid,
        seq: i64,
        idempotency_key: Option<&str>,
    ) -> Result<(), StorageError>;

    async fn commit(self: Box<Self>) -> Result<(), StorageError>;

    async fn rollback(self: Box<Self>) -> Result<(), StorageError>;
}
