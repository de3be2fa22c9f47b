pub mod redis_cache;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::CacheError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

/// The cache value consulted by the bid command service on every bid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionMetadata {
    pub auction_id: String,
    pub status: AuctionStatus,
    pub ends_at: DateTime<Utc>,
    pub starting_price: f64,
    pub current_price: f64,
    pub min_increment: f64,
    pub version: i64,
}

/// Write side of the shared auction metadata cache. Versions never regress:
/// `set_if_newer` applies a write only when the incoming version is at least
/// the stored one.
#[async_trait]
pub trait MetadataCache: Send + Sync {
    async fn get(&self, auction_id: &str) -> Result<Option<AuctionMetadata>, CacheError>;

    async fn set_if_newer(
        &self,
        auction_id: &str,
        metadata: &AuctionMetadata,
        ttl: Duration,
    ) -> Result<bool, CacheError>;

    /// Administrative purge only.
    async fn delete(&self, auction_id: &str) -> Result<(), CacheError>;
}

#[macro_export]
macro_rules! repeat_until_ok {
    ( $func:expr, $sleep_time:expr ) => {{
        loop {
            match $func {
                Ok(result) => break result,
                Err(err) => {
                    log::error!("Error in func {}: {}", stringify!($func), err);
                    tokio::time::sleep(std::time::Duration::from_secs($sleep_time)).await;
                }
            }
        }
    }};
}
