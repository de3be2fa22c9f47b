pub mod history_storage;
pub mod migrations;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::StorageError;

/// One accepted bid as stored in the history read model.
#[derive(Debug, Clone, PartialEq)]
pub struct BidHistoryDoc {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted,
    /// The event was already applied; a replay under at-least-once delivery.
    Duplicate,
}

#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn insert_bid(&self, doc: &BidHistoryDoc) -> Result<InsertOutcome, StorageError>;

    async fn upsert_auction_view(
        &self,
        auction_id: &str,
        current_price: f64,
        last_bidder_id: &str,
    ) -> Result<(), StorageError>;
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
