use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use url::Url;

use super::{BidHistoryDoc, HistoryStore, InsertOutcome};
use crate::configuration::HistoryStorageConfig;
use crate::errors::StorageError;

pub async fn connect_history_storage(
    config: &HistoryStorageConfig,
) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    if let Ok(parsed_url) = Url::parse(&config.database_url) {
        info!(
            "History storage connection established: {}://******:******@{}{}",
            parsed_url.scheme(),
            parsed_url.host_str().unwrap_or_default(),
            parsed_url.path()
        );
    }

    Ok(pool)
}

pub struct PgHistoryStorage {
    pool: PgPool,
    op_timeout: Duration,
    op_timeout_ms: u64,
}

impl PgHistoryStorage {
    pub fn new(pool: PgPool, config: &HistoryStorageConfig) -> Self {
        Self {
            pool,
            op_timeout: Duration::from_millis(config.op_timeout_ms),
            op_timeout_ms: config.op_timeout_ms,
        }
    }
}

#[async_trait]
impl HistoryStore for PgHistoryStorage {
    async fn insert_bid(&self, doc: &BidHistoryDoc) -> Result<InsertOutcome, StorageError> {
        // The unique bid_id makes replays a no-op instead of an error.
        let query = sqlx::query(
            "INSERT INTO bids_history (bid_id, auction_id, bidder_id, amount, at) \
             VALUES ($1, $2, $3, $4, $5) ON CONFLICT (bid_id) DO NOTHING",
        )
        .bind(&doc.bid_id)
        .bind(&doc.auction_id)
        .bind(&doc.bidder_id)
        .bind(doc.amount)
        .bind(doc.at);

        let result = tokio::time::timeout(self.op_timeout, query.execute(&self.pool))
            .await
            .map_err(|_| StorageError::Timeout(self.op_timeout_ms))??;

        if result.rows_affected() == 0 {
            return Ok(InsertOutcome::Duplicate);
        }
        Ok(InsertOutcome::Inserted)
    }

    async fn upsert_auction_view(
        &self,
        auction_id: &str,
        current_price: f64,
        last_bidder_id: &str,
    ) -> Result<(), StorageError> {
        let query = sqlx::query(
            "INSERT INTO auctions_view (auction_id, current_price, last_bidder_id, updated_at) \
             VALUES ($1, $2, $3, $4) \
             ON CONFLICT (auction_id) DO UPDATE SET \
                 current_price = EXCLUDED.current_price, \
                 last_bidder_id = EXCLUDED.last_bidder_id, \
                 updated_at = EXCLUDED.updated_at",
        )
        .bind(auction_id)
        .bind(current_price)
        .bind(last_bidder_id)
        .bind(Utc::now());

        tokio::time::timeout(self.op_timeout, query.execute(&self.pool))
            .await
            .map_err(|_| StorageError::Timeout(self.op_timeout_ms))??;

        Ok(())
    }
}
