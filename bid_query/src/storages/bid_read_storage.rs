use std::time::Duration;

use async_trait::async_trait;
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use url::Url;

use super::BidReadStore;
use crate::application::list_bids::BidItem;
use crate::configuration::ReadStorageConfig;
use crate::cursor::Cursor;
use crate::errors::StorageError;

pub async fn connect_read_storage(config: &ReadStorageConfig) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    if let Ok(parsed_url) = Url::parse(&config.database_url) {
        info!(
            "Read storage connection established: {}://******:******@{}{}",
            parsed_url.scheme(),
            parsed_url.host_str().unwrap_or_default(),
            parsed_url.path()
        );
    }

    Ok(pool)
}

pub struct PgBidReadStorage {
    pool: PgPool,
    query_timeout: Duration,
    query_timeout_ms: u64,
}

impl PgBidReadStorage {
    pub fn new(pool: PgPool, config: &ReadStorageConfig) -> Self {
        Self {
            pool,
            query_timeout: Duration::from_millis(config.query_timeout_ms),
            query_timeout_ms: config.query_timeout_ms,
        }
    }
}

#[async_trait]
impl BidReadStore for PgBidReadStorage {
    async fn list_by_auction(
        &self,
        auction_id: &str,
        after: Option<&Cursor>,
        limit: i64,
        asc: bool,
    ) -> Result<(Vec<BidItem>, bool), StorageError> {
        // one extra row decides has_more
        let fetch = limit + 1;

        let query = match (after, asc) {
            (None, false) => sqlx::query(
                "SELECT bid_id, auction_id, bidder_id, amount, at FROM bids_history \
                 WHERE auction_id = $1 ORDER BY at DESC, bid_id DESC LIMIT $2",
            )
            .bind(auction_id)
            .bind(fetch),
            (None, true) => sqlx::query(
                "SELECT bid_id, auction_id, bidder_id, amount, at FROM bids_history \
                 WHERE auction_id = $1 ORDER BY at ASC, bid_id ASC LIMIT $2",
            )
            .bind(auction_id)
            .bind(fetch),
            (Some(cursor), false) => sqlx::query(
                "SELECT bid_id, auction_id, bidder_id, amount, at FROM bids_history \
                 WHERE auction_id = $1 AND (at < $2 OR (at = $2 AND bid_id < $3)) \
                 ORDER BY at DESC, bid_id DESC LIMIT $4",
            )
            .bind(auction_id)
            .bind(cursor.at)
            .bind(&cursor.id)
            .bind(fetch),
            (Some(cursor), true) => sqlx::query(
                "SELECT bid_id, auction_id, bidder_id, amount, at FROM bids_history \
                 WHERE auction_id = $1 AND (at > $2 OR (at = $2 AND bid_id > $3)) \
                 ORDER BY at ASC, bid_id ASC LIMIT $4",
            )
            .bind(auction_id)
            .bind(cursor.at)
            .bind(&cursor.id)
            .bind(fetch),
        };

        let rows = tokio::time::timeout(self.query_timeout, query.fetch_all(&self.pool))
            .await
            .map_err(|_| StorageError::Timeout(self.query_timeout_ms))??;

        let mut items = rows
            .iter()
            .map(|row| {
                Ok(BidItem {
                    bid_id: row.try_get("bid_id")?,
                    auction_id: row.try_get("auction_id")?,
                    bidder_id: row.try_get("bidder_id")?,
                    amount: row.try_get("amount")?,
                    at: row.try_get("at")?,
                })
            })
            .collect::<Result<Vec<BidItem>, sqlx::Error>>()?;

        let has_more = items.len() > limit as usize;
        items.truncate(limit as usize);

        Ok((items, has_more))
    }
}
