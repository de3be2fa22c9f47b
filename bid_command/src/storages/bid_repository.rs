use async_trait::async_trait;
use log::info;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use url::Url;

use super::{BidStore, BidTx, LatestBid, StoredBid};
use crate::configuration::BidStorageConfig;
use crate::domain::Bid;
use crate::errors::StorageError;

pub async fn connect_bid_storage(config: &BidStorageConfig) -> Result<PgPool, StorageError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;

    if let Ok(parsed_url) = Url::parse(&config.database_url) {
        info!(
            "PostgreSQL connection established: {}://******:******@{}{}",
            parsed_url.scheme(),
            parsed_url.host_str().unwrap_or_default(),
            parsed_url.path()
        );
    }

    Ok(pool)
}

pub struct PgBidRepository {
    pool: PgPool,
}

impl PgBidRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BidStore for PgBidRepository {
    async fn begin(&self, auction_id: &str) -> Result<Box<dyn BidTx>, StorageError> {
        let mut tx = self.pool.begin().await?;

        // Serializes bids per auction even when the auction has no rows yet,
        // which a plain FOR UPDATE cannot lock. Released at commit/rollback.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(auction_id)
            .execute(&mut *tx)
            .await?;

        Ok(Box::new(PgBidTx {
            tx,
            auction_id: auction_id.to_string(),
        }))
    }
}

struct PgBidTx {
    tx: Transaction<'static, Postgres>,
    auction_id: String,
}

#[async_trait]
impl BidTx for PgBidTx {
    async fn latest_bid(&mut self) -> Result<Option<LatestBid>, StorageError> {
        let row = sqlx::query(
            "SELECT bid_id, amount, seq, at FROM bids \
             WHERE auction_id = $1 ORDER BY seq DESC LIMIT 1 FOR UPDATE",
        )
        .bind(&self.auction_id)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(LatestBid {
                bid_id: row.try_get("bid_id")?,
                amount: row.try_get("amount")?,
                seq: row.try_get("seq")?,
                at: row.try_get("at")?,
            })),
        }
    }

    async fn find_by_idempotency_key(
        &mut self,
        key: &str,
    ) -> Result<Option<StoredBid>, StorageError> {
        let row = sqlx::query(
            "SELECT bid_id, auction_id, bidder_id, amount, at, seq FROM bids \
             WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&mut *self.tx)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(StoredBid {
                bid: Bid {
                    id: row.try_get("bid_id")?,
                    auction_id: row.try_get("auction_id")?,
                    bidder_id: row.try_get("bidder_id")?,
                    amount: row.try_get("amount")?,
                    at: row.try_get("at")?,
                },
                seq: row.try_get("seq")?,
            })),
        }
    }

    async fn insert(
        &mut self,
        bid: &Bid,
        seq: i64,
        idempotency_key: Option<&str>,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO bids (bid_id, auction_id, bidder_id, amount, at, seq, idempotency_key) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&bid.id)
        .bind(&bid.auction_id)
        .bind(&bid.bidder_id)
        .bind(bid.amount)
        .bind(bid.at)
        .bind(seq)
        .bind(idempotency_key)
        .execute(&mut *self.tx)
        .await?;

        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StorageError> {
        (*self).tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
        (*self).tx.rollback().await?;
        Ok(())
    }
}
