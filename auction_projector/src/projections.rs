use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::errors::CacheError;
use crate::events::{AuctionClosed, AuctionOpened};
use crate::storages::{AuctionMetadata, AuctionStatus, MetadataCache};

/// Materializes lifecycle events into the metadata cache. Returns whether the
/// conditional write was applied; a stale event is handled, not an error.
pub struct AuctionProjection {
    cache: Arc<dyn MetadataCache>,
    ttl_buffer: Duration,
    closed_retention: Duration,
}

impl AuctionProjection {
    pub fn new(
        cache: Arc<dyn MetadataCache>,
        ttl_buffer: Duration,
        closed_retention: Duration,
    ) -> Self {
        Self {
            cache,
            ttl_buffer,
            closed_retention,
        }
    }

    pub async fn on_auction_opened(&self, event: &AuctionOpened) -> Result<bool, CacheError> {
        debug!(
            "projecting auction.opened: auction_id={} version={} currency={:?}",
            event.auction_id, event.version, event.currency
        );

        let metadata = AuctionMetadata {
            auction_id: event.auction_id.clone(),
            status: AuctionStatus::Open,
            ends_at: event.ends_at,
            starting_price: event.starting_price,
            current_price: 0.0,
            min_increment: event.min_increment,
            version: event.version,
        };

        let ttl = ttl_from_end(event.ends_at, self.ttl_buffer);
        let applied = self
            .cache
            .set_if_newer(&event.auction_id, &metadata, ttl)
            .await?;
        if !applied {
            debug!(
                "stale auction.opened for auction_id={} version={}",
                event.auction_id, event.version
            );
        }
        Ok(applied)
    }

    pub async fn on_auction_closed(&self, event: &AuctionClosed) -> Result<bool, CacheError> {
        debug!(
            "projecting auction.closed: auction_id={} version={} closed_at={}",
            event.auction_id, event.version, event.closed_at
        );

        // Populate fields from the current state when we have it; a missed
        // read still flips the status to closed.
        let current = match self.cache.get(&event.auction_id).await {
            Ok(current) => current,
            Err(err) => {
                warn!(
                    "failed to get current metadata for auction_id={}: {}",
                    event.auction_id, err
                );
                None
            }
        };

        let metadata = AuctionMetadata {
            auction_id: event.auction_id.clone(),
            status: AuctionStatus::Closed,
            ends_at: current
                .as_ref()
                .map(|c| c.ends_at)
                .unwrap_or(DateTime::<Utc>::MIN_UTC),
            starting_price: current.as_ref().map(|c| c.starting_price).unwrap_or(0.0),
            current_price: current.as_ref().map(|c| c.current_price).unwrap_or(0.0),
            min_increment: current.as_ref().map(|c| c.min_increment).unwrap_or(0.0),
            version: event.version,
        };

        let applied = self
            .cache
            .set_if_newer(&event.auction_id, &metadata, self.closed_retention)
            .await?;
        if !applied {
            debug!(
                "stale auction.closed for auction_id={} version={}",
                event.auction_id, event.version
            );
        }
        Ok(applied)
    }
}

/// TTL covering the remaining auction lifetime plus a buffer; never below
/// the buffer itself.
fn ttl_from_end(ends_at: DateTime<Utc>, buffer: Duration) -> Duration {
    let until_end = (ends_at - Utc::now()).to_std().unwrap_or_default();
    until_end + buffer
}
