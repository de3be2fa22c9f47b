use std::sync::Arc;

use log::info;

use crate::errors::StorageError;
use crate::events::BidPlaced;
use crate::storages::{BidHistoryDoc, HistoryStore, InsertOutcome};

/// Applies one `bids.placed` event: insert into the history collection, then
/// refresh the per-auction view. The view upsert is not monotonic on its own;
/// it is correct because one auction's events arrive as one ordered stream.
pub struct BidHistoryProjection {
    store: Arc<dyn HistoryStore>,
}

impl BidHistoryProjection {
    pub fn new(store: Arc<dyn HistoryStore>) -> Self {
        Self { store }
    }

    pub async fn on_bid_placed(&self, event: &BidPlaced) -> Result<InsertOutcome, StorageError> {
        let doc = BidHistoryDoc {
            bid_id: event.bid_id.clone(),
            auction_id: event.auction_id.clone(),
            bidder_id: event.bidder_id.clone(),
            amount: event.amount,
            at: event.at,
        };

        let outcome = self.store.insert_bid(&doc).await?;
        if outcome == InsertOutcome::Duplicate {
            info!(
                "duplicate bid, skipping insert: bid_id={} auction_id={}",
                event.bid_id, event.auction_id
            );
        }

        self.store
            .upsert_auction_view(&event.auction_id, event.amount, &event.bidder_id)
            .await?;

        Ok(outcome)
    }
}
