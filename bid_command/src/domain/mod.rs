pub mod events;
mod rules;

pub use rules::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Float slack tolerated when comparing money amounts that crossed a JSON
/// encoder.
pub const AMOUNT_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuctionStatus {
    #[serde(rename = "OPEN")]
    Open,
    #[serde(rename = "CLOSED")]
    Closed,
}

/// Snapshot of an auction's lifecycle as projected into the metadata cache.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionMetadata {
    pub auction_id: String,
    pub status: AuctionStatus,
    pub ends_at: DateTime<Utc>,
    pub starting_price: f64,
    /// Last accepted price, 0 if none.
    pub current_price: f64,
    pub min_increment: f64,
    pub version: i64,
}

impl AuctionMetadata {
    pub fn is_open(&self) -> bool {
        self.status == AuctionStatus::Open
    }

    /// Min acceptable next bid given only the cached snapshot.
    pub fn min_next_bid(&self) -> f64 {
        if self.current_price <= 0.0 {
            // no bids yet, so starting price is min
            return self.starting_price;
        }

        self.current_price + self.min_increment
    }
}

/// A bid on its way into the authoritative store. `seq` is assigned by the
/// store at insert.
#[derive(Debug, Clone, PartialEq)]
pub struct Bid {
    pub id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: f64,
    pub at: DateTime<Utc>,
}

impl Bid {
    pub fn new(auction_id: &str, bidder_id: &str, amount: f64, at: DateTime<Utc>) -> Self {
        Self {
            id: String::new(),
            auction_id: auction_id.to_string(),
            bidder_id: bidder_id.to_string(),
            amount,
            at,
        }
    }

    pub fn with_id(&self, id: String) -> Self {
        let mut bid = self.clone();
        bid.id = id;
        bid
    }
}

/// The authoritative state validated against inside the transaction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LastAcceptedBid {
    pub price: f64,
    pub version: i64,
}
