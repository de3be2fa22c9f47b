use chrono::{DateTime, Utc};
use serde::Serialize;

/// Emitted after a bid is accepted and committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPlaced {
    pub auction_id: String,
    pub bid_id: String,
    pub bidder_id: String,
    pub amount: f64,
    pub at: DateTime<Utc>,
}
