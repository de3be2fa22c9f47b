use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::DecodeError;

pub const BIDS_PLACED_TOPIC: &str = "bids.placed";

/// Emitted by the bid command service after a bid is accepted.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidPlaced {
    pub auction_id: String,
    pub bid_id: String,
    pub bidder_id: String,
    pub amount: f64,
    pub at: DateTime<Utc>,
}

impl BidPlaced {
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        match topic {
            BIDS_PLACED_TOPIC => Ok(serde_json::from_slice(payload)?),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_bids_placed() {
        let payload = br#"{
            "auctionId": "auction-1",
            "bidId": "bid-1",
            "bidderId": "bidder-1",
            "amount": 120.5,
            "at": "2025-01-15T10:30:00Z"
        }"#;

        let event = BidPlaced::decode(BIDS_PLACED_TOPIC, payload).unwrap();
        assert_eq!("auction-1", event.auction_id);
        assert_eq!("bid-1", event.bid_id);
        assert_eq!("bidder-1", event.bidder_id);
        assert_eq!(120.5, event.amount);
    }

    #[test]
    fn rejects_unknown_topic() {
        let err = BidPlaced::decode("bids.cancelled", b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTopic(_)));
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = BidPlaced::decode(BIDS_PLACED_TOPIC, b"{\"auctionId\":").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
