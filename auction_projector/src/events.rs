use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::errors::DecodeError;

pub const AUCTION_OPENED_TOPIC: &str = "auction.opened";
pub const AUCTION_CLOSED_TOPIC: &str = "auction.closed";

/// Emitted by the auction service when an auction is opened.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionOpened {
    pub auction_id: String,
    pub ends_at: DateTime<Utc>,
    pub starting_price: f64,
    pub min_increment: f64,
    #[serde(default)]
    pub currency: Option<String>,
    pub version: i64,
}

/// Emitted by the auction service when an auction is closed.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuctionClosed {
    pub auction_id: String,
    pub closed_at: DateTime<Utc>,
    pub version: i64,
}

/// Lifecycle events routed by topic. New event kinds are added as variants
/// plus a `decode` arm.
#[derive(Debug, Clone, PartialEq)]
pub enum AuctionEvent {
    Opened(AuctionOpened),
    Closed(AuctionClosed),
}

impl AuctionEvent {
    pub fn decode(topic: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        match topic {
            AUCTION_OPENED_TOPIC => Ok(Self::Opened(serde_json::from_slice(payload)?)),
            AUCTION_CLOSED_TOPIC => Ok(Self::Closed(serde_json::from_slice(payload)?)),
            other => Err(DecodeError::UnknownTopic(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_auction_opened() {
        let payload = br#"{
            "auctionId": "auction-1",
            "endsAt": "2025-01-15T10:00:00Z",
            "startingPrice": 100.0,
            "minIncrement": 10.0,
            "currency": "USD",
            "version": 1
        }"#;

        let event = AuctionEvent::decode(AUCTION_OPENED_TOPIC, payload).unwrap();
        match event {
            AuctionEvent::Opened(opened) => {
                assert_eq!("auction-1", opened.auction_id);
                assert_eq!(100.0, opened.starting_price);
                assert_eq!(10.0, opened.min_increment);
                assert_eq!(Some("USD".to_string()), opened.currency);
                assert_eq!(1, opened.version);
            }
            other => panic!("expected opened, got {:?}", other),
        }
    }

    #[test]
    fn decodes_auction_opened_without_currency() {
        let payload = br#"{
            "auctionId": "auction-1",
            "endsAt": "2025-01-15T10:00:00Z",
            "startingPrice": 100.0,
            "minIncrement": 10.0,
            "version": 3
        }"#;

        let event = AuctionEvent::decode(AUCTION_OPENED_TOPIC, payload).unwrap();
        match event {
            AuctionEvent::Opened(opened) => assert_eq!(None, opened.currency),
            other => panic!("expected opened, got {:?}", other),
        }
    }

    #[test]
    fn decodes_auction_closed() {
        let payload = br#"{
            "auctionId": "auction-2",
            "closedAt": "2025-01-15T12:00:00Z",
            "version": 7
        }"#;

        let event = AuctionEvent::decode(AUCTION_CLOSED_TOPIC, payload).unwrap();
        match event {
            AuctionEvent::Closed(closed) => {
                assert_eq!("auction-2", closed.auction_id);
                assert_eq!(7, closed.version);
            }
            other => panic!("expected closed, got {:?}", other),
        }
    }

    #[test]
    fn rejects_unknown_topic() {
        let err = AuctionEvent::decode("auction.cancelled", b"{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownTopic(_)));
    }

    #[test]
    fn rejects_malformed_payload() {
        let err = AuctionEvent::decode(AUCTION_OPENED_TOPIC, b"not-json").unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }
}
