use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::cursor::{decode_cursor, encode_cursor, Cursor};
use crate::errors::ListBidsError;
use crate::storages::BidReadStore;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;

/// Sort direction over `(at, bid_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Desc,
    Asc,
}

#[derive(Debug, Clone)]
pub struct Query {
    pub auction_id: String,
    /// Empty = first page.
    pub cursor: String,
    pub limit: i64,
    pub direction: Direction,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BidItem {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: f64,
    pub at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct ListResult {
    pub items: Vec<BidItem>,
    pub has_more: bool,
    pub next_cursor: Option<String>,
}

pub struct ListBidsService {
    repo: Arc<dyn BidReadStore>,
}

impl ListBidsService {
    pub fn new(repo: Arc<dyn BidReadStore>) -> Self {
        Self { repo }
    }

    pub async fn handle(&self, query: Query) -> Result<ListResult, ListBidsError> {
        // sanitize
        let mut limit = query.limit;
        if limit <= 0 {
            limit = DEFAULT_LIMIT;
        }
        if limit > MAX_LIMIT {
            limit = MAX_LIMIT;
        }

        let after = if query.cursor.is_empty() {
            None
        } else {
            Some(decode_cursor(&query.cursor)?)
        };
        let asc = query.direction == Direction::Asc;

        debug!(
            "listing bids: auction_id={} limit={} asc={} after={:?}",
            query.auction_id, limit, asc, after
        );

        let (items, mut has_more) = self
            .repo
            .list_by_auction(&query.auction_id, after.as_ref(), limit, asc)
            .await?;

        let next_cursor = if has_more {
            items.last().and_then(|last| {
                let cursor = Cursor {
                    at: last.at,
                    id: last.bid_id.clone(),
                };
                match encode_cursor(&cursor) {
                    Ok(encoded) => Some(encoded),
                    Err(err) => {
                        // fall back to end-of-list rather than failing the call
                        warn!("encode next cursor failed: {}", err);
                        None
                    }
                }
            })
        } else {
            None
        };
        has_more = has_more && next_cursor.is_some();

        Ok(ListResult {
            items,
            has_more,
            next_cursor,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::StorageError;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, TimeZone};
    use std::collections::HashSet;

    /// Keyset reader over an in-memory vector, mirroring the store's
    /// predicate exactly.
    struct FakeBidReadStore {
        items: Vec<BidItem>,
    }

    #[async_trait]
    impl BidReadStore for FakeBidReadStore {
        async fn list_by_auction(
            &self,
            auction_id: &str,
            after: Option<&Cursor>,
            limit: i64,
            asc: bool,
        ) -> Result<(Vec<BidItem>, bool), StorageError> {
            let mut matching: Vec<BidItem> = self
                .items
                .iter()
                .filter(|item| item.auction_id == auction_id)
                .filter(|item| match after {
                    None => true,
                    Some(cursor) => {
                        if asc {
                            item.at > cursor.at
                                || (item.at == cursor.at && item.bid_id > cursor.id)
                        } else {
                            item.at < cursor.at
                                || (item.at == cursor.at && item.bid_id < cursor.id)
                        }
                    }
                })
                .cloned()
                .collect();

            matching.sort_by(|a, b| {
                let ordering = a.at.cmp(&b.at).then(a.bid_id.cmp(&b.bid_id));
                if asc {
                    ordering
                } else {
                    ordering.reverse()
                }
            });

            let has_more = matching.len() > limit as usize;
            matching.truncate(limit as usize);
            Ok((matching, has_more))
        }
    }

    fn items(count: usize) -> Vec<BidItem> {
        let start = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        (0..count)
            .map(|i| BidItem {
                bid_id: format!("bid-{:04}", i),
                auction_id: "auction-1".to_string(),
                bidder_id: format!("bidder-{}", i % 7),
                amount: 100.0 + i as f64,
                at: start + ChronoDuration::seconds(i as i64),
            })
            .collect()
    }

    fn service(items: Vec<BidItem>) -> ListBidsService {
        ListBidsService::new(Arc::new(FakeBidReadStore { items }))
    }

    fn query(cursor: &str, limit: i64, direction: Direction) -> Query {
        Query {
            auction_id: "auction-1".to_string(),
            cursor: cursor.to_string(),
            limit,
            direction,
        }
    }

    #[tokio::test]
    async fn paginates_without_duplicates_or_gaps() {
        let all = items(250);
        let service = service(all.clone());

        let mut seen = HashSet::new();
        let mut pages = Vec::new();
        let mut cursor = String::new();

        loop {
            let result = service
                .handle(query(&cursor, 100, Direction::Desc))
                .await
                .unwrap();
            for item in &result.items {
                assert!(seen.insert(item.bid_id.clone()), "duplicate across pages");
            }
            pages.push(result.items.len());
            match result.next_cursor {
                Some(next) => {
                    assert!(result.has_more);
                    cursor = next;
                }
                None => {
                    assert!(!result.has_more);
                    break;
                }
            }
        }

        assert_eq!(vec![100, 100, 50], pages);
        assert_eq!(all.len(), seen.len());
    }

    #[tokio::test]
    async fn default_direction_returns_newest_first() {
        let service = service(items(10));

        let result = service
            .handle(query("", 5, Direction::Desc))
            .await
            .unwrap();

        assert_eq!(5, result.items.len());
        assert_eq!("bid-0009", result.items[0].bid_id);
        assert!(result.has_more);
        for pair in result.items.windows(2) {
            assert!(pair[0].at >= pair[1].at);
        }
    }

    #[tokio::test]
    async fn ascending_returns_oldest_first() {
        let service = service(items(10));

        let result = service.handle(query("", 5, Direction::Asc)).await.unwrap();

        assert_eq!("bid-0000", result.items[0].bid_id);
        for pair in result.items.windows(2) {
            assert!(pair[0].at <= pair[1].at);
        }
    }

    #[tokio::test]
    async fn clamps_the_limit() {
        let service = service(items(300));

        // zero falls back to the default
        let result = service.handle(query("", 0, Direction::Desc)).await.unwrap();
        assert_eq!(50, result.items.len());

        // oversized is capped
        let result = service
            .handle(query("", 1000, Direction::Desc))
            .await
            .unwrap();
        assert_eq!(200, result.items.len());
    }

    #[tokio::test]
    async fn breaks_timestamp_ties_by_bid_id() {
        let at = Utc.with_ymd_and_hms(2025, 1, 15, 10, 0, 0).unwrap();
        let tied: Vec<BidItem> = (0..4)
            .map(|i| BidItem {
                bid_id: format!("bid-{}", i),
                auction_id: "auction-1".to_string(),
                bidder_id: "bidder-1".to_string(),
                amount: 100.0 + i as f64,
                at,
            })
            .collect();
        let service = service(tied);

        let first = service.handle(query("", 2, Direction::Asc)).await.unwrap();
        assert_eq!(vec!["bid-0", "bid-1"], ids(&first.items));

        let second = service
            .handle(query(
                first.next_cursor.as_deref().unwrap(),
                2,
                Direction::Asc,
            ))
            .await
            .unwrap();
        assert_eq!(vec!["bid-2", "bid-3"], ids(&second.items));
        assert!(!second.has_more);
    }

    #[tokio::test]
    async fn unknown_auction_yields_an_empty_page() {
        let service = service(items(10));

        let result = service
            .handle(Query {
                auction_id: "auction-9".to_string(),
                cursor: String::new(),
                limit: 10,
                direction: Direction::Desc,
            })
            .await
            .unwrap();

        assert!(result.items.is_empty());
        assert!(!result.has_more);
        assert!(result.next_cursor.is_none());
    }

    #[tokio::test]
    async fn malformed_cursor_is_rejected() {
        let service = service(items(10));

        let err = service
            .handle(query("@@not-a-cursor@@", 10, Direction::Desc))
            .await
            .unwrap_err();
        assert!(matches!(err, ListBidsError::InvalidCursor));
    }

    fn ids(items: &[BidItem]) -> Vec<&str> {
        items.iter().map(|item| item.bid_id.as_str()).collect()
    }
}
