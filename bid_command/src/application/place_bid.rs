use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use uuid::Uuid;

use crate::actors::bids_publisher::BidsPlacedPublisher;
use crate::domain::events::BidPlaced;
use crate::domain::{
    make_last_accepted_bid, validate_bid, AuctionMetadata, Bid, AMOUNT_EPSILON,
};
use crate::errors::{BidRejected, PlaceBidError, StorageError};
use crate::metrics_update;
use crate::storages::{BidStore, MetadataStore, StoredBid};

#[derive(Debug, Clone)]
pub struct Command {
    pub auction_id: String,
    pub bidder_id: String,
    pub amount: f64,
    pub idempotency_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaceBidResult {
    pub bid_id: String,
    pub auction_id: String,
    pub bidder_id: String,
    pub current_price: f64,
    pub min_next_bid: f64,
    pub version: i64,
    pub at: DateTime<Utc>,
}

enum TxOutcome {
    Accepted { seq: i64 },
    Replayed(StoredBid),
}

/// The authoritative write path: a cheap cache pre-check, then the real
/// decision under the per-auction lock in the bid store.
pub struct PlaceBidService {
    cache: Arc<dyn MetadataStore>,
    bids: Arc<dyn BidStore>,
    publisher: Arc<dyn BidsPlacedPublisher>,
    insert_timeout_ms: u64,
}

impl PlaceBidService {
    pub fn new(
        cache: Arc<dyn MetadataStore>,
        bids: Arc<dyn BidStore>,
        publisher: Arc<dyn BidsPlacedPublisher>,
        insert_timeout_ms: u64,
    ) -> Self {
        Self {
            cache,
            bids,
            publisher,
            insert_timeout_ms,
        }
    }

    pub async fn handle(&self, cmd: Command) -> Result<PlaceBidResult, PlaceBidError> {
        info!(
            "placing bid: auction_id={} bidder_id={} amount={}",
            cmd.auction_id, cmd.bidder_id, cmd.amount
        );

        let timer = metrics_update!(timer PLACE_BID_TIME);
        let placed = self.place(&cmd).await;
        metrics_update!(timer observe timer);

        match placed {
            Ok((result, replayed)) => {
                if replayed {
                    metrics_update!(inc BIDS_REPLAYED_COUNT);
                    return Ok(result);
                }
                metrics_update!(inc BIDS_ACCEPTED_COUNT);
                info!(
                    "bid accepted: auction_id={} bid_id={} seq={}",
                    result.auction_id, result.bid_id, result.version
                );

                // Publish after commit. The bid is already durable, so a
                // publish failure must not fail the call.
                let event = BidPlaced {
                    auction_id: result.auction_id.clone(),
                    bid_id: result.bid_id.clone(),
                    bidder_id: result.bidder_id.clone(),
                    amount: result.current_price,
                    at: result.at,
                };
                if let Err(err) = self.publisher.publish_bid_placed(event).await {
                    metrics_update!(inc PUBLISH_FAILURES_COUNT);
                    warn!(
                        "publish bids.placed failed for auction_id={} bid_id={}: {}",
                        result.auction_id, result.bid_id, err
                    );
                }

                Ok(result)
            }
            Err(err) => {
                if let PlaceBidError::Rejected(rejected) = &err {
                    metrics_update!(inc BIDS_REJECTED_COUNT, &[rejected.reason()]);
                    warn!("bid rejected for auction_id={}: {}", cmd.auction_id, err);
                } else {
                    warn!("place bid failed for auction_id={}: {}", cmd.auction_id, err);
                }
                Err(err)
            }
        }
    }

    async fn place(&self, cmd: &Command) -> Result<(PlaceBidResult, bool), PlaceBidError> {
        // Fast pre-check using the cache; rejects obviously bad bids without
        // touching the database. The auction state decides first: an unknown
        // or closed auction wins over any problem with the bid itself.
        let auction = self
            .cache
            .get(&cmd.auction_id)
            .await?
            .ok_or(BidRejected::AuctionNotFound)?;
        debug!(
            "auction snapshot: auction_id={} status={:?} ends_at={} current_price={}",
            auction.auction_id, auction.status, auction.ends_at, auction.current_price
        );
        validate_bid(Some(&auction), cmd.amount, None)?;
        if cmd.bidder_id.is_empty() {
            return Err(BidRejected::InvalidBidderId.into());
        }

        let bid = Bid::new(&cmd.auction_id, &cmd.bidder_id, cmd.amount, Utc::now())
            .with_id(Uuid::new_v4().to_string());

        let outcome = tokio::time::timeout(
            Duration::from_millis(self.insert_timeout_ms),
            self.place_in_tx(&auction, &bid, cmd.idempotency_key.as_deref()),
        )
        .await
        .map_err(|_| PlaceBidError::Storage(StorageError::Timeout(self.insert_timeout_ms)))??;

        match outcome {
            TxOutcome::Accepted { seq } => Ok((result_for(&auction, &bid, seq), false)),
            TxOutcome::Replayed(stored) => Ok((result_for(&auction, &stored.bid, stored.seq), true)),
        }
    }

    /// Authoritative check against the latest bid, serialized per auction by
    /// the store. The handle rolls back when dropped without commit.
    async fn place_in_tx(
        &self,
        auction: &AuctionMetadata,
        bid: &Bid,
        idempotency_key: Option<&str>,
    ) -> Result<TxOutcome, PlaceBidError> {
        let mut tx = self.bids.begin(&bid.auction_id).await.map_err(map_storage)?;

        if let Some(key) = idempotency_key {
            if let Some(existing) = tx.find_by_idempotency_key(key).await.map_err(map_storage)? {
                tx.rollback().await.map_err(map_storage)?;

                let same_command = existing.bid.auction_id == bid.auction_id
                    && existing.bid.bidder_id == bid.bidder_id
                    && (existing.bid.amount - bid.amount).abs() <= AMOUNT_EPSILON;
                if same_command {
                    return Ok(TxOutcome::Replayed(existing));
                }
                return Err(BidRejected::VersionConflict.into());
            }
        }

        let latest = tx.latest_bid().await.map_err(map_storage)?;
        if let Some(latest) = &latest {
            debug!(
                "latest accepted bid: bid_id={} amount={} seq={} at={}",
                latest.bid_id, latest.amount, latest.seq, latest.at
            );
        }

        let last = make_last_accepted_bid(
            auction,
            latest.as_ref().map(|l| l.amount),
            latest.as_ref().map(|l| l.seq),
        );

        // Validate again with the authoritative baseline.
        if let Err(rejected) = validate_bid(Some(auction), bid.amount, Some(&last)) {
            tx.rollback().await.map_err(map_storage)?;
            return Err(rejected.into());
        }

        let seq = latest.map(|l| l.seq).unwrap_or(0) + 1;
        tx.insert(bid, seq, idempotency_key)
            .await
            .map_err(map_storage)?;
        tx.commit().await.map_err(map_storage)?;

        Ok(TxOutcome::Accepted { seq })
    }
}

fn result_for(auction: &AuctionMetadata, bid: &Bid, seq: i64) -> PlaceBidResult {
    PlaceBidResult {
        bid_id: bid.id.clone(),
        auction_id: bid.auction_id.clone(),
        bidder_id: bid.bidder_id.clone(),
        current_price: bid.amount,
        min_next_bid: bid.amount + auction.min_increment,
        version: seq,
        at: bid.at,
    }
}

fn map_storage(err: StorageError) -> PlaceBidError {
    if err.is_conflict() {
        return BidRejected::VersionConflict.into();
    }
    err.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AuctionStatus;
    use crate::errors::PublishError;
    use crate::storages::{BidTx, LatestBid};
    use async_trait::async_trait;
    use chrono::Duration as ChronoDuration;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::{Mutex, OwnedMutexGuard};

    struct FakeMetadataStore {
        auctions: HashMap<String, AuctionMetadata>,
    }

    #[async_trait]
    impl MetadataStore for FakeMetadataStore {
        async fn get(
            &self,
            auction_id: &str,
        ) -> Result<Option<AuctionMetadata>, crate::errors::CacheError> {
            Ok(self.auctions.get(auction_id).cloned())
        }
    }

    #[derive(Debug, Clone)]
    struct FakeRow {
        bid: Bid,
        seq: i64,
        idempotency_key: Option<String>,
    }

    /// In-memory bid store. The owned mutex guard plays the role of the
    /// per-auction lock: a second `begin` blocks until the first transaction
    /// finishes.
    #[derive(Clone, Default)]
    struct FakeBidStore {
        rows: Arc<Mutex<Vec<FakeRow>>>,
    }

    #[async_trait]
    impl BidStore for FakeBidStore {
        async fn begin(&self, auction_id: &str) -> Result<Box<dyn BidTx>, StorageError> {
            let guard = self.rows.clone().lock_owned().await;
            Ok(Box::new(FakeBidTx {
                guard,
                auction_id: auction_id.to_string(),
                staged: None,
            }))
        }
    }

    struct FakeBidTx {
        guard: OwnedMutexGuard<Vec<FakeRow>>,
        auction_id: String,
        staged: Option<FakeRow>,
    }

    #[async_trait]
    impl BidTx for FakeBidTx {
        async fn latest_bid(&mut self) -> Result<Option<LatestBid>, StorageError> {
            Ok(self
                .guard
                .iter()
                .filter(|row| row.bid.auction_id == self.auction_id)
                .max_by_key(|row| row.seq)
                .map(|row| LatestBid {
                    bid_id: row.bid.id.clone(),
                    amount: row.bid.amount,
                    seq: row.seq,
                    at: row.bid.at,
                }))
        }

        async fn find_by_idempotency_key(
            &mut self,
            key: &str,
        ) -> Result<Option<StoredBid>, StorageError> {
            Ok(self
                .guard
                .iter()
                .find(|row| row.idempotency_key.as_deref() == Some(key))
                .map(|row| StoredBid {
                    bid: row.bid.clone(),
                    seq: row.seq,
                }))
        }

        async fn insert(
            &mut self,
            bid: &Bid,
            seq: i64,
            idempotency_key: Option<&str>,
        ) -> Result<(), StorageError> {
            assert!(
                !self
                    .guard
                    .iter()
                    .any(|row| row.bid.auction_id == bid.auction_id && row.seq == seq),
                "(auction_id, seq) must stay unique"
            );
            assert!(
                !self.guard.iter().any(|row| row.bid.id == bid.id),
                "bid_id must stay unique"
            );
            self.staged = Some(FakeRow {
                bid: bid.clone(),
                seq,
                idempotency_key: idempotency_key.map(str::to_string),
            });
            Ok(())
        }

        async fn commit(self: Box<Self>) -> Result<(), StorageError> {
            let mut me = *self;
            if let Some(row) = me.staged.take() {
                me.guard.push(row);
            }
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> Result<(), StorageError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakePublisher {
        fail: bool,
        events: StdMutex<Vec<BidPlaced>>,
    }

    #[async_trait]
    impl BidsPlacedPublisher for FakePublisher {
        async fn publish_bid_placed(&self, event: BidPlaced) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::Timeout(0));
            }
            self.events.lock().unwrap().push(event);
            Ok(())
        }
    }

    fn open_auction(auction_id: &str, current_price: f64, version: i64) -> AuctionMetadata {
        AuctionMetadata {
            auction_id: auction_id.to_string(),
            status: AuctionStatus::Open,
            ends_at: Utc::now() + ChronoDuration::hours(1),
            starting_price: 100.0,
            current_price,
            min_increment: 10.0,
            version,
        }
    }

    fn build_service(
        auctions: Vec<AuctionMetadata>,
        store: FakeBidStore,
        publisher: Arc<FakePublisher>,
    ) -> PlaceBidService {
        let auctions = auctions
            .into_iter()
            .map(|auction| (auction.auction_id.clone(), auction))
            .collect();
        PlaceBidService::new(
            Arc::new(FakeMetadataStore { auctions }),
            Arc::new(store),
            publisher,
            5000,
        )
    }

    fn command(auction_id: &str, bidder_id: &str, amount: f64) -> Command {
        Command {
            auction_id: auction_id.to_string(),
            bidder_id: bidder_id.to_string(),
            amount,
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn first_bid_at_starting_price_is_accepted_and_published() {
        let store = FakeBidStore::default();
        let publisher = Arc::new(FakePublisher::default());
        let service = build_service(
            vec![open_auction("auction-1", 0.0, 1)],
            store.clone(),
            publisher.clone(),
        );

        let result = service
            .handle(command("auction-1", "bidder-1", 100.0))
            .await
            .unwrap();

        assert_eq!(100.0, result.current_price);
        assert_eq!(110.0, result.min_next_bid);
        assert_eq!(1, result.version);
        assert_eq!("bidder-1", result.bidder_id);

        let rows = store.rows.lock().await;
        assert_eq!(1, rows.len());
        assert_eq!(1, rows[0].seq);

        let events = publisher.events.lock().unwrap();
        assert_eq!(1, events.len());
        assert_eq!(100.0, events[0].amount);
        assert_eq!(result.bid_id, events[0].bid_id);
    }

    #[tokio::test]
    async fn concurrent_race_accepts_exactly_one() {
        let store = FakeBidStore::default();
        let publisher = Arc::new(FakePublisher::default());
        let service = Arc::new(build_service(
            vec![open_auction("auction-1", 100.0, 1)],
            store.clone(),
            publisher,
        ));

        let first = service.clone();
        let second = service.clone();
        let (a, b) = tokio::join!(
            first.handle(command("auction-1", "bidder-1", 120.0)),
            second.handle(command("auction-1", "bidder-2", 120.0)),
        );

        let accepted = [a.is_ok(), b.is_ok()].iter().filter(|ok| **ok).count();
        assert_eq!(1, accepted);

        let rejection = if a.is_err() { a } else { b };
        match rejection {
            Err(PlaceBidError::Rejected(BidRejected::BelowMinIncrement { min_next_bid })) => {
                assert_eq!(130.0, min_next_bid)
            }
            other => panic!("expected below_min_increment, got {:?}", other.err()),
        }

        let rows = store.rows.lock().await;
        assert_eq!(1, rows.len());
        assert_eq!(120.0, rows[0].bid.amount);
    }

    #[tokio::test]
    async fn accepted_amounts_stay_monotonic() {
        let store = FakeBidStore::default();
        let publisher = Arc::new(FakePublisher::default());
        let service = build_service(
            vec![open_auction("auction-1", 0.0, 1)],
            store.clone(),
            publisher,
        );

        for amount in [100.0, 110.0, 135.0] {
            service
                .handle(command("auction-1", "bidder-1", amount))
                .await
                .unwrap();
        }
        // rejected: below latest + increment
        let err = service
            .handle(command("auction-1", "bidder-2", 140.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::BelowMinIncrement { .. })
        ));

        let rows = store.rows.lock().await;
        let seqs: Vec<i64> = rows.iter().map(|row| row.seq).collect();
        assert_eq!(vec![1, 2, 3], seqs);
        for pair in rows.windows(2) {
            assert!(pair[1].bid.amount >= pair[0].bid.amount + 10.0);
        }
    }

    #[tokio::test]
    async fn authoritative_store_overrules_stale_cache() {
        let store = FakeBidStore::default();
        let publisher = Arc::new(FakePublisher::default());
        let service = build_service(
            vec![open_auction("auction-1", 100.0, 1)],
            store.clone(),
            publisher,
        );

        // A bid the cache has not seen yet.
        store.rows.lock().await.push(FakeRow {
            bid: Bid::new("auction-1", "bidder-0", 150.0, Utc::now()).with_id("bid-0".to_string()),
            seq: 3,
            idempotency_key: None,
        });

        // Passes the cache pre-check (min 110) but not the authoritative one
        // (min 160).
        let err = service
            .handle(command("auction-1", "bidder-1", 120.0))
            .await
            .unwrap_err();

        match err {
            PlaceBidError::Rejected(BidRejected::BelowMinIncrement { min_next_bid }) => {
                assert_eq!(160.0, min_next_bid)
            }
            other => panic!("expected below_min_increment, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn closed_auction_is_rejected_regardless_of_amount() {
        let mut auction = open_auction("auction-1", 100.0, 2);
        auction.status = AuctionStatus::Closed;
        let service = build_service(
            vec![auction],
            FakeBidStore::default(),
            Arc::new(FakePublisher::default()),
        );

        let err = service
            .handle(command("auction-1", "bidder-1", 999999.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::AuctionClosed)
        ));
    }

    #[tokio::test]
    async fn unknown_auction_is_rejected() {
        let service = build_service(
            vec![],
            FakeBidStore::default(),
            Arc::new(FakePublisher::default()),
        );

        let err = service
            .handle(command("auction-9", "bidder-1", 100.0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::AuctionNotFound)
        ));
    }

    #[tokio::test]
    async fn empty_bidder_id_is_rejected() {
        let service = build_service(
            vec![open_auction("auction-1", 0.0, 1)],
            FakeBidStore::default(),
            Arc::new(FakePublisher::default()),
        );

        let err = service.handle(command("auction-1", "", 100.0)).await.unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::InvalidBidderId)
        ));
    }

    #[tokio::test]
    async fn auction_state_outranks_bidder_and_amount_problems() {
        let mut closed = open_auction("auction-1", 100.0, 2);
        closed.status = AuctionStatus::Closed;
        let service = build_service(
            vec![closed],
            FakeBidStore::default(),
            Arc::new(FakePublisher::default()),
        );

        // empty bidder on an unknown auction: the lookup decides
        let err = service.handle(command("auction-9", "", 100.0)).await.unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::AuctionNotFound)
        ));

        // empty bidder and bad amount on a closed auction: the status decides
        let err = service.handle(command("auction-1", "", 0.0)).await.unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::AuctionClosed)
        ));
    }

    #[tokio::test]
    async fn publish_failure_does_not_fail_the_accepted_bid() {
        let store = FakeBidStore::default();
        let publisher = Arc::new(FakePublisher {
            fail: true,
            events: StdMutex::new(vec![]),
        });
        let service = build_service(
            vec![open_auction("auction-1", 0.0, 1)],
            store.clone(),
            publisher,
        );

        let result = service
            .handle(command("auction-1", "bidder-1", 100.0))
            .await
            .unwrap();
        assert_eq!(100.0, result.current_price);

        // the bid is durable even though the event never went out
        let rows = store.rows.lock().await;
        assert_eq!(1, rows.len());
    }

    #[tokio::test]
    async fn idempotent_replay_returns_the_original_result() {
        let store = FakeBidStore::default();
        let publisher = Arc::new(FakePublisher::default());
        let service = build_service(
            vec![open_auction("auction-1", 0.0, 1)],
            store.clone(),
            publisher.clone(),
        );

        let mut cmd = command("auction-1", "bidder-1", 100.0);
        cmd.idempotency_key = Some("key-1".to_string());

        let first = service.handle(cmd.clone()).await.unwrap();
        let second = service.handle(cmd).await.unwrap();

        assert_eq!(first.bid_id, second.bid_id);
        assert_eq!(first.version, second.version);
        assert_eq!(1, store.rows.lock().await.len());
        // replay does not publish a second event
        assert_eq!(1, publisher.events.lock().unwrap().len());
    }

    #[tokio::test]
    async fn idempotency_key_reuse_with_different_amount_conflicts() {
        let store = FakeBidStore::default();
        let service = build_service(
            vec![open_auction("auction-1", 0.0, 1)],
            store.clone(),
            Arc::new(FakePublisher::default()),
        );

        let mut cmd = command("auction-1", "bidder-1", 100.0);
        cmd.idempotency_key = Some("key-1".to_string());
        service.handle(cmd.clone()).await.unwrap();

        cmd.amount = 130.0;
        let err = service.handle(cmd).await.unwrap_err();
        assert!(matches!(
            err,
            PlaceBidError::Rejected(BidRejected::VersionConflict)
        ));
        assert_eq!(1, store.rows.lock().await.len());
    }
}
