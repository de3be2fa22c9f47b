use crate::domain::{AuctionMetadata, LastAcceptedBid, AMOUNT_EPSILON};
use crate::errors::BidRejected;

/// Returns true when `a` is below `b` by more than `eps`.
pub fn safe_less(a: f64, b: f64, eps: f64) -> bool {
    a < b - eps
}

/// Enforces the bid amount against the auction metadata.
/// Pass `None` for `last` when no prior bid exists or for quick checks.
pub fn validate_bid(
    auction: Option<&AuctionMetadata>,
    amount: f64,
    last: Option<&LastAcceptedBid>,
) -> Result<(), BidRejected> {
    let auction = auction.ok_or(BidRejected::AuctionNotFound)?;
    if !auction.is_open() {
        return Err(BidRejected::AuctionClosed);
    }
    if amount <= 0.0 {
        return Err(BidRejected::InvalidAmount);
    }

    let min = match last {
        // no prior bid, so use auction metadata only
        None => auction.min_next_bid(),
        Some(b) => min_next_price(*b, auction),
    };

    if safe_less(amount, min, AMOUNT_EPSILON) {
        return Err(BidRejected::BelowMinIncrement { min_next_bid: min });
    }

    Ok(())
}

/// Merges the cached auction snapshot with the latest bid read under the row
/// lock.
pub fn make_last_accepted_bid(
    auction: &AuctionMetadata,
    latest_amount: Option<f64>,
    latest_seq: Option<i64>,
) -> LastAcceptedBid {
    let mut price = auction.current_price;
    let mut version = auction.version;

    if let Some(amount) = latest_amount {
        if amount > price {
            price = amount;
        }
    }
    if let Some(seq) = latest_seq {
        if seq > version {
            version = seq;
        }
    }

    LastAcceptedBid { price, version }
}

/// Min acceptable amount given a last accepted bid and the auction's
/// increment policy.
pub fn min_next_price(bid: LastAcceptedBid, auction: &AuctionMetadata) -> f64 {
    if bid.price <= 0.0 {
        return auction.starting_price;
    }
    bid.price + auction.min_increment
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::AuctionStatus;
    use chrono::{Duration, Utc};

    fn open_auction(starting_price: f64, current_price: f64, min_increment: f64) -> AuctionMetadata {
        AuctionMetadata {
            auction_id: "auction-1".to_string(),
            status: AuctionStatus::Open,
            ends_at: Utc::now() + Duration::hours(1),
            starting_price,
            current_price,
            min_increment,
            version: 1,
        }
    }

    #[test]
    fn validate_bid_rejections() {
        let closed = AuctionMetadata {
            status: AuctionStatus::Closed,
            ..open_auction(100.0, 0.0, 10.0)
        };

        let cases = [
            (None, 100.0, None, BidRejected::AuctionNotFound),
            (
                Some(closed),
                110.0,
                None,
                BidRejected::AuctionClosed,
            ),
            (
                Some(open_auction(100.0, 0.0, 10.0)),
                0.0,
                None,
                BidRejected::InvalidAmount,
            ),
            (
                Some(open_auction(100.0, 0.0, 10.0)),
                -50.0,
                None,
                BidRejected::InvalidAmount,
            ),
            (
                Some(open_auction(100.0, 0.0, 10.0)),
                90.0,
                None,
                BidRejected::BelowMinIncrement {
                    min_next_bid: 100.0,
                },
            ),
            (
                Some(open_auction(100.0, 120.0, 10.0)),
                125.0,
                Some(LastAcceptedBid {
                    price: 120.0,
                    version: 1,
                }),
                BidRejected::BelowMinIncrement {
                    min_next_bid: 130.0,
                },
            ),
        ];

        for (auction, amount, last, expected) in cases {
            let got = validate_bid(auction.as_ref(), amount, last.as_ref());
            assert_eq!(Err(expected), got);
        }
    }

    #[test]
    fn validate_bid_acceptances() {
        let cases = [
            // first bid at starting price
            (open_auction(100.0, 0.0, 10.0), 100.0, None),
            // first bid above starting price
            (open_auction(100.0, 0.0, 10.0), 150.0, None),
            // bid at minimum required amount
            (
                open_auction(100.0, 120.0, 10.0),
                130.0,
                Some(LastAcceptedBid {
                    price: 120.0,
                    version: 1,
                }),
            ),
            // bid above minimum required amount
            (
                open_auction(100.0, 120.0, 10.0),
                150.0,
                Some(LastAcceptedBid {
                    price: 120.0,
                    version: 1,
                }),
            ),
        ];

        for (auction, amount, last) in cases {
            assert_eq!(Ok(()), validate_bid(Some(&auction), amount, last.as_ref()));
        }
    }

    #[test]
    fn validate_bid_epsilon_boundaries() {
        let auction = open_auction(100.0, 120.0, 10.0);
        let last = LastAcceptedBid {
            price: 120.0,
            version: 1,
        };

        // inside the tolerated encoding slack
        assert_eq!(
            Ok(()),
            validate_bid(Some(&auction), 130.0 - 1e-10, Some(&last))
        );
        // outside of it
        assert_eq!(
            Err(BidRejected::BelowMinIncrement {
                min_next_bid: 130.0
            }),
            validate_bid(Some(&auction), 130.0 - 1e-6, Some(&last))
        );
    }

    #[test]
    fn make_last_accepted_bid_merges_sources() {
        let auction = |price: f64, version: i64| AuctionMetadata {
            current_price: price,
            version,
            ..open_auction(100.0, price, 10.0)
        };

        let cases = [
            // uses the snapshot when there is no latest bid
            (auction(100.0, 1), None, None, 100.0, 1),
            // latest amount wins when higher
            (auction(100.0, 1), Some(150.0), Some(2), 150.0, 2),
            // snapshot price kept when latest amount is lower
            (auction(150.0, 2), Some(100.0), Some(1), 150.0, 2),
            // latest seq wins when higher than the snapshot version
            (auction(100.0, 1), Some(100.0), Some(5), 100.0, 5),
        ];

        for (auction, amount, seq, price, version) in cases {
            let got = make_last_accepted_bid(&auction, amount, seq);
            assert_eq!(LastAcceptedBid { price, version }, got);
        }
    }

    #[test]
    fn min_next_price_uses_starting_price_without_prior_bid() {
        let auction = open_auction(100.0, 0.0, 10.0);
        let bid = LastAcceptedBid {
            price: 0.0,
            version: 0,
        };
        assert_eq!(100.0, min_next_price(bid, &auction));
    }

    #[test]
    fn min_next_price_adds_increment() {
        let auction = open_auction(100.0, 120.0, 10.0);
        let bid = LastAcceptedBid {
            price: 120.0,
            version: 1,
        };
        assert_eq!(130.0, min_next_price(bid, &auction));

        let auction = open_auction(100.0, 125.5, 2.5);
        let bid = LastAcceptedBid {
            price: 125.5,
            version: 1,
        };
        assert_eq!(128.0, min_next_price(bid, &auction));
    }

    #[test]
    fn safe_less_honors_epsilon() {
        let cases = [
            (100.0, 110.0, 1e-9, true),
            (100.0, 100.0000000001, 1e-9, false),
            (110.0, 100.0, 1e-9, false),
            (100.0, 100.01, 0.001, true),
        ];

        for (a, b, eps, expected) in cases {
            assert_eq!(expected, safe_less(a, b, eps));
        }
    }
}
