use chrono::{DateTime, Utc};
use hyper::{header::CONTENT_TYPE, Body, Request, Response, StatusCode};
use log::error;
use serde::{Deserialize, Serialize};

use super::{problem, AppCtx};
use crate::application::place_bid::Command;
use crate::errors::{BidRejected, PlaceBidError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlaceBidRequest {
    #[serde(default)]
    bidder_id: String,
    #[serde(default)]
    amount: f64,
    #[serde(default)]
    idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlaceBidResponse {
    bid_id: String,
    auction_id: String,
    bidder_id: String,
    accepted: bool,
    current_price: f64,
    min_next_bid: f64,
    at: DateTime<Utc>,
}

pub async fn handle(ctx: &AppCtx, auction_id: String, req: Request<Body>) -> Response<Body> {
    let body = match hyper::body::to_bytes(req.into_body()).await {
        Ok(body) => body,
        Err(err) => {
            return problem(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                &format!("Failed to read body: {}", err),
            )
        }
    };

    let request: PlaceBidRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            return problem(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                &format!("JSON decode/validation error: {}", err),
            )
        }
    };

    let result = ctx
        .place_bid
        .handle(Command {
            auction_id,
            bidder_id: request.bidder_id,
            amount: request.amount,
            idempotency_key: request.idempotency_key,
        })
        .await;

    match result {
        Ok(result) => {
            let response = PlaceBidResponse {
                bid_id: result.bid_id,
                auction_id: result.auction_id,
                bidder_id: result.bidder_id,
                accepted: true,
                current_price: result.current_price,
                min_next_bid: result.min_next_bid,
                at: result.at,
            };

            Response::builder()
                .status(StatusCode::CREATED)
                .header(CONTENT_TYPE, "application/json")
                .body(Body::from(serde_json::to_string(&response).unwrap()))
                .unwrap()
        }
        Err(err) => map_error(err),
    }
}

fn map_error(err: PlaceBidError) -> Response<Body> {
    match err {
        PlaceBidError::Rejected(rejected) => match &rejected {
            BidRejected::AuctionClosed => problem(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Auction closed",
                "No further bids are accepted for this auction",
            ),
            BidRejected::AuctionNotFound => problem(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Auction not found",
                "Cannot place bid because auction metadata is unavailable",
            ),
            BidRejected::BelowMinIncrement { .. } => problem(
                StatusCode::UNPROCESSABLE_ENTITY,
                "Bid rejected: below minimum increment",
                &rejected.to_string(),
            ),
            BidRejected::VersionConflict => problem(
                StatusCode::CONFLICT,
                "Conflict",
                "Concurrent update detected; fetch latest price and retry",
            ),
            BidRejected::InvalidAmount => problem(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                "amount must be > 0",
            ),
            BidRejected::InvalidBidderId => problem(
                StatusCode::BAD_REQUEST,
                "Invalid request body",
                "bidderId is required",
            ),
        },
        other => {
            error!("place bid failed: {}", other);
            problem(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                "The bid could not be processed",
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_rejections_map_to_http_statuses() {
        let cases = [
            (BidRejected::AuctionClosed, StatusCode::UNPROCESSABLE_ENTITY),
            (
                BidRejected::AuctionNotFound,
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                BidRejected::BelowMinIncrement {
                    min_next_bid: 130.0,
                },
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (BidRejected::VersionConflict, StatusCode::CONFLICT),
            (BidRejected::InvalidAmount, StatusCode::BAD_REQUEST),
            (BidRejected::InvalidBidderId, StatusCode::BAD_REQUEST),
        ];

        for (rejected, status) in cases {
            let response = map_error(PlaceBidError::Rejected(rejected));
            assert_eq!(status, response.status());
            assert_eq!(
                "application/problem+json",
                response.headers()[CONTENT_TYPE.as_str()]
            );
        }
    }
}
