use chrono::{DateTime, Utc};
use hyper::{header::CONTENT_TYPE, Body, Request, Response, StatusCode};
use log::error;
use serde::Serialize;

use super::{problem, AppCtx};
use crate::application::list_bids::{BidItem, Direction, ListResult, Query};
use crate::errors::ListBidsError;
use crate::prometheus::{INVALID_CURSOR_COUNT, LIST_BIDS_TIME};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ItemDto {
    bid_id: String,
    auction_id: String,
    bidder_id: String,
    amount: f64,
    at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ListBidsResponse {
    items: Vec<ItemDto>,
    has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_cursor: Option<String>,
}

pub async fn handle(ctx: &AppCtx, auction_id: String, req: Request<Body>) -> Response<Body> {
    let mut cursor = String::new();
    let mut limit: i64 = 0;
    let mut direction = Direction::Desc;

    let query_string = req.uri().query().unwrap_or("");
    for (key, value) in url::form_urlencoded::parse(query_string.as_bytes()) {
        match key.as_ref() {
            "cursor" => cursor = value.into_owned(),
            "limit" => match value.parse::<i64>() {
                Ok(parsed) => limit = parsed,
                Err(_) => {
                    return problem(
                        StatusCode::BAD_REQUEST,
                        "Invalid query",
                        "limit must be an integer",
                    )
                }
            },
            "direction" => match value.to_ascii_lowercase().as_str() {
                "asc" => direction = Direction::Asc,
                "desc" => direction = Direction::Desc,
                _ => {
                    return problem(
                        StatusCode::BAD_REQUEST,
                        "Invalid query",
                        "direction must be ASC or DESC",
                    )
                }
            },
            _ => {}
        }
    }

    let timer = LIST_BIDS_TIME.start_timer();
    let result = ctx
        .list_bids
        .handle(Query {
            auction_id,
            cursor,
            limit,
            direction,
        })
        .await;
    timer.observe_duration();

    match result {
        Ok(result) => ok_response(result),
        Err(ListBidsError::InvalidCursor) => {
            INVALID_CURSOR_COUNT.inc();
            problem(
                StatusCode::BAD_REQUEST,
                "Invalid cursor",
                "The cursor is malformed or truncated",
            )
        }
        Err(err) => {
            error!("list bids failed: {}", err);
            problem(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                "The listing could not be served",
            )
        }
    }
}

fn ok_response(result: ListResult) -> Response<Body> {
    let next_cursor = result.next_cursor.clone();
    let response = ListBidsResponse {
        items: result.items.into_iter().map(item_dto).collect(),
        has_more: result.has_more,
        next_cursor: result.next_cursor,
    };

    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(CONTENT_TYPE, "application/json");
    if let Some(next) = next_cursor {
        builder = builder.header("X-Next-Cursor", next);
    }

    builder
        .body(Body::from(serde_json::to_string(&response).unwrap()))
        .unwrap()
}

fn item_dto(item: BidItem) -> ItemDto {
    ItemDto {
        bid_id: item.bid_id,
        auction_id: item.auction_id,
        bidder_id: item.bidder_id,
        amount: item.amount,
        at: item.at,
    }
}
