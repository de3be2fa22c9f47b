pub mod health;
pub mod place_bid;

use std::sync::Arc;

use hyper::{header::CONTENT_TYPE, Body, Method, Request, Response, StatusCode};

use crate::application::place_bid::PlaceBidService;
use health::Readiness;

pub struct AppCtx {
    pub place_bid: PlaceBidService,
    pub readiness: Readiness,
}

pub async fn route(ctx: Arc<AppCtx>, req: Request<Body>) -> Response<Body> {
    let path = req.uri().path().to_string();
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    match segments.as_slice() {
        ["auctions", auction_id, "bids"] if req.method() == Method::POST => {
            place_bid::handle(&ctx, auction_id.to_string(), req).await
        }
        ["healthz"] if req.method() == Method::GET => health::healthz(),
        ["readyz"] if req.method() == Method::GET => health::readyz(&ctx.readiness).await,
        _ => problem(StatusCode::NOT_FOUND, "Route not found", "No such route"),
    }
}

/// RFC 7807 problem document.
pub fn problem(status: StatusCode, title: &str, detail: &str) -> Response<Body> {
    let body = serde_json::json!({
        "type": "about:blank",
        "title": title,
        "status": status.as_u16(),
        "detail": detail,
    });

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/problem+json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
