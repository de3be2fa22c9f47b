use std::time::Duration;

use hyper::{header::CONTENT_TYPE, Body, Response, StatusCode};
use sqlx::postgres::PgPool;

use crate::actors::bids_publisher::BidsPublisherHandle;
use crate::storages::metadata_cache::AuctionMetadataCache;

const PING_TIMEOUT_MS: u64 = 500;

/// Dependency handles pinged by the readiness probe.
pub struct Readiness {
    pub pool: PgPool,
    pub cache: AuctionMetadataCache,
    pub publisher: BidsPublisherHandle,
}

pub fn healthz() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from("ok"))
        .unwrap()
}

pub async fn readyz(readiness: &Readiness) -> Response<Body> {
    let mut checks = serde_json::Map::new();
    let mut ready = true;

    let postgres = tokio::time::timeout(
        Duration::from_millis(PING_TIMEOUT_MS),
        sqlx::query("SELECT 1").execute(&readiness.pool),
    )
    .await;
    let postgres = match postgres {
        Ok(Ok(_)) => "ok".to_string(),
        Ok(Err(err)) => format!("error: {}", err),
        Err(_) => "timeout".to_string(),
    };
    ready &= postgres == "ok";
    checks.insert("postgres".to_string(), postgres.into());

    let cache = match readiness.cache.ping().await {
        Ok(()) => "ok".to_string(),
        Err(err) => format!("error: {}", err),
    };
    ready &= cache == "ok";
    checks.insert("cache".to_string(), cache.into());

    let broker = if readiness.publisher.ping().await {
        "ok"
    } else {
        "disconnected"
    };
    ready &= broker == "ok";
    checks.insert("broker".to_string(), broker.into());

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if ready { "ready" } else { "not_ready" },
        "checks": checks,
    });

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
