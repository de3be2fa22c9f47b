use std::time::Duration;

use hyper::{header::CONTENT_TYPE, Body, Response, StatusCode};
use sqlx::postgres::PgPool;

const PING_TIMEOUT_MS: u64 = 500;

pub struct Readiness {
    pub pool: PgPool,
}

pub fn healthz() -> Response<Body> {
    Response::builder()
        .status(StatusCode::OK)
        .body(Body::from("ok"))
        .unwrap()
}

pub async fn readyz(readiness: &Readiness) -> Response<Body> {
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

    let ready = postgres == "ok";
    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let body = serde_json::json!({
        "status": if ready { "ready" } else { "not_ready" },
        "checks": { "postgres": postgres },
    });

    Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}
