use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;
use log::{error, info};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::actors::bids_publisher::BidsPublisherHandle;
use crate::actors::prometheus_exporter::PrometheusExporterHandle;
use crate::application::place_bid::PlaceBidService;
use crate::http::health::Readiness;
use crate::http::{self, AppCtx};
use crate::register::Register;
use crate::storages::bid_repository::{connect_bid_storage, PgBidRepository};
use crate::storages::metadata_cache::AuctionMetadataCache;

pub struct BiddingCtx {
    shutdown: watch::Sender<bool>,
    server_handle: JoinHandle<()>,
    grace: Duration,
}

impl BiddingCtx {
    pub async fn setup_and_run(register: &Register) -> Result<Self> {
        let pool = connect_bid_storage(register.config.get_bid_storage_config()).await?;
        let cache = AuctionMetadataCache::new(register.config.get_metadata_cache_config()).await?;
        let publisher = BidsPublisherHandle::new(register).await?;
        PrometheusExporterHandle::new(register).await?;

        let place_bid = PlaceBidService::new(
            Arc::new(cache.clone()),
            Arc::new(PgBidRepository::new(pool.clone())),
            Arc::new(publisher.clone()),
            register.config.get_bid_storage_config().insert_timeout_ms,
        );

        let app = Arc::new(AppCtx {
            place_bid,
            readiness: Readiness {
                pool,
                cache,
                publisher,
            },
        });

        let http_config = register.config.get_http_server_config();
        let addr: SocketAddr = http_config.bind_address.parse()?;
        let grace = Duration::from_secs(http_config.shutdown_grace_secs);

        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let make_svc = make_service_fn(move |_| {
            let app = app.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| {
                    let app = app.clone();
                    async move { Ok::<_, Infallible>(http::route(app, req).await) }
                }))
            }
        });

        let server = Server::bind(&addr).serve(make_svc);
        info!("Bid command API started on http://{}", addr);

        let graceful = server.with_graceful_shutdown(async move {
            let _ = shutdown_rx.changed().await;
        });

        let server_handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                error!("Server error: {}", err);
            }
        });

        Ok(Self {
            shutdown,
            server_handle,
            grace,
        })
    }

    /// Stops accepting requests and waits for in-flight ones to drain.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if tokio::time::timeout(self.grace, self.server_handle)
            .await
            .is_err()
        {
            error!("HTTP server did not drain within the grace period");
        }
    }
}
