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

use crate::application::list_bids::ListBidsService;
use crate::http::health::Readiness;
use crate::http::{self, AppCtx};
use crate::prometheus::PrometheusExporter;
use crate::register::Register;
use crate::storages::bid_read_storage::{connect_read_storage, PgBidReadStorage};

pub struct QueryServingCtx {
    shutdown: watch::Sender<bool>,
    server_handle: JoinHandle<()>,
    grace: Duration,
}

impl QueryServingCtx {
    pub async fn setup_and_run(register: &Register) -> Result<Self> {
        PrometheusExporter::run(register).await?;

        let storage_config = register.config.get_read_storage_config();
        let pool = connect_read_storage(storage_config).await?;
        let list_bids =
            ListBidsService::new(Arc::new(PgBidReadStorage::new(pool.clone(), storage_config)));

        let app = Arc::new(AppCtx {
            list_bids,
            readiness: Readiness { pool },
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
        info!("Bid query API started on http://{}", addr);

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
