use anyhow::Result;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Response, Server,
};
use lazy_static::lazy_static;
use log::{error, info};
use prometheus::{
    register_histogram_with_registry, register_int_counter_vec_with_registry,
    register_int_counter_with_registry, Encoder, Histogram, IntCounter, IntCounterVec, Registry,
    TextEncoder,
};

use crate::register::Register;

struct PrometheusExporter {
    bind_address: String,
}

lazy_static! {
    pub static ref REGISTRY: Registry =
        Registry::new_custom(Some("bid_command".to_string()), None).unwrap();
    pub static ref BIDS_ACCEPTED_COUNT: IntCounter = register_int_counter_with_registry!(
        "bids_accepted_count",
        "Number of bids accepted and committed",
        REGISTRY
    )
    .unwrap();
    pub static ref BIDS_REJECTED_COUNT: IntCounterVec = register_int_counter_vec_with_registry!(
        "bids_rejected_count",
        "Number of bids rejected, by reason",
        &["reason"],
        REGISTRY
    )
    .unwrap();
    pub static ref BIDS_REPLAYED_COUNT: IntCounter = register_int_counter_with_registry!(
        "bids_replayed_count",
        "Number of idempotent replays answered from the stored bid",
        REGISTRY
    )
    .unwrap();
    pub static ref PUBLISH_FAILURES_COUNT: IntCounter = register_int_counter_with_registry!(
        "publish_failures_count",
        "Number of bids.placed events that failed to publish after commit",
        REGISTRY
    )
    .unwrap();
    pub static ref PLACE_BID_TIME: Histogram = register_histogram_with_registry!(
        "place_bid_time",
        "Time spent in seconds handling one PlaceBid command",
        REGISTRY
    )
    .unwrap();
}

#[macro_export]
macro_rules! metrics_update {
    ( inc $metric:ident ) => {
        $crate::actors::prometheus_exporter::$metric.inc();
    };

    ( inc $metric:ident, $labels:expr) => {
        $crate::actors::prometheus_exporter::$metric
            .with_label_values($labels)
            .inc();
    };

    ( timer $metric:ident) => {
        $crate::actors::prometheus_exporter::$metric.start_timer()
    };

    ( timer observe $timer:ident) => {
        $timer.observe_duration()
    };
}

impl PrometheusExporter {
    async fn new(register: &Register) -> Result<Self> {
        let bind_address = register.config.get_prometheus_exporter_bind_address();
        Ok(PrometheusExporter { bind_address })
    }

    async fn start_server(&self) {
        let addr = self.bind_address.parse().unwrap();

        let prometheus_join_handle = tokio::spawn(async move {
            info!("Prometheus exporter started on http://{}", addr);

            let serve_future = Server::bind(&addr).serve(make_service_fn(|_| async {
                Ok::<_, hyper::Error>(service_fn(|_req| async {
                    let encoder = TextEncoder::new();

                    let metric_families = REGISTRY.gather();
                    let mut buffer = vec![];

                    encoder.encode(&metric_families, &mut buffer).unwrap();

                    let response = Response::builder()
                        .status(200)
                        .header(CONTENT_TYPE, encoder.format_type())
                        .body(Body::from(buffer))
                        .unwrap();

                    Ok::<_, hyper::Error>(response)
                }))
            }));

            if let Err(err) = serve_future.await {
                error!("Server error: {}", err);
            }
        });

        if let Err(err) = prometheus_join_handle.await {
            error!("Prometheus exporter has been killed: {}", err);
        }
    }

    async fn run(&mut self) {
        self.start_server().await;
    }
}

#[derive(Clone)]
pub struct PrometheusExporterHandle {}

impl PrometheusExporterHandle {
    pub async fn new(register: &Register) -> Result<Self> {
        let mut prometheus_exporter = PrometheusExporter::new(register).await?;

        tokio::spawn(async move { prometheus_exporter.run().await });

        Ok(Self {})
    }
}
