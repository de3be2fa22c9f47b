use anyhow::Result;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Response, Server,
};
use lazy_static::lazy_static;
use log::{error, info};
use prometheus::{
    register_int_counter, register_int_counter_vec, Encoder, IntCounter, IntCounterVec,
    TextEncoder,
};

use crate::register::Register;

lazy_static! {
    pub static ref EVENTS_PROJECTED_COUNT: IntCounterVec = register_int_counter_vec!(
        "auction_projector_events_projected_count",
        "Number of lifecycle events applied to the metadata cache",
        &["event"]
    )
    .unwrap();
    pub static ref STALE_EVENTS_COUNT: IntCounter = register_int_counter!(
        "auction_projector_stale_events_count",
        "Number of lifecycle events skipped because the cache was newer"
    )
    .unwrap();
    pub static ref POISON_MESSAGES_COUNT: IntCounter = register_int_counter!(
        "auction_projector_poison_messages_count",
        "Number of undecodable messages dropped"
    )
    .unwrap();
    pub static ref PROJECTION_RETRIES_COUNT: IntCounter = register_int_counter!(
        "auction_projector_projection_retries_count",
        "Number of deliveries requeued after a cache failure"
    )
    .unwrap();
}

pub struct PrometheusExporter {}

impl PrometheusExporter {
    pub async fn run(register: &Register) -> Result<()> {
        let addr = register
            .config
            .get_prometheus_exporter_bind_address()
            .parse()
            .unwrap();

        tokio::spawn(async move {
            info!("Prometheus exporter started on http://{}", &addr);

            if let Err(err) = Server::bind(&addr)
                .serve(make_service_fn(|_| async {
                    Ok::<_, hyper::Error>(service_fn(|_| async {
                        let encoder = TextEncoder::new();
                        let metric_families = prometheus::gather();
                        let mut buffer = Vec::new();

                        encoder.encode(&metric_families, &mut buffer).unwrap();

                        let response = Response::builder()
                            .status(200)
                            .header(CONTENT_TYPE, encoder.format_type())
                            .body(Body::from(buffer))
                            .unwrap();

                        Ok::<_, hyper::Error>(response)
                    }))
                }))
                .await
            {
                error!("Server error: {}", err);
            }
        });

        Ok(())
    }
}
