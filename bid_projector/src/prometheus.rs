use anyhow::Result;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Response, Server,
};
use lazy_static::lazy_static;
use log::{error, info};
use prometheus::{register_int_counter, Encoder, IntCounter, TextEncoder};

use crate::register::Register;

lazy_static! {
    pub static ref BIDS_PROJECTED_COUNT: IntCounter = register_int_counter!(
        "bid_projector_bids_projected_count",
        "Number of bids materialized into the history read model"
    )
    .unwrap();
    pub static ref DUPLICATE_BIDS_COUNT: IntCounter = register_int_counter!(
        "bid_projector_duplicate_bids_count",
        "Number of replayed bids absorbed by the unique index"
    )
    .unwrap();
    pub static ref POISON_MESSAGES_COUNT: IntCounter = register_int_counter!(
        "bid_projector_poison_messages_count",
        "Number of undecodable messages dropped"
    )
    .unwrap();
    pub static ref PROJECTION_RETRIES_COUNT: IntCounter = register_int_counter!(
        "bid_projector_projection_retries_count",
        "Number of deliveries requeued after a storage failure"
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
