use anyhow::Result;
use hyper::{
    header::CONTENT_TYPE,
    service::{make_service_fn, service_fn},
    Body, Response, Server,
};
use lazy_static::lazy_static;
use log::{error, info};
use prometheus::{
    register_histogram, register_int_counter, Encoder, Histogram, IntCounter, TextEncoder,
};

use crate::register::Register;

lazy_static! {
    pub static ref LIST_BIDS_TIME: Histogram = register_histogram!(
        "bid_query_list_bids_time",
        "Time spent in seconds serving one listing request"
    )
    .unwrap();
    pub static ref INVALID_CURSOR_COUNT: IntCounter = register_int_counter!(
        "bid_query_invalid_cursor_count",
        "Number of listing requests rejected for a malformed cursor"
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
