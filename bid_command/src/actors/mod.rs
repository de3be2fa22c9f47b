pub mod bids_publisher;
pub mod prometheus_exporter;
