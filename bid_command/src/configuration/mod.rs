use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct HttpServerConfig {
    pub bind_address: String,
    #[serde(default = "default_shutdown_grace_secs")]
    pub shutdown_grace_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BidStorageConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_insert_timeout_ms")]
    pub insert_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataCacheConfig {
    pub cache_url: String,
    #[serde(default = "default_get_timeout_ms")]
    pub get_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub broker_url: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_bids_placed_topic")]
    pub bids_placed_topic: String,
    #[serde(default = "default_publish_timeout_ms")]
    pub publish_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusExporter {
    bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    http_server: HttpServerConfig,
    bid_storage: BidStorageConfig,
    metadata_cache: MetadataCacheConfig,
    broker: BrokerConfig,
    prometheus_exporter: PrometheusExporter,
}

impl Configuration {
    pub fn new(filename: &str) -> Result<Self> {
        Ok(Config::builder()
            .add_source(config::File::with_name(filename))
            .add_source(
                Environment::with_prefix("bc")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Configuration>()?)
    }

    pub fn get_http_server_config(&self) -> &HttpServerConfig {
        &self.http_server
    }

    pub fn get_bid_storage_config(&self) -> &BidStorageConfig {
        &self.bid_storage
    }

    pub fn get_metadata_cache_config(&self) -> &MetadataCacheConfig {
        &self.metadata_cache
    }

    pub fn get_broker_config(&self) -> &BrokerConfig {
        &self.broker
    }

    pub fn get_prometheus_exporter_bind_address(&self) -> String {
        self.prometheus_exporter.bind_address.clone()
    }
}

fn default_shutdown_grace_secs() -> u64 {
    10
}

fn default_max_connections() -> u32 {
    10
}

fn default_insert_timeout_ms() -> u64 {
    5000
}

fn default_get_timeout_ms() -> u64 {
    500
}

fn default_exchange() -> String {
    "bidding".to_string()
}

fn default_bids_placed_topic() -> String {
    "bids.placed".to_string()
}

fn default_publish_timeout_ms() -> u64 {
    3000
}
