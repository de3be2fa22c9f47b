use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub broker_url: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_lifecycle_queue")]
    pub lifecycle_queue: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetadataCacheConfig {
    pub cache_url: String,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
    /// Extra seconds a key outlives the auction end.
    #[serde(default = "default_ttl_buffer_secs")]
    pub ttl_buffer_secs: u64,
    /// How long closed auctions are kept around.
    #[serde(default = "default_closed_retention_secs")]
    pub closed_retention_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusExporter {
    bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    broker: BrokerConfig,
    metadata_cache: MetadataCacheConfig,
    prometheus_exporter: PrometheusExporter,
}

impl Configuration {
    pub fn new(filename: &str) -> Result<Self> {
        Ok(Config::builder()
            .add_source(config::File::with_name(filename))
            .add_source(
                Environment::with_prefix("ap")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize::<Configuration>()?)
    }

    pub fn get_broker_config(&self) -> &BrokerConfig {
        &self.broker
    }

    pub fn get_metadata_cache_config(&self) -> &MetadataCacheConfig {
        &self.metadata_cache
    }

    pub fn get_prometheus_exporter_bind_address(&self) -> String {
        self.prometheus_exporter.bind_address.clone()
    }
}

fn default_exchange() -> String {
    "bidding".to_string()
}

fn default_lifecycle_queue() -> String {
    "auction.lifecycle".to_string()
}

fn default_op_timeout_ms() -> u64 {
    500
}

fn default_ttl_buffer_secs() -> u64 {
    900
}

fn default_closed_retention_secs() -> u64 {
    3600
}
