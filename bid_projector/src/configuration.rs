use anyhow::Result;
use config::{Config, Environment};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    pub broker_url: String,
    #[serde(default = "default_exchange")]
    pub exchange: String,
    #[serde(default = "default_bids_placed_queue")]
    pub bids_placed_queue: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryStorageConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_op_timeout_ms")]
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusExporter {
    bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    broker: BrokerConfig,
    history_storage: HistoryStorageConfig,
    prometheus_exporter: PrometheusExporter,
}

impl Configuration {
    pub fn new(filename: &str) -> Result<Self> {
        Ok(Config::builder()
            .add_source(config::File::with_name(filename))
            .add_source(
                Environment::with_prefix("bp")
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

    pub fn get_history_storage_config(&self) -> &HistoryStorageConfig {
        &self.history_storage
    }

    pub fn get_prometheus_exporter_bind_address(&self) -> String {
        self.prometheus_exporter.bind_address.clone()
    }
}

fn default_exchange() -> String {
    "bidding".to_string()
}

fn default_bids_placed_queue() -> String {
    "bids.placed".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_op_timeout_ms() -> u64 {
    2000
}
