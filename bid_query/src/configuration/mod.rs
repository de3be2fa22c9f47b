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
pub struct ReadStorageConfig {
    pub database_url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "default_query_timeout_ms")]
    pub query_timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PrometheusExporter {
    bind_address: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Configuration {
    http_server: HttpServerConfig,
    read_storage: ReadStorageConfig,
    prometheus_exporter: PrometheusExporter,
}

impl Configuration {
    pub fn new(filename: &str) -> Result<Self> {
        Ok(Config::builder()
            .add_source(config::File::with_name(filename))
            .add_source(
                Environment::with_prefix("bq")
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

    pub fn get_read_storage_config(&self) -> &ReadStorageConfig {
        &self.read_storage
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

fn default_query_timeout_ms() -> u64 {
    2000
}
