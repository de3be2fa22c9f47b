use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::MetadataStore;
use crate::configuration::MetadataCacheConfig;
use crate::domain::AuctionMetadata;
use crate::errors::CacheError;

const KEY_PREFIX: &str = "auction:";

/// Read side of the shared auction metadata cache. The lifecycle projector
/// owns the writes.
#[derive(Clone)]
pub struct AuctionMetadataCache {
    manager: ConnectionManager,
    get_timeout: Duration,
    get_timeout_ms: u64,
}

impl AuctionMetadataCache {
    pub async fn new(config: &MetadataCacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.cache_url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        info!("Connection to metadata cache has been established");

        Ok(Self {
            manager,
            get_timeout: Duration::from_millis(config.get_timeout_ms),
            get_timeout_ms: config.get_timeout_ms,
        })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut manager = self.manager.clone();
        let reply = tokio::time::timeout(
            self.get_timeout,
            redis::cmd("PING").query_async::<_, String>(&mut manager),
        )
        .await
        .map_err(|_| CacheError::Timeout(self.get_timeout_ms))??;
        debug!("metadata cache ping: {}", reply);
        Ok(())
    }

    fn key(auction_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, auction_id)
    }
}

#[async_trait]
impl MetadataStore for AuctionMetadataCache {
    async fn get(&self, auction_id: &str) -> Result<Option<AuctionMetadata>, CacheError> {
        let mut manager = self.manager.clone();

        let raw: Option<String> = tokio::time::timeout(
            self.get_timeout,
            manager.get(Self::key(auction_id)),
        )
        .await
        .map_err(|_| CacheError::Timeout(self.get_timeout_ms))??;

        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }
}
