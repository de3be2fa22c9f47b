use std::time::Duration;

use async_trait::async_trait;
use log::info;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};

use super::{AuctionMetadata, MetadataCache};
use crate::configuration::MetadataCacheConfig;
use crate::errors::CacheError;

const KEY_PREFIX: &str = "auction:";

// Writes the key only when the incoming version is at least the stored one;
// the whole compare-and-swap runs as one atomic unit inside the store.
const SET_IF_NEWER_SCRIPT: &str = r#"
local key = KEYS[1]
local version = tonumber(ARGV[1])
local value = ARGV[2]
local ttlsec = tonumber(ARGV[3])

local cur = redis.call('GET', key)
if cur then
  local ok, obj = pcall(cjson.decode, cur)
  if ok and obj['version'] and tonumber(obj['version']) > version then
    return 0
  end
end
redis.call('SET', key, value)
if ttlsec > 0 then
  redis.call('EXPIRE', key, ttlsec)
end
return 1
"#;

pub struct RedisMetadataCache {
    manager: ConnectionManager,
    set_if_newer: Script,
    op_timeout: Duration,
    op_timeout_ms: u64,
}

impl RedisMetadataCache {
    pub async fn new(config: &MetadataCacheConfig) -> Result<Self, CacheError> {
        let client = redis::Client::open(config.cache_url.as_str())?;
        let manager = ConnectionManager::new(client).await?;

        info!("Connection to metadata cache has been established");

        Ok(Self {
            manager,
            set_if_newer: Script::new(SET_IF_NEWER_SCRIPT),
            op_timeout: Duration::from_millis(config.op_timeout_ms),
            op_timeout_ms: config.op_timeout_ms,
        })
    }

    fn key(auction_id: &str) -> String {
        format!("{}{}", KEY_PREFIX, auction_id)
    }
}

#[async_trait]
impl MetadataCache for RedisMetadataCache {
    async fn get(&self, auction_id: &str) -> Result<Option<AuctionMetadata>, CacheError> {
        let mut manager = self.manager.clone();

        let raw: Option<String> =
            tokio::time::timeout(self.op_timeout, manager.get(Self::key(auction_id)))
                .await
                .map_err(|_| CacheError::Timeout(self.op_timeout_ms))??;

        match raw {
            None => Ok(None),
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        }
    }

    async fn set_if_newer(
        &self,
        auction_id: &str,
        metadata: &AuctionMetadata,
        ttl: Duration,
    ) -> Result<bool, CacheError> {
        let raw = serde_json::to_string(metadata)?;
        let mut manager = self.manager.clone();

        let mut invocation = self.set_if_newer.prepare_invoke();
        invocation
            .key(Self::key(auction_id))
            .arg(metadata.version)
            .arg(raw)
            .arg(ttl.as_secs());

        let applied: i64 =
            tokio::time::timeout(self.op_timeout, invocation.invoke_async(&mut manager))
                .await
                .map_err(|_| CacheError::Timeout(self.op_timeout_ms))??;

        Ok(applied == 1)
    }

    async fn delete(&self, auction_id: &str) -> Result<(), CacheError> {
        let mut manager = self.manager.clone();
        let _: i64 = tokio::time::timeout(self.op_timeout, manager.del(Self::key(auction_id)))
            .await
            .map_err(|_| CacheError::Timeout(self.op_timeout_ms))??;
        Ok(())
    }
}
