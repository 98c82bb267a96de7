//! Redis-backed retry store.
//!
//! ## Configuration
//!
//! Environment variables:
//! - `REDIS_URL`: Redis connection URL (default: redis://localhost:6379/0)
//! - `REDIS_RESPONSE_TIMEOUT_SECS`: per-command response timeout (default: 5)

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::{ConnectionManager, ConnectionManagerConfig};
use redis::AsyncCommands;
use tracing::{debug, info};

use fintrack_core::defaults::{REDIS_RESPONSE_TIMEOUT_SECS, REDIS_URL};
use fintrack_core::{Error, Result, RetryStore};

/// Connection settings for [`RedisStore`].
#[derive(Debug, Clone, PartialEq)]
pub struct RedisStoreConfig {
    pub url: String,
    /// Upper bound on waiting for any single command's reply.
    pub response_timeout_secs: u64,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: REDIS_URL.to_string(),
            response_timeout_secs: REDIS_RESPONSE_TIMEOUT_SECS,
        }
    }
}

impl RedisStoreConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let url = std::env::var("REDIS_URL").unwrap_or(defaults.url);
        let response_timeout_secs = std::env::var("REDIS_RESPONSE_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(defaults.response_timeout_secs)
            .max(1);

        Self {
            url,
            response_timeout_secs,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    pub fn with_response_timeout(mut self, secs: u64) -> Self {
        self.response_timeout_secs = secs.max(1);
        self
    }

    fn response_timeout(&self) -> Duration {
        Duration::from_secs(self.response_timeout_secs)
    }
}

/// [`RetryStore`] over a Redis server.
///
/// Blocking pops go through their own connection: `BLPOP` parks the
/// connection it runs on, and counter/queue writes must not queue behind it.
/// That connection has no response timeout of its own; each pop is instead
/// bounded by its wait plus the configured response timeout.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    blocking: ConnectionManager,
    response_timeout: Duration,
}

impl RedisStore {
    /// Connect to `redis_url` with default settings.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        Self::connect_with(RedisStoreConfig::default().with_url(redis_url)).await
    }

    pub async fn connect_with(config: RedisStoreConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())?;
        let connection = ConnectionManager::new_with_config(
            client.clone(),
            ConnectionManagerConfig::new().set_response_timeout(config.response_timeout()),
        )
        .await?;
        let blocking = ConnectionManager::new(client).await?;

        info!(
            url = %config.url.replace(|c: char| c.is_ascii_alphanumeric(), "*"),
            response_timeout_secs = config.response_timeout_secs,
            "Connected to Redis retry store"
        );

        Ok(Self {
            connection,
            blocking,
            response_timeout: config.response_timeout(),
        })
    }

    /// Connect using [`RedisStoreConfig::from_env`].
    pub async fn from_env() -> Result<Self> {
        Self::connect_with(RedisStoreConfig::from_env()).await
    }
}

#[async_trait]
impl RetryStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn rpush(&self, queue: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.rpush::<_, _, ()>(queue, value).await?;
        debug!(queue, "RPUSH");
        Ok(())
    }

    async fn lpush(&self, queue: &str, value: &str) -> Result<()> {
        let mut conn = self.connection.clone();
        conn.lpush::<_, _, ()>(queue, value).await?;
        debug!(queue, "LPUSH");
        Ok(())
    }

    async fn blpop(&self, queue: &str, timeout: Duration) -> Result<Option<String>> {
        let mut conn = self.blocking.clone();
        let limit = timeout + self.response_timeout;
        let popped: Option<(String, String)> =
            tokio::time::timeout(limit, conn.blpop(queue, timeout.as_secs_f64()))
                .await
                .map_err(|_| {
                    Error::Store(format!("BLPOP on {} unanswered after {:?}", queue, limit))
                })??;
        Ok(popped.map(|(_, value)| value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = RedisStoreConfig::default();
        assert_eq!(config.url, "redis://localhost:6379/0");
        assert_eq!(config.response_timeout_secs, 5);
        assert_eq!(config.response_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_builder() {
        let config = RedisStoreConfig::default()
            .with_url("redis://broker:6380/2")
            .with_response_timeout(2);
        assert_eq!(config.url, "redis://broker:6380/2");
        assert_eq!(config.response_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_zero_response_timeout_is_clamped() {
        let config = RedisStoreConfig::default().with_response_timeout(0);
        assert_eq!(config.response_timeout_secs, 1);
    }

    #[tokio::test]
    async fn test_connect_rejects_malformed_url() {
        let result = RedisStore::connect_with(RedisStoreConfig::default().with_url("not-a-url")).await;
        assert!(matches!(result, Err(Error::Store(_))));
    }
}
