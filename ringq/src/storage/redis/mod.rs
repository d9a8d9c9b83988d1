//! Redis store
//!
//! [`Store`] implementation backed by `fred` connection pools.

use super::Store;
use crate::{Error, Result};
use async_trait::async_trait;
use fred::{
    interfaces::*,
    prelude::*,
    types::{RedisConfig as FredRedisConfig, ReconnectPolicy, SetOptions},
};
use std::sync::Arc;
use std::time::Duration;

/// Redis connection configuration
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Redis connection URL
    pub url: String,
    /// Connection pool size for ordinary commands
    pub pool_size: usize,
    /// Connection pool size reserved for blocking pops
    pub blocking_pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
            blocking_pool_size: 4,
        }
    }
}

impl RedisConfig {
    /// Create a configuration for the given URL with default pool sizes
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the ordinary pool size
    #[must_use]
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    /// Set the blocking pool size
    #[must_use]
    pub fn with_blocking_pool_size(mut self, size: usize) -> Self {
        self.blocking_pool_size = size;
        self
    }

    /// Validate pool settings
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(Error::Config("redis url cannot be empty".into()));
        }
        if self.pool_size == 0 {
            return Err(Error::Config("pool_size must be greater than 0".into()));
        }
        if self.blocking_pool_size == 0 {
            return Err(Error::Config("blocking_pool_size must be greater than 0".into()));
        }
        Ok(())
    }
}

/// Redis-backed store
///
/// Blocking pops run on their own pool: a BRPOP parks its connection, and
/// commands queued behind it on the same connection would stall.
#[derive(Clone)]
pub struct RedisStore {
    pool: Arc<RedisPool>,
    blocking: Arc<RedisPool>,
}

impl RedisStore {
    /// Connect both pools and verify the server answers
    pub async fn new(config: RedisConfig) -> Result<Self> {
        config.validate()?;

        let redis_config = FredRedisConfig::from_url(&config.url)?;
        let pool = RedisPool::new(
            redis_config.clone(),
            None,
            None,
            Some(ReconnectPolicy::default()),
            config.pool_size,
        )?;
        let blocking = RedisPool::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::default()),
            config.blocking_pool_size,
        )?;

        pool.init().await?;
        blocking.init().await?;

        let store = Self {
            pool: Arc::new(pool),
            blocking: Arc::new(blocking),
        };
        store.ping().await?;
        tracing::info!("Connected to Redis at {}", config.url);

        Ok(store)
    }

    /// Create store from connection URL
    pub async fn from_url(url: impl Into<String>) -> Result<Self> {
        Self::new(RedisConfig::new(url)).await
    }

    /// Get the underlying Redis connection pool
    pub fn pool(&self) -> &Arc<RedisPool> {
        &self.pool
    }

    /// Ping Redis
    pub async fn ping(&self) -> Result<String> {
        let result: String = self.pool.ping().await?;
        Ok(result)
    }

    /// WATCH / EXISTS / MULTI / LPUSH / EXEC on one connection
    async fn seed_watched(client: &RedisClient, key: &str, value: &str) -> Result<bool> {
        let _: RedisValue = client.custom(fred::cmd!("WATCH"), vec![key]).await?;

        let exists: bool = client.exists(key).await?;
        if exists {
            let _: RedisValue = client.custom(fred::cmd!("UNWATCH"), Vec::<String>::new()).await?;
            return Ok(false);
        }

        let trx = client.multi();
        let _: RedisValue = trx.lpush(key, value).await?;
        let result: RedisValue = trx.exec(true).await?;

        // EXEC answers nil when the watched key changed
        Ok(!result.is_null())
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn set_nx(&self, key: &str, value: &str) -> Result<bool> {
        let result: Option<String> = self
            .pool
            .set(key, value, None, Some(SetOptions::NX), false)
            .await?;
        Ok(result.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let result: Option<String> = self.pool.get(key).await?;
        Ok(result)
    }

    async fn get_set(&self, key: &str, value: &str) -> Result<Option<String>> {
        let result: Option<String> = self.pool.getset(key, value).await?;
        Ok(result)
    }

    async fn del(&self, key: &str) -> Result<u64> {
        let result: u64 = self.pool.del(key).await?;
        Ok(result)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let result: bool = self.pool.exists(key).await?;
        Ok(result)
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<u64> {
        let result: u64 = self.pool.sadd(key, member).await?;
        Ok(result)
    }

    async fn srem(&self, key: &str, member: &str) -> Result<u64> {
        let result: u64 = self.pool.srem(key, member).await?;
        Ok(result)
    }

    async fn lpush(&self, key: &str, value: &str) -> Result<u64> {
        let result: u64 = self.pool.lpush(key, value).await?;
        Ok(result)
    }

    async fn rpush(&self, key: &str, value: &str) -> Result<u64> {
        let result: u64 = self.pool.rpush(key, value).await?;
        Ok(result)
    }

    async fn brpop(&self, key: &str, timeout: Option<Duration>) -> Result<Option<String>> {
        // 0 tells Redis to wait forever
        let timeout = timeout.map(|t| t.as_secs_f64()).unwrap_or(0.0);
        let result: Option<(String, String)> = self.blocking.brpop(key, timeout).await?;
        Ok(result.map(|(_, value)| value))
    }

    async fn rpoplpush(&self, source: &str, destination: &str) -> Result<Option<String>> {
        let result: Option<String> = self.pool.rpoplpush(source, destination).await?;
        Ok(result)
    }

    async fn lrem(&self, key: &str, count: i64, value: &str) -> Result<u64> {
        let result: u64 = self.pool.lrem(key, count, value).await?;
        Ok(result)
    }

    async fn lrange(&self, key: &str, start: i64, stop: i64) -> Result<Vec<String>> {
        let result: Vec<String> = self.pool.lrange(key, start, stop).await?;
        Ok(result)
    }

    async fn llen(&self, key: &str) -> Result<u64> {
        let result: u64 = self.pool.llen(key).await?;
        Ok(result)
    }

    async fn lpush_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        // WATCH state lives on the connection, so the transaction gets its own
        let client = self.pool.next().clone_new();
        let _connection = client.init().await?;

        let result = Self::seed_watched(&client, key, value).await;

        if let Err(e) = client.quit().await {
            tracing::warn!("Failed to close transaction connection: {}", e);
        }
        result
    }
}
