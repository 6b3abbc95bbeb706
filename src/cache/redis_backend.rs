//! Redis cache backend over a deadpool connection pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use deadpool_redis::{Config as PoolConfig, Pool, Runtime};
use redis::AsyncCommands;

use super::{CacheError, CacheStore};

/// Compare-and-delete; GET then DEL would let two readers both match.
const CONSUME_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
end
return 0
"#;

#[derive(Clone)]
pub struct RedisCache {
    pool: Pool,
    key_prefix: String,
}

impl RedisCache {
    pub fn new(connection_url: impl Into<String>) -> Result<Self, CacheError> {
        let pool = PoolConfig::from_url(connection_url.into())
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| CacheError::Pool(format!("Failed to create Redis pool: {}", e)))?;
        Ok(Self {
            pool,
            key_prefix: String::new(),
        })
    }

    /// Namespace every key as `<prefix>:<key>`.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn build_key(&self, key: &str) -> String {
        if self.key_prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}:{}", self.key_prefix, key)
        }
    }

    async fn conn(&self) -> Result<deadpool_redis::Connection, CacheError> {
        self.pool
            .get()
            .await
            .map_err(|e| CacheError::Pool(format!("Failed to get connection from pool: {}", e)))
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.conn().await?;
        let value: Option<String> = conn.get(self.build_key(key)).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let seconds = ttl.as_secs().max(1);
        let _: () = conn.set_ex(self.build_key(key), value, seconds).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.conn().await?;
        let _: () = conn.del(self.build_key(key)).await?;
        Ok(())
    }

    async fn consume(&self, key: &str, expected: &str) -> Result<bool, CacheError> {
        let mut conn = self.conn().await?;
        let removed: i64 = redis::Script::new(CONSUME_SCRIPT)
            .key(self.build_key(key))
            .arg(expected)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), CacheError> {
        if keys.is_empty() {
            return Ok(());
        }
        let full_keys: Vec<String> = keys.iter().map(|k| self.build_key(k)).collect();
        let mut conn = self.conn().await?;
        let _: () = conn.del(full_keys).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<Duration, CacheError> {
        let start = Instant::now();
        let mut conn = self.conn().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(start.elapsed())
    }
}
