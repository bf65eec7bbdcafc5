// src/cache/redis_cache.rs - Redis-backed cache store and lock primitive

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::time::Duration;
use tracing::{debug, info};

use super::{CacheError, CacheResult, CacheStore};

/// Deletes the lock key only when it still holds the caller's token.
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
else
    return 0
end
"#;

/// Shared Redis connection.
///
/// `ConnectionManager` multiplexes one connection and reconnects on failure;
/// cloning it is cheap and every operation works on its own clone.
#[derive(Clone)]
pub struct RedisCache {
    client: ConnectionManager,
}

impl RedisCache {
    /// Connect to Redis.
    pub async fn connect(redis_url: &str) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        info!(url = %redact_url(redis_url), "Redis cache connected");
        Ok(Self { client: manager })
    }

    /// Ping the server
    pub async fn health_check(&self) -> CacheResult<String> {
        let mut conn = self.client.clone();
        let result: String = redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(result)
    }
}

fn ttl_millis(ttl: Duration) -> CacheResult<u64> {
    let ms = ttl.as_millis();
    if ms == 0 {
        return Err(CacheError::Unavailable("TTL must be at least 1ms".to_string()));
    }
    Ok(ms.min(u64::MAX as u128) as u64)
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut conn = self.client.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut conn = self.client.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl)?)
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        let mut conn = self.client.clone();
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(lease)?)
            .query_async(&mut conn)
            .await?;
        debug!(key, acquired = reply.is_some(), "SET NX");
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> CacheResult<bool> {
        let mut conn = self.client.clone();
        let deleted: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(deleted == 1)
    }

    fn backend_name(&self) -> &'static str {
        "redis"
    }
}

/// Hide the password part of a redis URL for logging
fn redact_url(url: &str) -> String {
    match (url.find("://"), url.rfind('@')) {
        (Some(scheme_end), Some(at)) if at > scheme_end => {
            format!("{}://***{}", &url[..scheme_end], &url[at..])
        }
        _ => url.to_string(),
    }
}
