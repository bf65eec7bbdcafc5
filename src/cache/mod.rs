// src/cache/mod.rs
//! Cache store abstraction shared by the semantic cache, the page-context
//! cache and the session lock.
//!
//! Two backends implement [`CacheStore`]:
//! - [`RedisCache`]: shared Redis connection manager (production)
//! - [`MemoryCacheStore`]: in-process map with TTLs (development, tests)

pub mod keys;
pub mod memory;
pub mod redis_cache;

pub use memory::MemoryCacheStore;
pub use redis_cache::RedisCache;

use std::time::Duration;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Key/value store with per-entry expiry and lease-based locks.
///
/// Implementations must be safe for concurrent use without extra locking.
/// Concurrent writes to the same key are last-writer-wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> CacheResult<Option<String>>;

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()>;

    async fn delete(&self, key: &str) -> CacheResult<()>;

    /// Set `key` to `token` only if absent, expiring after `lease`.
    /// Returns true if the caller now holds the key.
    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> CacheResult<bool>;

    /// Delete `key` only if it still holds `token`.
    /// Returns false if the key expired or belongs to someone else.
    async fn release(&self, key: &str, token: &str) -> CacheResult<bool>;

    /// Backend label for logs and metrics.
    fn backend_name(&self) -> &'static str;
}

/// Read and deserialize a JSON value.
pub async fn get_json<T: DeserializeOwned>(
    store: &dyn CacheStore,
    key: &str,
) -> CacheResult<Option<T>> {
    match store.get(key).await? {
        Some(json) => Ok(Some(serde_json::from_str(&json)?)),
        None => Ok(None),
    }
}

/// Serialize a value as JSON and store it with a TTL.
pub async fn set_json<T: Serialize + ?Sized>(
    store: &dyn CacheStore,
    key: &str,
    value: &T,
    ttl: Duration,
) -> CacheResult<()> {
    let json = serde_json::to_string(value)?;
    store.set(key, &json, ttl).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Entry {
        slug: String,
        score: f32,
    }

    #[tokio::test]
    async fn test_json_helpers_round_trip_through_store() {
        let store = MemoryCacheStore::new();
        let entry = Entry {
            slug: "intro-to-python".to_string(),
            score: 0.75,
        };

        set_json(&store, "k", &entry, Duration::from_secs(60)).await.unwrap();
        let back: Option<Entry> = get_json(&store, "k").await.unwrap();
        assert_eq!(back, Some(entry));

        let missing: Option<Entry> = get_json(&store, "other").await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn test_get_json_reports_corrupt_payload() {
        let store = MemoryCacheStore::new();
        store.set("k", "not json", Duration::from_secs(60)).await.unwrap();
        let result: CacheResult<Option<Entry>> = get_json(&store, "k").await;
        assert!(matches!(result, Err(CacheError::Serialization(_))));
    }
}
