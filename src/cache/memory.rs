// src/cache/memory.rs
//! In-process cache store with TTL support.
//!
//! Expiry is measured with `tokio::time::Instant`, so tests running with a
//! paused clock can expire entries with `tokio::time::advance`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::time::Instant;

use super::{CacheResult, CacheStore};

/// Cache entry with its expiry deadline
#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn new(value: String, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// Process-local [`CacheStore`]. Clones share the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryCacheStore {
    entries: Arc<Mutex<HashMap<String, CacheEntry>>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live (non-expired) entries
    pub fn len(&self) -> usize {
        let entries = self.entries.lock();
        entries.values().filter(|e| !e.is_expired()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `key` is present and not expired
    pub fn contains(&self, key: &str) -> bool {
        let entries = self.entries.lock();
        entries.get(key).map(|e| !e.is_expired()).unwrap_or(false)
    }

    /// Drop expired entries, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> CacheResult<Option<String>> {
        let mut entries = self.entries.lock();

        if let Some(entry) = entries.get(key) {
            if !entry.is_expired() {
                return Ok(Some(entry.value.clone()));
            }
            entries.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let mut entries = self.entries.lock();
        entries.insert(key.to_string(), CacheEntry::new(value.to_string(), ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    async fn try_acquire(&self, key: &str, token: &str, lease: Duration) -> CacheResult<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() => Ok(false),
            _ => {
                entries.insert(key.to_string(), CacheEntry::new(token.to_string(), lease));
                Ok(true)
            }
        }
    }

    async fn release(&self, key: &str, token: &str) -> CacheResult<bool> {
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(entry) if !entry.is_expired() && entry.value == token => {
                entries.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cache_set_get() {
        let cache = MemoryCacheStore::new();
        cache.set("query1", "[1,2]", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("query1").await.unwrap(), Some("[1,2]".to_string()));
    }

    #[tokio::test]
    async fn test_cache_miss() {
        let cache = MemoryCacheStore::new();
        assert_eq!(cache.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_cache_delete() {
        let cache = MemoryCacheStore::new();
        cache.set("query1", "v", Duration::from_secs(60)).await.unwrap();
        cache.delete("query1").await.unwrap();
        assert_eq!(cache.get("query1").await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ttl_expiration() {
        let cache = MemoryCacheStore::new();
        cache.set("key", "value", Duration::from_secs(1)).await.unwrap();
        assert!(cache.get("key").await.unwrap().is_some());

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(cache.cleanup_expired(), 1);
        assert!(cache.get("key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_last_writer_wins() {
        let cache = MemoryCacheStore::new();
        cache.set("counter", "41", Duration::from_secs(60)).await.unwrap();
        cache.set("counter", "42", Duration::from_secs(60)).await.unwrap();
        assert_eq!(cache.get("counter").await.unwrap().as_deref(), Some("42"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_released() {
        let cache = MemoryCacheStore::new();
        let lease = Duration::from_secs(60);

        assert!(cache.try_acquire("lock:a", "t1", lease).await.unwrap());
        assert!(!cache.try_acquire("lock:a", "t2", lease).await.unwrap());
        assert!(!cache.release("lock:a", "t2").await.unwrap());
        assert!(cache.release("lock:a", "t1").await.unwrap());
        assert!(cache.try_acquire("lock:a", "t2", lease).await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expiry_frees_lock() {
        let cache = MemoryCacheStore::new();
        assert!(cache.try_acquire("lock:a", "t1", Duration::from_secs(5)).await.unwrap());

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(cache.try_acquire("lock:a", "t2", Duration::from_secs(5)).await.unwrap());
        // The first holder lost its lease, so its release is refused.
        assert!(!cache.release("lock:a", "t1").await.unwrap());
    }
}
