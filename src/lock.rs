// src/lock.rs
//! Lease-based mutual exclusion over a [`CacheStore`].
//!
//! A lock is a cache key holding a random token with an expiry (the lease).
//! Contending callers retry until `wait_timeout` elapses and then fail with
//! [`LockError::NotAcquired`]. A zero wait timeout means a single attempt.
//!
//! Release checks the token, so a holder whose lease ran out can never delete
//! a lock that has since been taken by someone else.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::{CacheError, CacheStore};

/// Pause between acquisition attempts while waiting
const RETRY_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, Error)]
pub enum LockError {
    #[error("lock {key} not acquired within {waited:?}")]
    NotAcquired { key: String, waited: Duration },
    #[error("lease on {key} expired before release")]
    LeaseExpired { key: String },
    #[error("lock {key} requested with a zero lease")]
    ZeroLease { key: String },
    #[error("lock backend error: {0}")]
    Backend(#[from] CacheError),
}

impl LockError {
    /// True for contention failures, as opposed to infrastructure errors
    pub fn is_contention(&self) -> bool {
        matches!(self, LockError::NotAcquired { .. })
    }
}

/// Lock timing policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockConfig {
    /// Hard upper bound on how long a holder keeps the lock
    pub lease_timeout: Duration,
    /// How long a contender waits before giving up
    pub wait_timeout: Duration,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_timeout: Duration::from_secs(60),
            wait_timeout: Duration::ZERO,
        }
    }
}

/// Factory for lock guards on a shared cache store
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn CacheStore>,
}

impl DistributedLock {
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self { store }
    }

    /// Acquire `key`, waiting at most `wait_timeout`.
    pub async fn acquire(
        &self,
        key: &str,
        lease_timeout: Duration,
        wait_timeout: Duration,
    ) -> Result<LockGuard, LockError> {
        if lease_timeout.is_zero() {
            return Err(LockError::ZeroLease { key: key.to_string() });
        }
        let token = Uuid::new_v4().to_string();
        let started = Instant::now();
        let deadline = started + wait_timeout;

        loop {
            if self.store.try_acquire(key, &token, lease_timeout).await? {
                debug!(key, waited_ms = started.elapsed().as_millis() as u64, "Lock acquired");
                return Ok(LockGuard {
                    store: Arc::clone(&self.store),
                    key: key.to_string(),
                    token,
                    released: false,
                });
            }

            let now = Instant::now();
            if now >= deadline {
                crate::monitoring::metrics::LOCK_REJECTIONS_TOTAL.inc();
                debug!(key, "Lock busy, giving up");
                return Err(LockError::NotAcquired {
                    key: key.to_string(),
                    waited: now - started,
                });
            }
            tokio::time::sleep(RETRY_INTERVAL.min(deadline - now)).await;
        }
    }

    /// Acquire with a [`LockConfig`]
    pub async fn acquire_with(&self, key: &str, config: LockConfig) -> Result<LockGuard, LockError> {
        self.acquire(key, config.lease_timeout, config.wait_timeout).await
    }
}

/// Held lock. Call [`LockGuard::release`] to release and learn whether the
/// lease was still valid; a guard dropped without release (error path,
/// cancelled task) schedules the release on the current Tokio runtime.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    store: Arc<dyn CacheStore>,
    key: String,
    token: String,
    released: bool,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Release the lock.
    ///
    /// Returns [`LockError::LeaseExpired`] if the lease ran out while held;
    /// writes done under this guard may then have raced with another holder.
    pub async fn release(mut self) -> Result<(), LockError> {
        let result = self.store.release(&self.key, &self.token).await;
        self.released = true;
        let owned = result?;
        if owned {
            debug!(key = %self.key, "Lock released");
            Ok(())
        } else {
            warn!(key = %self.key, "Lock lease expired before release");
            Err(LockError::LeaseExpired {
                key: self.key.clone(),
            })
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let store = Arc::clone(&self.store);
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = store.release(&key, &token).await {
                        warn!(key = %key, error = %e, "Deferred lock release failed");
                    }
                });
            }
            // Without a runtime the lease expiry frees the key.
            Err(_) => warn!(key = %key, "No runtime to release lock; relying on lease expiry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCacheStore;

    fn lock() -> DistributedLock {
        DistributedLock::new(Arc::new(MemoryCacheStore::new()))
    }

    #[tokio::test]
    async fn test_fail_fast_when_held() {
        let lock = lock();
        let lease = Duration::from_secs(60);

        let held = lock.acquire("lock:session:abc", lease, Duration::ZERO).await.unwrap();
        let err = lock
            .acquire("lock:session:abc", lease, Duration::ZERO)
            .await
            .err()
            .unwrap();
        assert!(err.is_contention());

        held.release().await.unwrap();
        let again = lock.acquire("lock:session:abc", lease, Duration::ZERO).await.unwrap();
        again.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_lease_rejected() {
        let lock = lock();
        let err = lock
            .acquire("lock:session:z", Duration::ZERO, Duration::ZERO)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, LockError::ZeroLease { .. }));
        assert!(!err.is_contention());

        // Nothing was written, so a real lease still gets exclusive access
        let first = lock.acquire("lock:session:z", Duration::from_secs(60), Duration::ZERO).await.unwrap();
        assert!(lock
            .acquire("lock:session:z", Duration::from_secs(60), Duration::ZERO)
            .await
            .is_err());
        first.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_release_still_frees_key() {
        let store = MemoryCacheStore::new();
        let lock = DistributedLock::new(Arc::new(store.clone()));
        let guard = lock.acquire("k", Duration::from_secs(60), Duration::ZERO).await.unwrap();

        // Dropping the release future before polling falls back to the drop path
        drop(guard.release());
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        assert!(!store.contains("k"));
    }

    #[tokio::test]
    async fn test_distinct_keys_do_not_contend() {
        let lock = lock();
        let lease = Duration::from_secs(60);
        let a = lock.acquire("lock:session:a", lease, Duration::ZERO).await.unwrap();
        let b = lock.acquire("lock:session:b", lease, Duration::ZERO).await.unwrap();
        a.release().await.unwrap();
        b.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_wait_gives_up() {
        let lock = lock();
        let _held = lock
            .acquire("k", Duration::from_secs(60), Duration::ZERO)
            .await
            .unwrap();

        match lock.acquire("k", Duration::from_secs(60), Duration::from_secs(2)).await {
            Err(LockError::NotAcquired { waited, .. }) => assert!(waited >= Duration::from_secs(2)),
            other => panic!("expected contention, got {:?}", other.map(|g| g.key().to_string())),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_waiter_gets_lock_once_holder_releases() {
        let lock = lock();
        let held = lock
            .acquire("k", Duration::from_secs(60), Duration::ZERO)
            .await
            .unwrap();

        let waiter = {
            let lock = lock.clone();
            tokio::spawn(async move {
                lock.acquire("k", Duration::from_secs(60), Duration::from_secs(5)).await
            })
        };

        tokio::time::sleep(Duration::from_millis(250)).await;
        held.release().await.unwrap();

        let guard = waiter.await.unwrap().unwrap();
        guard.release().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_lease_reported_on_release() {
        let lock = lock();
        let guard = lock
            .acquire("k", Duration::from_secs(1), Duration::ZERO)
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;
        let other = lock.acquire("k", Duration::from_secs(60), Duration::ZERO).await.unwrap();

        assert!(matches!(guard.release().await, Err(LockError::LeaseExpired { .. })));
        // The new holder is unaffected by the stale release.
        other.release().await.unwrap();
    }

    #[tokio::test]
    async fn test_dropped_guard_is_released() {
        let lock = lock();
        {
            let _guard = lock
                .acquire("k", Duration::from_secs(60), Duration::ZERO)
                .await
                .unwrap();
        }
        tokio::task::yield_now().await;
        let guard = lock
            .acquire("k", Duration::from_secs(60), Duration::from_secs(1))
            .await
            .unwrap();
        guard.release().await.unwrap();
    }
}
