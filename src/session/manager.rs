// src/session/manager.rs
//! Scoped session acquisition.
//!
//! [`SessionHandle`] closes its session when dropped, so a handle cannot leak
//! past the request that opened it whichever way the request ends.
//! [`SessionTurn`] additionally holds the per-session lock for one chat turn;
//! its session is released before its lock.

use std::future::Future;
use std::ops::Deref;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::postgres::PostgresSessionBackend;
use super::sqlite::SqliteSessionBackend;
use super::{SessionBackend, SessionResult, SessionStore};
use crate::cache::keys::session_lock_key;
use crate::config::SessionStoreConfig;
use crate::error::CoreError;
use crate::lock::{DistributedLock, LockConfig, LockError, LockGuard};

/// Build the backend selected by configuration.
pub fn build_backend(config: &SessionStoreConfig) -> SessionResult<Arc<dyn SessionBackend>> {
    match config {
        SessionStoreConfig::Embedded { path } => {
            Ok(Arc::new(SqliteSessionBackend::open(path)?) as Arc<dyn SessionBackend>)
        }
        SessionStoreConfig::Networked(pg) => {
            Ok(Arc::new(PostgresSessionBackend::connect_lazy(pg)?) as Arc<dyn SessionBackend>)
        }
    }
}

/// Hands out session handles and chat-turn guards.
#[derive(Clone)]
pub struct SessionManager {
    backend: Arc<dyn SessionBackend>,
    lock: DistributedLock,
    lock_config: LockConfig,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn SessionBackend>, lock: DistributedLock, lock_config: LockConfig) -> Self {
        info!(
            backend = backend.name(),
            lease_secs = lock_config.lease_timeout.as_secs(),
            wait_ms = lock_config.wait_timeout.as_millis() as u64,
            "Session manager ready"
        );
        Self {
            backend,
            lock,
            lock_config,
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    pub fn lock_config(&self) -> LockConfig {
        self.lock_config
    }

    /// Open a session without taking the turn lock (read-only paths such as
    /// history display).
    pub async fn open(&self, session_id: &str) -> SessionResult<SessionHandle> {
        let inner = self.backend.open(session_id).await?;
        debug!(session_id, backend = self.backend.name(), "Session opened");
        Ok(SessionHandle { inner })
    }

    /// Lock the session for one chat turn, then open it.
    ///
    /// Fails with a lock contention error, without opening anything, if
    /// another turn holds the session past the configured wait.
    pub async fn begin_turn(&self, session_id: &str) -> Result<SessionTurn, CoreError> {
        let key = session_lock_key(session_id);
        let lock = match self.lock.acquire_with(&key, self.lock_config).await {
            Ok(guard) => guard,
            Err(e) => {
                if e.is_contention() {
                    warn!(session_id, "Session busy, rejecting concurrent turn");
                }
                return Err(e.into());
            }
        };

        let session = match self.open(session_id).await {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(release_err) = lock.release().await {
                    warn!(session_id, error = %release_err, "Lock release after failed open");
                }
                return Err(e.into());
            }
        };

        Ok(SessionTurn { session, lock })
    }

    /// Run one chat turn with the session locked.
    ///
    /// The session is closed and the lock released before this returns,
    /// whether `turn` succeeds or fails. If `turn` succeeded but the lease had
    /// already expired, the expiry is returned as the error.
    pub async fn with_turn<T, E, F, Fut>(&self, session_id: &str, turn: F) -> Result<T, E>
    where
        F: FnOnce(SessionHandle) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CoreError>,
    {
        let SessionTurn { session, lock } = self.begin_turn(session_id).await.map_err(E::from)?;
        let outcome = turn(session).await;
        let released = lock.release().await;

        match (outcome, released) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(e)) => Err(E::from(CoreError::from(e))),
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(release_err)) => {
                warn!(session_id, error = %release_err, "Lock release after failed turn");
                Err(e)
            }
        }
    }
}

/// Open session, closed on drop.
pub struct SessionHandle {
    inner: Box<dyn SessionStore>,
}

impl Deref for SessionHandle {
    type Target = dyn SessionStore;

    fn deref(&self) -> &Self::Target {
        self.inner.as_ref()
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        self.inner.close();
    }
}

/// One chat turn: the session lock plus an open session.
///
/// Field order matters: the session is dropped before the lock.
pub struct SessionTurn {
    session: SessionHandle,
    lock: LockGuard,
}

impl SessionTurn {
    pub fn session(&self) -> &dyn SessionStore {
        &*self.session
    }

    pub fn lock_key(&self) -> &str {
        self.lock.key()
    }

    /// Close the session, then release the lock.
    ///
    /// An `Err(LockError::LeaseExpired)` means the turn outlived its lease and
    /// another turn may have run concurrently.
    pub async fn finish(self) -> Result<(), LockError> {
        let SessionTurn { session, lock } = self;
        drop(session);
        lock.release().await
    }
}

impl Deref for SessionTurn {
    type Target = dyn SessionStore;

    fn deref(&self) -> &Self::Target {
        &*self.session
    }
}
