// src/error.rs
use thiserror::Error;

use crate::cache::CacheError;
use crate::config::ConfigError;
use crate::lock::LockError;
use crate::page::PageError;
use crate::search::SearchError;
use crate::session::SessionError;

/// Errors surfaced to the route layer
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Lock(#[from] LockError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error(transparent)]
    Search(#[from] SearchError),
    #[error(transparent)]
    Page(#[from] PageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl CoreError {
    /// Another turn holds the session; the caller should reject, not retry blindly
    pub fn is_lock_contention(&self) -> bool {
        matches!(self, CoreError::Lock(e) if e.is_contention())
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
