// src/session/mod.rs
//! Durable per-conversation message log.
//!
//! A session is an append-only list of [`MessageItem`]s keyed by an opaque
//! session id. Two interchangeable backends implement the same contract:
//! - [`sqlite::SqliteSessionBackend`]: single embedded file, for development
//! - [`postgres::PostgresSessionBackend`]: pooled Postgres, for production
//!
//! Request code never picks a backend itself; [`manager::SessionManager`]
//! holds the one chosen at startup and hands out scoped handles.

pub mod manager;
pub mod postgres;
pub mod sqlite;

pub use manager::{SessionHandle, SessionManager, SessionTurn};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("postgres error: {0}")]
    Postgres(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("session worker failed: {0}")]
    Worker(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// One conversation entry, stored as JSON text.
///
/// The shape is owned by the agent layer; this crate only relies on it being
/// a JSON value. Chat messages carry `role` and `content`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageItem(pub Value);

impl MessageItem {
    /// Build a chat message `{"role": .., "content": ..}`
    pub fn new(role: &str, content: impl Into<Value>) -> Self {
        Self(serde_json::json!({ "role": role, "content": content.into() }))
    }

    pub fn role(&self) -> Option<&str> {
        self.0.get("role").and_then(Value::as_str)
    }

    pub fn content(&self) -> Option<&Value> {
        self.0.get("content")
    }

    /// `content` when it is plain text
    pub fn text(&self) -> Option<&str> {
        self.content().and_then(Value::as_str)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub(crate) fn to_json(&self) -> SessionResult<String> {
        Ok(serde_json::to_string(&self.0)?)
    }

    pub(crate) fn from_json(json: &str) -> SessionResult<Self> {
        Ok(Self(serde_json::from_str(json)?))
    }
}

impl From<Value> for MessageItem {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Handle on one session's message log.
#[async_trait]
pub trait SessionStore: Send + Sync {
    fn session_id(&self) -> &str;

    /// All items in insertion order, or the latest `limit` items, still oldest first.
    async fn get_items(&self, limit: Option<usize>) -> SessionResult<Vec<MessageItem>>;

    /// Append items in one transaction, creating the session row if needed.
    async fn add_items(&self, items: &[MessageItem]) -> SessionResult<()>;

    /// Delete and return the most recent item.
    async fn pop_item(&self) -> SessionResult<Option<MessageItem>>;

    /// Delete every item and the session row.
    async fn clear_session(&self) -> SessionResult<()>;

    /// Logical release. Idempotent; never closes shared connections.
    fn close(&self);
}

/// Opens session handles on one storage backend.
#[async_trait]
pub trait SessionBackend: Send + Sync {
    async fn open(&self, session_id: &str) -> SessionResult<Box<dyn SessionStore>>;

    fn name(&self) -> &'static str;
}
