// src/session/sqlite.rs
//! Embedded single-file session store.
//!
//! SQLite connections are not safe to share between threads, so the backend
//! owns one connection behind a mutex and every statement runs under it on
//! Tokio's blocking pool. Tables are created on first use.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use super::{MessageItem, SessionBackend, SessionError, SessionResult, SessionStore};
use crate::db::schema_init::SchemaInitializer;
use crate::monitoring::metrics::observe_session_op_ms;

struct SqliteState {
    conn: Connection,
    schema_ready: bool,
}

/// Process-wide embedded backend. Clones share the same connection and lock.
#[derive(Clone)]
pub struct SqliteSessionBackend {
    state: Arc<Mutex<SqliteState>>,
    path: PathBuf,
}

impl SqliteSessionBackend {
    /// Open (or create) the database file.
    pub fn open<P: AsRef<Path>>(path: P) -> SessionResult<Self> {
        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), "Opening SQLite session store");
        let conn = Connection::open(&path)?;
        SchemaInitializer::configure_sqlite(&conn)?;
        Ok(Self::from_connection(conn, path))
    }

    /// Private in-memory database, mostly for tests
    pub fn open_in_memory() -> SessionResult<Self> {
        let conn = Connection::open_in_memory()?;
        SchemaInitializer::configure_sqlite(&conn)?;
        Ok(Self::from_connection(conn, PathBuf::from(":memory:")))
    }

    fn from_connection(conn: Connection, path: PathBuf) -> Self {
        Self {
            state: Arc::new(Mutex::new(SqliteState {
                conn,
                schema_ready: false,
            })),
            path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Handle for one session
    pub fn session(&self, session_id: &str) -> SqliteSession {
        SqliteSession {
            backend: self.clone(),
            session_id: session_id.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    /// Run `f` on the blocking pool while holding the connection lock.
    async fn run<T, F>(&self, op: &'static str, f: F) -> SessionResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> SessionResult<T> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let started = Instant::now();

        let result = tokio::task::spawn_blocking(move || {
            let mut guard = state.lock();
            if !guard.schema_ready {
                SchemaInitializer::init_sqlite(&guard.conn)?;
                guard.schema_ready = true;
            }
            f(&mut guard.conn)
        })
        .await
        .map_err(|e| SessionError::Worker(e.to_string()))?;

        observe_session_op_ms("sqlite", op, started.elapsed().as_secs_f64() * 1000.0);
        result
    }
}

#[async_trait]
impl SessionBackend for SqliteSessionBackend {
    async fn open(&self, session_id: &str) -> SessionResult<Box<dyn SessionStore>> {
        Ok(Box::new(self.session(session_id)))
    }

    fn name(&self) -> &'static str {
        "sqlite"
    }
}

pub struct SqliteSession {
    backend: SqliteSessionBackend,
    session_id: String,
    closed: AtomicBool,
}

#[async_trait]
impl SessionStore for SqliteSession {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn get_items(&self, limit: Option<usize>) -> SessionResult<Vec<MessageItem>> {
        let session_id = self.session_id.clone();

        let rows = self
            .backend
            .run("get_items", move |conn| {
                let rows = match limit {
                    None => {
                        let mut stmt = conn.prepare(
                            "SELECT message_data FROM agent_messages
                             WHERE session_id = ?1
                             ORDER BY created_at ASC, id ASC",
                        )?;
                        let rows = stmt
                            .query_map([&session_id], |row| row.get::<_, String>(0))?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows
                    }
                    Some(n) => {
                        let mut stmt = conn.prepare(
                            "SELECT message_data FROM agent_messages
                             WHERE session_id = ?1
                             ORDER BY created_at DESC, id DESC
                             LIMIT ?2",
                        )?;
                        let mut rows = stmt
                            .query_map(params![session_id, n as i64], |row| row.get::<_, String>(0))?
                            .collect::<Result<Vec<_>, _>>()?;
                        rows.reverse();
                        rows
                    }
                };
                Ok(rows)
            })
            .await?;

        rows.iter().map(|json| MessageItem::from_json(json)).collect()
    }

    async fn add_items(&self, items: &[MessageItem]) -> SessionResult<()> {
        if items.is_empty() {
            return Ok(());
        }
        let session_id = self.session_id.clone();
        let payload = items
            .iter()
            .map(MessageItem::to_json)
            .collect::<SessionResult<Vec<_>>>()?;
        let count = payload.len();

        self.backend
            .run("add_items", move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT OR IGNORE INTO agent_sessions (session_id) VALUES (?1)",
                    [&session_id],
                )?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO agent_messages (session_id, message_data) VALUES (?1, ?2)",
                    )?;
                    for json in &payload {
                        stmt.execute(params![session_id, json])?;
                    }
                }
                tx.execute(
                    "UPDATE agent_sessions SET updated_at = CURRENT_TIMESTAMP WHERE session_id = ?1",
                    [&session_id],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        debug!(session_id = %self.session_id, count, "Appended session items");
        Ok(())
    }

    async fn pop_item(&self) -> SessionResult<Option<MessageItem>> {
        let session_id = self.session_id.clone();

        let row = self
            .backend
            .run("pop_item", move |conn| {
                let tx = conn.transaction()?;
                let row: Option<String> = tx
                    .query_row(
                        "DELETE FROM agent_messages
                         WHERE id = (
                             SELECT id FROM agent_messages
                             WHERE session_id = ?1
                             ORDER BY created_at DESC, id DESC
                             LIMIT 1
                         )
                         RETURNING message_data",
                        [&session_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                tx.commit()?;
                Ok(row)
            })
            .await?;

        row.as_deref().map(MessageItem::from_json).transpose()
    }

    async fn clear_session(&self) -> SessionResult<()> {
        let session_id = self.session_id.clone();

        self.backend
            .run("clear_session", move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM agent_messages WHERE session_id = ?1", [&session_id])?;
                tx.execute("DELETE FROM agent_sessions WHERE session_id = ?1", [&session_id])?;
                tx.commit()?;
                Ok(())
            })
            .await?;

        info!(session_id = %self.session_id, "Session cleared");
        Ok(())
    }

    fn close(&self) {
        // Logical close only; the shared connection stays open.
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(session_id = %self.session_id, "SQLite session handle closed");
        }
    }
}
