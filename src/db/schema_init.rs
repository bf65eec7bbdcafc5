// src/db/schema_init.rs
use rusqlite::{Connection, Result as SqlResult};
use sqlx::PgPool;
use tracing::info;

const SQLITE_SCHEMA: &str = include_str!("sqlite_schema.sql");
const POSTGRES_SCHEMA: &str = include_str!("postgres_schema.sql");

/// Creates the `agent_sessions` / `agent_messages` tables and their index.
/// Every statement is `IF NOT EXISTS`, so running it again is harmless.
pub struct SchemaInitializer;

impl SchemaInitializer {
    /// Pragmas for the embedded store: WAL for crash safety, NORMAL sync for
    /// throughput, foreign keys for the message cascade.
    pub fn configure_sqlite(conn: &Connection) -> SqlResult<()> {
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")
    }

    pub fn init_sqlite(conn: &Connection) -> SqlResult<()> {
        info!("Initializing SQLite session tables");
        conn.execute_batch(SQLITE_SCHEMA)?;
        info!("SQLite session tables initialized");
        Ok(())
    }

    pub async fn init_postgres(pool: &PgPool) -> Result<(), sqlx::Error> {
        info!("Initializing Postgres session tables");
        for statement in split_statements(POSTGRES_SCHEMA) {
            sqlx::query(statement).execute(pool).await?;
        }
        info!("Postgres session tables initialized");
        Ok(())
    }
}

/// Prepared statements take one command each
fn split_statements(sql: &str) -> impl Iterator<Item = &str> {
    sql.split(';').map(str::trim).filter(|s| !s.is_empty())
}
