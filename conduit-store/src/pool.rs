//! Connection pooling. One writer owns the database at a time (spec §1).

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    pub busy_timeout: Duration,
    pub cache_size_kib: i64,
    pub max_connections: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            busy_timeout: Duration::from_secs(5),
            cache_size_kib: 64 * 1024,
            max_connections: 8,
        }
    }
}

async fn connect(options: SqliteConnectOptions, config: &ConnectionConfig) -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;
    sqlx::query(&format!("PRAGMA cache_size = -{}", config.cache_size_kib))
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Open (creating if absent) a WAL-mode SQLite database at `path`.
pub async fn new_file(path: &str, config: &ConnectionConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
        .map_err(|e| crate::error::StoreError::StoreUnavailable(e.to_string()))?
        .create_if_missing(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);
    connect(options, config).await
}

/// Open a private in-memory database, used by tests.
pub async fn new_in_memory(config: &ConnectionConfig) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .map_err(|e| crate::error::StoreError::StoreUnavailable(e.to_string()))?
        .busy_timeout(config.busy_timeout)
        .foreign_keys(true);
    // A plain in-memory pool must stay single-connection: each sqlx
    // connection to `:memory:` is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}
