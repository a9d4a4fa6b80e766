//! Process-local key/value storage.

use async_trait::async_trait;
use murmur_db::DbPool;
use rusqlite::{params, OptionalExtension};
use thiserror::Error;

/// Key holding the user's nickname.
pub const NICKNAME_KEY: &str = "nickname";

/// Key holding the locally generated fallback identity.
pub const FALLBACK_IDENTITY_KEY: &str = "fallback-identity";

/// Errors from the local store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("local store database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("local store pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("local store task failed: {0}")]
    Task(String),
}

/// Durable string key/value storage that survives restarts.
#[async_trait]
pub trait LocalStore: Send + Sync + 'static {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

/// [`LocalStore`] over the `local_kv` table.
#[derive(Clone)]
pub struct SqliteLocalStore {
    pool: DbPool,
}

impl SqliteLocalStore {
    /// Wraps an already-migrated pool.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            let value = conn
                .query_row(
                    "SELECT value FROM local_kv WHERE key = ?1",
                    [&key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(value)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let pool = self.pool.clone();
        let key = key.to_string();
        let value = value.to_string();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            conn.execute(
                "INSERT INTO local_kv (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = datetime('now')",
                params![key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}
