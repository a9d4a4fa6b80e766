//! SQLite pool setup shared by the gateway store and the local key/value store.

use std::path::Path;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Path that selects a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Connection tunables applied to every pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a writer waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Upper bound on open connections.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database directory {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

fn journal_error(mode: &str) -> rusqlite::Error {
    rusqlite::Error::SqliteFailure(
        rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
        Some(format!("expected WAL journal mode, database reports {mode}")),
    )
}

fn init_connection(conn: &mut Connection, busy_timeout_ms: u64) -> rusqlite::Result<()> {
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    match mode.as_str() {
        "wal" => conn.execute_batch("PRAGMA synchronous = NORMAL;")?,
        "memory" => {}
        other => return Err(journal_error(other)),
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}

/// Opens a pool over the database at `db_path`, creating the file and its
/// parent directory when missing.
///
/// Every in-memory connection is its own database, so [`MEMORY_PATH`] always
/// gets a single-connection pool regardless of `pool_max_size`.
///
/// # Errors
///
/// Returns `PoolError::Directory` if the parent directory cannot be created
/// and `PoolError::PoolInit` if no connection can be opened.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let busy_timeout_ms = settings.busy_timeout_ms;
    let (manager, max_size) = if db_path == MEMORY_PATH {
        if settings.pool_max_size > 1 {
            tracing::debug!(
                requested = settings.pool_max_size,
                "in-memory database limited to one connection"
            );
        }
        (SqliteConnectionManager::memory(), 1)
    } else {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| PoolError::Directory {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        (
            SqliteConnectionManager::file(db_path).with_flags(flags),
            settings.pool_max_size,
        )
    };

    let manager = manager.with_init(move |conn| init_connection(conn, busy_timeout_ms));
    let pool = Pool::builder().max_size(max_size).build(manager)?;
    tracing::debug!(path = db_path, max_size, "database pool ready");
    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pragma_i64(pool: &DbPool, name: &str) -> i64 {
        let conn = pool.get().unwrap();
        conn.query_row(&format!("PRAGMA {name};"), [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn memory_pool_is_capped_at_one_connection() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 1_200,
            pool_max_size: 6,
        };
        let pool = create_pool(MEMORY_PATH, settings).unwrap();

        assert_eq!(pool.max_size(), 1);
        assert_eq!(pragma_i64(&pool, "foreign_keys"), 1);
        assert_eq!(pragma_i64(&pool, "busy_timeout"), 1_200);
    }

    #[test]
    fn file_pool_uses_wal_and_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.db");
        let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();

        assert!(path.exists());
        assert_eq!(pool.max_size(), 8);
        let conn = pool.get().unwrap();
        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .unwrap();
        assert_eq!(mode, "wal");
        // NORMAL
        assert_eq!(pragma_i64(&pool, "synchronous"), 1);
    }
}
