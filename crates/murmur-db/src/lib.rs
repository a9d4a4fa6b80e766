//! Database layer for murmur.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations. The same schema backs both the persistence
//! gateway store (topics, messages) and the process-local key/value store
//! used by identity resolution.
//!
//! Migrations are SQL files compiled into the binary via `include_str!`, so
//! they ship with the code that depends on them.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, MEMORY_PATH};
