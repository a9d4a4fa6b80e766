//! Error types for the persistence gateway.

/// Errors that can occur during gateway operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// A database operation failed.
    #[error("gateway database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No connection could be checked out of the pool.
    #[error("gateway connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// A blocking database task panicked or was cancelled.
    #[error("gateway task failed: {0}")]
    Task(String),

    /// The backing store cannot be reached.
    #[error("gateway unavailable: {0}")]
    Unavailable(String),

    /// The live query's notification feed ended.
    #[error("live query closed")]
    Closed,
}
