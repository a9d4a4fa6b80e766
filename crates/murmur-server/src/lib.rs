//! Murmur server library logic.
//!
//! Hosts one [`Session`] behind an HTTP/SSE surface.

pub mod api;
pub mod api_identity;
pub mod api_messages;
pub mod api_sse;
pub mod api_topics;
pub mod config;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, put},
    Extension, Json, Router,
};
use config::Config;
use murmur_channels::{Delivery, KeywordFilter, Session, Subscription};
use murmur_db::{DbPool, DbRuntimeSettings, MigrationError, PoolError};
use murmur_gateway::SqliteGateway;
use murmur_identity::{HttpLookupService, IdentityResolver, LookupError, SqliteLocalStore};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    pub session: Arc<Session>,
    /// Keeps the topic registry live for list requests.
    _topic_watch: Arc<Subscription>,
}

impl AppState {
    /// Wraps a session and opens its long-lived topic subscription.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(session: Arc<Session>) -> Self {
        let topic_watch = session.topics().subscribe(|delivery| match delivery {
            Delivery::Snapshot(topics) => {
                tracing::debug!(count = topics.len(), "topic list updated");
            }
            Delivery::Failed(e) => {
                tracing::warn!(error = %e, "topic list degraded to last known snapshot");
            }
        });
        Self {
            session,
            _topic_watch: Arc::new(topic_watch),
        }
    }
}

/// Errors that can occur while assembling the session at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to open database: {0}")]
    Pool(#[from] PoolError),

    #[error("failed to get database connection: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("failed to run migrations: {0}")]
    Migration(#[from] MigrationError),

    #[error("failed to build identity lookup client: {0}")]
    Lookup(#[from] LookupError),
}

fn open_database(path: &str, settings: DbRuntimeSettings) -> Result<DbPool, StartupError> {
    let pool = murmur_db::create_pool(path, settings)?;
    let conn = pool.get()?;
    let applied = murmur_db::run_migrations(&conn)?;
    if applied > 0 {
        tracing::info!(path, count = applied, "applied database migrations");
    }
    Ok(pool)
}

/// Opens the stores named in `config` and assembles a session over them.
///
/// # Errors
///
/// Returns `StartupError` if a database cannot be opened or migrated, or the
/// lookup client cannot be built.
pub fn build_session(config: &Config) -> Result<Session, StartupError> {
    let gateway_pool = open_database(
        &config.database.path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: config.database.pool_max_size,
        },
    )?;
    let local_pool = open_database(
        &config.identity.store_path,
        DbRuntimeSettings {
            busy_timeout_ms: config.database.busy_timeout_ms,
            pool_max_size: 2,
        },
    )?;

    let lookup = HttpLookupService::new(
        config.identity.lookup_url.clone(),
        Duration::from_millis(config.identity.lookup_timeout_ms),
    )?;
    let identity = IdentityResolver::new(
        Arc::new(lookup),
        Arc::new(SqliteLocalStore::new(local_pool)),
    );

    let moderation = KeywordFilter::from_policy(&config.moderation);
    tracing::info!(terms = moderation.terms().len(), "keyword moderation enabled");

    Ok(Session::new(
        Arc::new(SqliteGateway::new(gateway_pool)),
        identity,
        Arc::new(moderation),
    ))
}

/// Maximum request body size (64 KiB). Messages carry text or a media URL only.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/identity", get(api_identity::get_identity_handler))
        .route(
            "/api/identity/nickname",
            put(api_identity::set_nickname_handler),
        )
        .route(
            "/api/topics",
            get(api_topics::list_topics_handler).post(api_topics::create_topic_handler),
        )
        .route("/api/topics/palette", get(api_topics::get_palette_handler))
        .route("/api/topics/{topicId}", get(api_topics::get_topic_handler))
        .route(
            "/api/topics/{topicId}/messages",
            get(api_messages::list_messages_handler).post(api_messages::publish_message_handler),
        )
        .route("/events/topics", get(api_sse::topic_stream_handler))
        .route(
            "/events/topics/{topicId}/messages",
            get(api_sse::message_stream_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
