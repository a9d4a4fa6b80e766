//! Shared API error type.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use murmur_channels::ChannelError;
use murmur_identity::IdentityError;
use thiserror::Error;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    /// The persistence gateway failed; the request may be retried.
    #[error("upstream failure: {0}")]
    BadGateway(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalServerError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<ChannelError> for ApiError {
    fn from(e: ChannelError) -> Self {
        match e {
            ChannelError::ValidationFailed(msg) => ApiError::BadRequest(msg),
            ChannelError::TopicNotFound(id) => ApiError::NotFound(format!("topic {id}")),
            ChannelError::PersistenceWriteFailed(_)
            | ChannelError::PersistenceSubscriptionFailed(_) => ApiError::BadGateway(e.to_string()),
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        tracing::error!(error = %e, "identity operation failed");
        ApiError::InternalServerError(e.to_string())
    }
}
