//! Topic listing and creation handlers.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    Json,
};
use murmur_channels::SubscriptionState;
use murmur_types::{Topic, TOPIC_PALETTE};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct ListTopicsParams {
    /// Case-insensitive filter on title and description.
    pub q: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicListResponse {
    pub topics: Vec<Topic>,
    /// State of the live topic subscription backing this list.
    pub state: SubscriptionState,
    /// Present when the list is degraded to what was known before a failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTopicRequest {
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub color: String,
}

/// Handler for `GET /api/topics`.
///
/// A failed topic subscription still answers with the last known list and
/// the error; the request also triggers a resubscribe.
pub async fn list_topics_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<ListTopicsParams>,
) -> Json<TopicListResponse> {
    let registry = state.session.topics();
    let subscription_state = registry.state();
    let error = registry.last_error().map(|e| e.to_string());

    let topics = registry.search(params.q.as_deref().unwrap_or("")).await;

    if subscription_state == SubscriptionState::Error {
        tracing::info!("topic subscription failed earlier, resubscribing");
        registry.resubscribe();
    }

    Json(TopicListResponse {
        topics,
        state: subscription_state,
        error,
    })
}

/// Handler for `GET /api/topics/palette`.
pub async fn get_palette_handler() -> Json<Vec<&'static str>> {
    Json(TOPIC_PALETTE.to_vec())
}

/// Handler for `POST /api/topics`.
pub async fn create_topic_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<CreateTopicRequest>,
) -> Result<(StatusCode, Json<Topic>), ApiError> {
    let topic = state
        .session
        .topics()
        .create(&payload.title, &payload.description, &payload.color)
        .await?;
    Ok((StatusCode::CREATED, Json(topic)))
}

/// Handler for `GET /api/topics/{topicId}`.
pub async fn get_topic_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(topic_id): Path<String>,
) -> Result<Json<Topic>, ApiError> {
    let topic = state.session.topics().find(&topic_id).await?;
    Ok(Json(topic))
}
