//! Message history and publishing handlers.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use murmur_channels::{Delivery, MessageChannel, MessageDraft};
use murmur_types::{Message, RenderedMessage};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;

/// How long a history request waits for the gateway's first snapshot.
const HISTORY_TIMEOUT: Duration = Duration::from_secs(5);

/// Subscribes just long enough to receive one full history.
async fn current_history(channel: &MessageChannel) -> Result<Vec<Message>, ApiError> {
    let (tx, rx) = oneshot::channel();
    let tx = Mutex::new(Some(tx));
    let subscription = channel.subscribe(move |delivery| {
        let result = match delivery {
            Delivery::Snapshot(messages) => Ok(messages.to_vec()),
            Delivery::Failed(e) => Err(e.to_string()),
        };
        let tx = tx.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(tx) = tx {
            let _ = tx.send(result);
        }
    });

    let outcome = tokio::time::timeout(HISTORY_TIMEOUT, rx).await;
    drop(subscription);

    match outcome {
        Ok(Ok(Ok(messages))) => Ok(messages),
        Ok(Ok(Err(e))) => Err(ApiError::BadGateway(e)),
        Ok(Err(_)) => Err(ApiError::InternalServerError(
            "history listener dropped".to_string(),
        )),
        Err(_) => Err(ApiError::BadGateway(
            "timed out waiting for message history".to_string(),
        )),
    }
}

/// Handler for `GET /api/topics/{topicId}/messages`.
///
/// Returns the full history in stream order. Moderated messages are
/// returned withheld.
pub async fn list_messages_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(topic_id): Path<String>,
) -> Result<Json<Vec<RenderedMessage>>, ApiError> {
    let channel = state.session.channel(&topic_id).await?;
    let history = current_history(&channel).await?;
    Ok(Json(history.iter().map(Message::rendered).collect()))
}

/// Handler for `POST /api/topics/{topicId}/messages`.
pub async fn publish_message_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(topic_id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> Result<(StatusCode, Json<RenderedMessage>), ApiError> {
    let message = state.session.publish(&topic_id, draft).await?;
    Ok((StatusCode::CREATED, Json(message.rendered())))
}
