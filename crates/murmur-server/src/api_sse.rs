//! SSE snapshot stream handlers.
//!
//! Each event carries one full snapshot (`event: snapshot`) or a subscription
//! failure (`event: error`). A client only ever holds the newest pending
//! snapshot: while it is not reading, each snapshot replaces the one before,
//! so the next read always yields the current view. An `error` event ends
//! the stream, and the client's reconnect subscribes again.

use crate::api::ApiError;
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::{
        sse::{Event, KeepAlive},
        Sse,
    },
};
use futures_util::{stream, Stream};
use murmur_channels::{Delivery, MessageChannel, Subscription};
use murmur_types::{Message, RenderedMessage};
use serde::Serialize;
use std::{convert::Infallible, sync::Arc};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::StreamExt;

/// Pending event for one client.
#[derive(Debug, Clone)]
enum Frame {
    Snapshot(String),
    Failed(String),
}

impl Frame {
    fn snapshot<T: Serialize>(items: &T) -> Option<Self> {
        match serde_json::to_string(items) {
            Ok(data) => Some(Self::Snapshot(data)),
            Err(e) => {
                tracing::error!("failed to serialize snapshot event: {}", e);
                None
            }
        }
    }

    fn failed(message: &str) -> Self {
        Self::Failed(serde_json::json!({ "error": message }).to_string())
    }

    fn into_event(self) -> Event {
        match self {
            Self::Snapshot(data) => Event::default().event("snapshot").data(data),
            Self::Failed(data) => Event::default().event("error").data(data),
        }
    }
}

/// Replaces the client's pending frame.
fn forward(tx: &watch::Sender<Option<Frame>>, frame: Option<Frame>) {
    if let Some(frame) = frame {
        tx.send_replace(Some(frame));
    }
}

/// Turns the client's slot into an SSE stream that keeps `held` (the
/// subscription and whatever it reads from) alive until the client
/// disconnects or a failure has been sent.
fn into_stream<H>(
    rx: watch::Receiver<Option<Frame>>,
    held: H,
) -> impl Stream<Item = Result<Event, Infallible>>
where
    H: Send + 'static,
{
    let frames = WatchStream::new(rx);
    stream::unfold(Some((frames, held)), |state| async move {
        let (mut frames, held) = state?;
        loop {
            match frames.next().await? {
                None => continue,
                Some(frame @ Frame::Failed(_)) => {
                    drop(held);
                    return Some((Ok(frame.into_event()), None));
                }
                Some(frame) => return Some((Ok(frame.into_event()), Some((frames, held)))),
            }
        }
    })
}

/// Handler for `GET /events/topics`.
pub async fn topic_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let (tx, rx) = watch::channel(None);
    let subscription = state.session.topics().subscribe(move |delivery| {
        let frame = match delivery {
            Delivery::Snapshot(topics) => Frame::snapshot(&topics),
            Delivery::Failed(e) => Some(Frame::failed(&e.to_string())),
        };
        forward(&tx, frame);
    });
    tracing::debug!("topic SSE client connected");

    Sse::new(into_stream(rx, subscription)).keep_alive(KeepAlive::default())
}

/// Handler for `GET /events/topics/{topicId}/messages`.
pub async fn message_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(topic_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let channel = state.session.channel(&topic_id).await?;

    let (tx, rx) = watch::channel(None);
    let subscription = channel.subscribe(move |delivery| {
        let frame = match delivery {
            Delivery::Snapshot(messages) => {
                let rendered: Vec<RenderedMessage> =
                    messages.iter().map(Message::rendered).collect();
                Frame::snapshot(&rendered)
            }
            Delivery::Failed(e) => Some(Frame::failed(&e.to_string())),
        };
        forward(&tx, frame);
    });
    tracing::debug!(topic_id = %topic_id, "message SSE client connected");

    // Holding the channel keeps it shared with later clients of the topic.
    let held: (Subscription, Arc<MessageChannel>) = (subscription, channel);
    Ok(Sse::new(into_stream(rx, held)).keep_alive(KeepAlive::default()))
}
