//! Per-topic ordered message stream.

use std::sync::Arc;

use async_trait::async_trait;
use murmur_gateway::{GatewayError, LiveQuery, PersistenceGateway};
use murmur_types::{Identity, Message, MessageKind, NewMessage};
use serde::Deserialize;

use crate::error::ChannelError;
use crate::moderation::ModerationFilter;
use crate::subscription::{Delivery, FeedSource, LiveFeed, Subscription, SubscriptionState};

/// Content a user wants to post.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub kind: MessageKind,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub media_url: Option<String>,
}

impl MessageDraft {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            text: Some(text.into()),
            media_url: None,
        }
    }

    pub fn media(kind: MessageKind, media_url: impl Into<String>) -> Self {
        Self {
            kind,
            text: None,
            media_url: Some(media_url.into()),
        }
    }

    /// Returns the `(text, media_url)` pair to store. Only the field that
    /// matches the kind is kept.
    fn into_content(self) -> Result<(Option<String>, Option<String>), ChannelError> {
        if self.kind.is_media() {
            let url = self
                .media_url
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty())
                .ok_or_else(|| {
                    ChannelError::ValidationFailed(format!("{} message needs a media url", self.kind))
                })?;
            Ok((None, Some(url)))
        } else {
            let text = self
                .text
                .filter(|t| !t.trim().is_empty())
                .ok_or_else(|| ChannelError::ValidationFailed("text message is empty".to_string()))?;
            Ok((Some(text), None))
        }
    }
}

struct MessageSource {
    gateway: Arc<dyn PersistenceGateway>,
    topic_id: String,
}

#[async_trait]
impl FeedSource for MessageSource {
    type Item = Message;

    fn name(&self) -> &str {
        &self.topic_id
    }

    async fn open(&self) -> Result<LiveQuery<Message>, GatewayError> {
        self.gateway.live_messages(&self.topic_id).await
    }
}

/// Ordered, moderated message stream of one topic.
///
/// All subscribers of a channel share one gateway subscription.
pub struct MessageChannel {
    topic_id: String,
    gateway: Arc<dyn PersistenceGateway>,
    moderation: Arc<dyn ModerationFilter>,
    feed: LiveFeed<MessageSource>,
}

impl MessageChannel {
    pub fn new(
        topic_id: impl Into<String>,
        gateway: Arc<dyn PersistenceGateway>,
        moderation: Arc<dyn ModerationFilter>,
    ) -> Self {
        let topic_id = topic_id.into();
        let feed = LiveFeed::new(MessageSource {
            gateway: Arc::clone(&gateway),
            topic_id: topic_id.clone(),
        });
        Self {
            topic_id,
            gateway,
            moderation,
            feed,
        }
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    /// Registers a listener for the topic's full message history.
    ///
    /// Snapshots are ordered by `created_at`, then `seq`. A listener joining
    /// a running channel gets the cached history before this returns.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Delivery<'_, Message>) + Send + Sync + 'static,
    {
        self.feed.subscribe(Arc::new(listener))
    }

    pub fn state(&self) -> SubscriptionState {
        self.feed.state()
    }

    /// Reopens a failed subscription for the current listeners.
    pub fn resubscribe(&self) {
        self.feed.resubscribe();
    }

    pub fn last_error(&self) -> Option<Arc<ChannelError>> {
        self.feed.last_error()
    }

    /// Last history delivered to listeners, if the channel is subscribed.
    pub fn snapshot(&self) -> Option<Vec<Message>> {
        self.feed.snapshot()
    }

    pub fn listener_count(&self) -> usize {
        self.feed.listener_count()
    }

    /// Moderates and durably appends a message.
    ///
    /// Text is checked by the moderation filter once, here; media is never
    /// filtered. A blocked message is still stored, flagged `moderated`.
    /// On a write failure nothing is stored and the caller may retry.
    pub async fn publish(
        &self,
        author: &Identity,
        draft: MessageDraft,
    ) -> Result<Message, ChannelError> {
        let kind = draft.kind;
        let (text, media_url) = draft.into_content()?;
        let moderated = match (kind, text.as_deref()) {
            (MessageKind::Text, Some(text)) => self.moderation.evaluate(text),
            _ => false,
        };

        let new_message = NewMessage {
            topic_id: self.topic_id.clone(),
            kind,
            text,
            media_url,
            author_id: author.id.clone(),
            author_name: author.display_name.clone(),
            moderated,
        };

        let message = self
            .gateway
            .create_message(new_message)
            .await
            .map_err(|e| {
                tracing::error!(topic_id = %self.topic_id, error = %e, "failed to publish message");
                ChannelError::PersistenceWriteFailed(e)
            })?;

        if message.moderated {
            tracing::info!(
                topic_id = %message.topic_id,
                message_id = %message.id,
                "message withheld by moderation"
            );
        } else {
            tracing::debug!(
                topic_id = %message.topic_id,
                message_id = %message.id,
                kind = %kind,
                "message published"
            );
        }
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_draft_requires_text() {
        assert!(MessageDraft::text("   ").into_content().is_err());
        let (text, media) = MessageDraft::text("hello").into_content().unwrap();
        assert_eq!(text.as_deref(), Some("hello"));
        assert_eq!(media, None);
    }

    #[test]
    fn media_draft_requires_url_and_drops_text() {
        assert!(MessageDraft::media(MessageKind::Image, " ")
            .into_content()
            .is_err());

        let draft = MessageDraft {
            kind: MessageKind::Audio,
            text: Some("ignored".to_string()),
            media_url: Some(" https://cdn.example/a.ogg ".to_string()),
        };
        let (text, media) = draft.into_content().unwrap();
        assert_eq!(text, None);
        assert_eq!(media.as_deref(), Some("https://cdn.example/a.ogg"));
    }

    #[test]
    fn text_kind_with_only_a_url_is_rejected() {
        let draft = MessageDraft::media(MessageKind::Text, "https://cdn.example/a.png");
        assert!(matches!(
            draft.into_content(),
            Err(ChannelError::ValidationFailed(_))
        ));
    }

    #[test]
    fn draft_deserializes_from_camel_case() {
        let draft: MessageDraft =
            serde_json::from_str(r#"{"kind":"image","mediaUrl":"https://cdn.example/x.png"}"#)
                .unwrap();
        assert_eq!(
            draft,
            MessageDraft::media(MessageKind::Image, "https://cdn.example/x.png")
        );
    }
}
