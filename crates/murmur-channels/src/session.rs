//! Session-scoped state container.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use murmur_gateway::PersistenceGateway;
use murmur_identity::IdentityResolver;
use murmur_types::{Identity, Message};

use crate::channel::{MessageChannel, MessageDraft};
use crate::error::ChannelError;
use crate::moderation::ModerationFilter;
use crate::registry::TopicRegistry;

/// Everything one participant needs: identity, the topic registry and the
/// message channels currently in use.
///
/// Channels are shared: asking twice for the same topic while the first
/// handle is alive returns the same [`MessageChannel`]. Dropping the session
/// and every handle it gave out releases all gateway subscriptions.
pub struct Session {
    gateway: Arc<dyn PersistenceGateway>,
    identity: IdentityResolver,
    topics: TopicRegistry,
    moderation: Arc<dyn ModerationFilter>,
    channels: Mutex<HashMap<String, Weak<MessageChannel>>>,
}

impl Session {
    pub fn new(
        gateway: Arc<dyn PersistenceGateway>,
        identity: IdentityResolver,
        moderation: Arc<dyn ModerationFilter>,
    ) -> Self {
        let topics = TopicRegistry::new(Arc::clone(&gateway));
        Self::with_registry(gateway, identity, topics, moderation)
    }

    pub fn with_registry(
        gateway: Arc<dyn PersistenceGateway>,
        identity: IdentityResolver,
        topics: TopicRegistry,
        moderation: Arc<dyn ModerationFilter>,
    ) -> Self {
        Self {
            gateway,
            identity,
            topics,
            moderation,
            channels: Mutex::new(HashMap::new()),
        }
    }

    pub fn identity(&self) -> &IdentityResolver {
        &self.identity
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    /// Resolves the session identity.
    pub async fn whoami(&self) -> Identity {
        self.identity.resolve().await
    }

    /// Returns the channel of an existing topic, opening it if needed.
    pub async fn channel(&self, topic_id: &str) -> Result<Arc<MessageChannel>, ChannelError> {
        let topic = self.topics.find(topic_id).await?;

        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(channel) = channels.get(&topic.id).and_then(Weak::upgrade) {
            return Ok(channel);
        }

        channels.retain(|_, channel| channel.strong_count() > 0);
        let channel = Arc::new(MessageChannel::new(
            topic.id.clone(),
            Arc::clone(&self.gateway),
            Arc::clone(&self.moderation),
        ));
        channels.insert(topic.id.clone(), Arc::downgrade(&channel));
        tracing::debug!(topic_id = %topic.id, "opened message channel");
        Ok(channel)
    }

    /// Number of channels still referenced somewhere.
    pub fn open_channels(&self) -> usize {
        self.channels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .filter(|channel| channel.strong_count() > 0)
            .count()
    }

    /// Publishes a draft to a topic as the session identity.
    pub async fn publish(
        &self,
        topic_id: &str,
        draft: MessageDraft,
    ) -> Result<Message, ChannelError> {
        let channel = self.channel(topic_id).await?;
        let author = self.identity.resolve().await;
        channel.publish(&author, draft).await
    }
}
