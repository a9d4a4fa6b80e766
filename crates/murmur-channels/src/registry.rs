//! Merged view of static and custom topics.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use murmur_gateway::{GatewayError, LiveQuery, PersistenceGateway};
use murmur_types::{builtin_topics, NewTopic, Topic, DEFAULT_TOPIC_COLOR};

use crate::error::ChannelError;
use crate::subscription::{Delivery, FeedSource, LiveFeed, Subscription, SubscriptionState};

/// Maximum topic title length, in characters.
pub const MAX_TITLE_LEN: usize = 256;

/// Maximum topic description length, in characters.
pub const MAX_DESCRIPTION_LEN: usize = 1024;

/// Validates and normalizes topic input.
///
/// Title and description are trimmed and must be non-empty; a blank color
/// falls back to [`DEFAULT_TOPIC_COLOR`].
pub fn validate_topic(
    title: &str,
    description: &str,
    color: &str,
) -> Result<NewTopic, ChannelError> {
    let title = title.trim();
    let description = description.trim();
    let color = color.trim();

    if title.is_empty() {
        return Err(ChannelError::ValidationFailed(
            "title must not be empty".to_string(),
        ));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(ChannelError::ValidationFailed(format!(
            "title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    if description.is_empty() {
        return Err(ChannelError::ValidationFailed(
            "description must not be empty".to_string(),
        ));
    }
    if description.chars().count() > MAX_DESCRIPTION_LEN {
        return Err(ChannelError::ValidationFailed(format!(
            "description must be at most {MAX_DESCRIPTION_LEN} characters"
        )));
    }

    Ok(NewTopic {
        title: title.to_string(),
        description: description.to_string(),
        color: if color.is_empty() {
            DEFAULT_TOPIC_COLOR.to_string()
        } else {
            color.to_string()
        },
    })
}

/// Custom topics first, in gateway order, then the static catalog in
/// catalog order.
fn merge_topics(custom: Vec<Topic>, catalog: &[Topic]) -> Vec<Topic> {
    let static_ids: HashSet<&str> = catalog.iter().map(|t| t.id.as_str()).collect();
    for topic in custom.iter().filter(|t| static_ids.contains(t.id.as_str())) {
        tracing::warn!(
            topic_id = %topic.id,
            "custom topic id collides with a static topic, keeping both"
        );
    }

    let mut merged = custom;
    merged.extend(catalog.iter().cloned());
    merged
}

struct TopicSource {
    gateway: Arc<dyn PersistenceGateway>,
    catalog: Vec<Topic>,
}

#[async_trait]
impl FeedSource for TopicSource {
    type Item = Topic;

    fn name(&self) -> &str {
        "topics"
    }

    async fn open(&self) -> Result<LiveQuery<Topic>, GatewayError> {
        self.gateway.live_topics().await
    }

    fn project(&self, custom: Vec<Topic>) -> Vec<Topic> {
        merge_topics(custom, &self.catalog)
    }

    fn initial(&self) -> Option<Vec<Topic>> {
        Some(self.catalog.clone())
    }
}

/// Live, merged list of static and custom topics.
///
/// Before the gateway answers, and after a subscription failure, the list
/// still holds at least the static catalog.
pub struct TopicRegistry {
    gateway: Arc<dyn PersistenceGateway>,
    feed: LiveFeed<TopicSource>,
}

impl TopicRegistry {
    /// Creates a registry over the built-in catalog.
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self::with_catalog(gateway, builtin_topics())
    }

    /// Creates a registry over a custom static catalog.
    pub fn with_catalog(gateway: Arc<dyn PersistenceGateway>, catalog: Vec<Topic>) -> Self {
        let feed = LiveFeed::new(TopicSource {
            gateway: Arc::clone(&gateway),
            catalog,
        });
        Self { gateway, feed }
    }

    /// Registers a listener for merged topic snapshots.
    ///
    /// The listener is called with the current snapshot before this returns,
    /// then again after every change until the subscription is released.
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn(Delivery<'_, Topic>) + Send + Sync + 'static,
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

    /// The error that moved the registry to [`SubscriptionState::Error`].
    pub fn last_error(&self) -> Option<Arc<ChannelError>> {
        self.feed.last_error()
    }

    /// Merged topic list.
    ///
    /// Served from the live snapshot while the registry is
    /// [`SubscriptionState::Live`]. Otherwise the custom topics are read once
    /// from the gateway; if that fails too, the last known list (at least the
    /// static catalog) is returned.
    pub async fn topics(&self) -> Vec<Topic> {
        if self.feed.state() == SubscriptionState::Live {
            if let Some(topics) = self.feed.snapshot() {
                return topics;
            }
        }
        match self.read_custom().await {
            Ok(custom) => merge_topics(custom, &self.feed.source().catalog),
            Err(e) => {
                tracing::warn!(error = %e, "topic read failed, serving last known list");
                self.cached()
            }
        }
    }

    /// Topics whose title or description contains `query`, ignoring case.
    pub async fn search(&self, query: &str) -> Vec<Topic> {
        let query = query.trim().to_lowercase();
        let topics = self.topics().await;
        if query.is_empty() {
            return topics;
        }
        topics
            .into_iter()
            .filter(|t| {
                t.title.to_lowercase().contains(&query)
                    || t.description.to_lowercase().contains(&query)
            })
            .collect()
    }

    /// Resolves a topic by id.
    ///
    /// Looks at the cached snapshot (which always holds the static catalog)
    /// first, then asks the gateway for topics created since.
    pub async fn find(&self, id: &str) -> Result<Topic, ChannelError> {
        if let Some(topic) = self.cached().into_iter().find(|t| t.id == id) {
            return Ok(topic);
        }

        self.read_custom()
            .await
            .map_err(ChannelError::PersistenceSubscriptionFailed)?
            .into_iter()
            .find(|t| t.id == id)
            .ok_or_else(|| ChannelError::TopicNotFound(id.to_string()))
    }

    fn cached(&self) -> Vec<Topic> {
        self.feed
            .snapshot()
            .unwrap_or_else(|| self.feed.source().catalog.clone())
    }

    /// One-shot read of the custom topics.
    async fn read_custom(&self) -> Result<Vec<Topic>, GatewayError> {
        let mut query = self.gateway.live_topics().await?;
        query.next().await.unwrap_or(Err(GatewayError::Closed))
    }

    /// Validates and stores a custom topic.
    ///
    /// Invalid input never reaches the gateway. Listeners see the new topic
    /// once the gateway reports it.
    pub async fn create(
        &self,
        title: &str,
        description: &str,
        color: &str,
    ) -> Result<Topic, ChannelError> {
        let new_topic = validate_topic(title, description, color)?;
        let topic = self.gateway.create_topic(new_topic).await.map_err(|e| {
            tracing::error!(error = %e, "failed to store custom topic");
            ChannelError::PersistenceWriteFailed(e)
        })?;
        tracing::info!(topic_id = %topic.id, title = %topic.title, "custom topic created");
        Ok(topic)
    }
}
