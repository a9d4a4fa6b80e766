//! Persistence gateway for topics and messages.
//!
//! The gateway is the source of truth for custom topics and for every
//! topic's message stream. It offers two kinds of operation:
//!
//! - **create**: durably store a record and return it with its
//!   gateway-assigned fields (id, per-topic sequence, write timestamp);
//! - **live query**: a [`LiveQuery`] that yields the full current snapshot
//!   of a collection immediately and again after every relevant write.
//!
//! [`PersistenceGateway`] is the seam other crates program against.
//! [`SqliteGateway`] is the bundled implementation; it keeps an in-process
//! change feed so live queries in the same process see writes immediately.
//!
//! # Ordering guarantees
//!
//! | Collection | Snapshot order |
//! |------------|----------------|
//! | topics     | creation order |
//! | messages   | `created_at` ascending, then `seq` ascending |
//!
//! Snapshots delivered by one live query grow monotonically: each snapshot
//! is read after the previous one, and both collections are append-only.

mod error;
mod live;
mod sqlite;

pub use error::GatewayError;
pub use live::LiveQuery;
pub use sqlite::{insert_message, insert_topic, list_messages, list_topics, SqliteGateway};

use async_trait::async_trait;
use murmur_types::{Message, NewMessage, NewTopic, Topic};

/// Durable storage with change notification for topics and messages.
#[async_trait]
pub trait PersistenceGateway: Send + Sync + 'static {
    /// Stores a custom topic and returns it with its assigned id.
    async fn create_topic(&self, topic: NewTopic) -> Result<Topic, GatewayError>;

    /// Appends a message to its topic's stream.
    ///
    /// The gateway assigns `id`, `seq` and `created_at` at write time.
    async fn create_message(&self, message: NewMessage) -> Result<Message, GatewayError>;

    /// Opens a live query over all custom topics.
    async fn live_topics(&self) -> Result<LiveQuery<Topic>, GatewayError>;

    /// Opens a live query over one topic's messages.
    async fn live_messages(&self, topic_id: &str) -> Result<LiveQuery<Message>, GatewayError>;
}
