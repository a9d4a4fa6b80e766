//! Error types for topic and channel operations.

use murmur_gateway::GatewayError;
use thiserror::Error;

/// Errors that can occur during registry and channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// Input was rejected before any write was attempted.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// The gateway rejected a write. Nothing was stored.
    #[error("persistence write failed: {0}")]
    PersistenceWriteFailed(#[source] GatewayError),

    /// A live subscription broke. Recovery needs an explicit resubscribe.
    #[error("persistence subscription failed: {0}")]
    PersistenceSubscriptionFailed(#[source] GatewayError),

    /// No static or custom topic has this id.
    #[error("topic not found: {0}")]
    TopicNotFound(String),
}
