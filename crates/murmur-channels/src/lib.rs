//! Topic registry and moderated message channels.
//!
//! - [`TopicRegistry`] merges the static topic catalog with custom topics
//!   from the gateway into one live list (custom first, then static).
//! - [`MessageChannel`] is one topic's ordered message stream. Publishing
//!   runs text through a [`ModerationFilter`] exactly once and stores the
//!   verdict with the message.
//! - [`Session`] bundles identity, registry and open channels for one
//!   participant.
//!
//! Registry and channels share the same subscription model: listeners get
//! full snapshots, the state follows [`SubscriptionState`], and a
//! [`Subscription`] handle releases its listener when dropped.

mod channel;
mod error;
mod moderation;
mod registry;
mod session;
mod subscription;

pub use channel::{MessageChannel, MessageDraft};
pub use error::ChannelError;
pub use moderation::{KeywordFilter, ModerationFilter};
pub use registry::{validate_topic, TopicRegistry, MAX_DESCRIPTION_LEN, MAX_TITLE_LEN};
pub use session::Session;
pub use subscription::{Delivery, Listener, Subscription, SubscriptionState};
