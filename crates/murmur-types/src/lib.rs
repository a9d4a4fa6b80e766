//! Shared types for the murmur workspace.
//!
//! This crate holds the records every other crate passes around: the
//! anonymous [`Identity`] of a session, [`Topic`]s (static or user-created),
//! and [`Message`]s with their moderation verdict. It also carries the
//! built-in topic catalog and the moderation policy used to configure the
//! keyword filter.
//!
//! No crate in the workspace depends on anything *except* `murmur-types` for
//! cross-cutting type definitions.

use serde::{Deserialize, Serialize};

mod catalog;
mod policy;

pub use catalog::{builtin_topics, DEFAULT_TOPIC_COLOR, TOPIC_PALETTE};
pub use policy::{ModerationPolicy, DEFAULT_DENYLIST};

/// Anonymous identity bound to one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    /// Stable discriminator (public address or locally generated fallback).
    pub id: String,
    /// Nickname when one is set, otherwise the id.
    pub display_name: String,
}

impl Identity {
    /// Builds an identity, falling back to `id` when the nickname is blank.
    pub fn new(id: impl Into<String>, nickname: Option<&str>) -> Self {
        let id = id.into();
        let display_name = match nickname.map(str::trim) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => id.clone(),
        };
        Self { id, display_name }
    }
}

/// A named discussion space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    /// Unique id. Static topics use small decimal ids, custom topics a UUID.
    pub id: String,
    pub title: String,
    pub description: String,
    /// Presentation hint (a palette class string), opaque to the engine.
    pub color: String,
    /// `true` for topics created by users through the gateway.
    pub is_custom: bool,
}

/// Parameters for creating a custom topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTopic {
    pub title: String,
    pub description: String,
    pub color: String,
}

/// Content type of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
}

impl MessageKind {
    /// Returns the canonical storage label for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::Video => "video",
        }
    }

    /// Whether the message carries a media URL rather than text.
    pub fn is_media(self) -> bool {
        !matches!(self, Self::Text)
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MessageKind {
    type Err = ParseMessageKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "image" => Ok(Self::Image),
            "audio" => Ok(Self::Audio),
            "video" => Ok(Self::Video),
            _ => Err(ParseMessageKindError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown message kind string.
#[derive(Debug, Clone)]
pub struct ParseMessageKindError(pub String);

impl std::fmt::Display for ParseMessageKindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown message kind: {}", self.0)
    }
}

impl std::error::Error for ParseMessageKindError {}

/// A message in a topic's stream, exactly as stored by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Gateway-assigned unique id.
    pub id: String,
    pub topic_id: String,
    /// Gateway-assigned per-topic write order, used to break `created_at` ties.
    pub seq: i64,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub author_id: String,
    /// Display name of the author at publish time.
    pub author_name: String,
    /// Gateway write time in milliseconds since the Unix epoch.
    pub created_at: i64,
    /// Moderation verdict computed once at publish time.
    pub moderated: bool,
}

impl Message {
    /// Returns the reader-facing view of this message.
    ///
    /// Moderated messages keep their author and timestamp but never expose
    /// their text or media.
    pub fn rendered(&self) -> RenderedMessage {
        let (text, media_url) = if self.moderated {
            (None, None)
        } else {
            (self.text.clone(), self.media_url.clone())
        };
        RenderedMessage {
            id: self.id.clone(),
            topic_id: self.topic_id.clone(),
            kind: self.kind,
            text,
            media_url,
            author_id: self.author_id.clone(),
            author_name: self.author_name.clone(),
            created_at: self.created_at,
            withheld: self.moderated,
        }
    }
}

/// Reader-facing projection of a [`Message`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderedMessage {
    pub id: String,
    pub topic_id: String,
    pub kind: MessageKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub created_at: i64,
    /// Content was blocked by moderation and is not shown.
    pub withheld: bool,
}

/// Parameters for writing a new message through the gateway.
///
/// `id`, `seq` and `created_at` are assigned by the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMessage {
    pub topic_id: String,
    pub kind: MessageKind,
    pub text: Option<String>,
    pub media_url: Option<String>,
    pub author_id: String,
    pub author_name: String,
    pub moderated: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_message(moderated: bool) -> Message {
        Message {
            id: "m-1".to_string(),
            topic_id: "12".to_string(),
            seq: 1,
            kind: MessageKind::Text,
            text: Some("I hate this".to_string()),
            media_url: None,
            author_id: "203.0.113.7".to_string(),
            author_name: "203.0.113.7".to_string(),
            created_at: 1_700_000_000_000,
            moderated,
        }
    }

    #[test]
    fn identity_display_name_defaults_to_id() {
        let identity = Identity::new("anon_abc123xyz", None);
        assert_eq!(identity.display_name, "anon_abc123xyz");

        let blank = Identity::new("anon_abc123xyz", Some("   "));
        assert_eq!(blank.display_name, "anon_abc123xyz");

        let named = Identity::new("anon_abc123xyz", Some("moth"));
        assert_eq!(named.id, "anon_abc123xyz");
        assert_eq!(named.display_name, "moth");
    }

    #[test]
    fn message_kind_labels() {
        for kind in [
            MessageKind::Text,
            MessageKind::Image,
            MessageKind::Audio,
            MessageKind::Video,
        ] {
            assert_eq!(kind.as_str().parse::<MessageKind>().unwrap(), kind);
        }
        assert!("gif".parse::<MessageKind>().is_err());
        assert!(!MessageKind::Text.is_media());
        assert!(MessageKind::Video.is_media());
    }

    #[test]
    fn moderated_message_renders_without_content() {
        let view = sample_message(true).rendered();
        assert!(view.withheld);
        assert_eq!(view.text, None);
        assert_eq!(view.media_url, None);
        assert_eq!(view.author_id, "203.0.113.7");
        assert_eq!(view.created_at, 1_700_000_000_000);

        let json = serde_json::to_value(&view).unwrap();
        assert!(json.get("text").is_none());
        assert_eq!(json["withheld"], true);
    }

    #[test]
    fn clean_message_renders_content() {
        let view = sample_message(false).rendered();
        assert!(!view.withheld);
        assert_eq!(view.text.as_deref(), Some("I hate this"));
    }

    #[test]
    fn topic_serializes_camel_case() {
        let topic = Topic {
            id: "1".to_string(),
            title: "childhood scars".to_string(),
            description: "d".to_string(),
            color: DEFAULT_TOPIC_COLOR.to_string(),
            is_custom: false,
        };
        let json = serde_json::to_value(&topic).unwrap();
        assert_eq!(json["isCustom"], false);
    }
}
