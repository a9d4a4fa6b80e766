//! Moderation policy configuration.

use serde::{Deserialize, Serialize};

/// Terms blocked when no denylist is configured.
pub const DEFAULT_DENYLIST: &[&str] = &["hate", "stupid", "ugly", "kill", "attack"];

/// Configures the keyword moderation filter.
///
/// Deserialized from the `[moderation]` section of the server config.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModerationPolicy {
    /// Terms matched as case-insensitive substrings of message text.
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
}

fn default_denylist() -> Vec<String> {
    DEFAULT_DENYLIST.iter().map(|s| s.to_string()).collect()
}

impl Default for ModerationPolicy {
    fn default() -> Self {
        Self {
            denylist: default_denylist(),
        }
    }
}
