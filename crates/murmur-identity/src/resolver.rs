//! Session identity resolution with a persisted fallback.

use std::sync::Arc;

use murmur_types::Identity;
use rand::Rng;
use tokio::sync::Mutex;

use crate::lookup::LookupService;
use crate::store::{LocalStore, FALLBACK_IDENTITY_KEY, NICKNAME_KEY};
use crate::IdentityError;

const FALLBACK_PREFIX: &str = "anon_";
const FALLBACK_LEN: usize = 9;
const BASE36: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

/// Generates a fresh fallback identifier: `anon_` followed by nine
/// lowercase base-36 characters.
pub fn generate_fallback_id() -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..FALLBACK_LEN)
        .map(|_| BASE36[rng.gen_range(0..BASE36.len())] as char)
        .collect();
    format!("{FALLBACK_PREFIX}{suffix}")
}

#[derive(Debug, Default)]
struct Resolved {
    id: Option<String>,
    nickname: Option<String>,
}

/// Resolves and caches the session identity.
///
/// The first successful [`resolve`](Self::resolve) fixes the id for the
/// lifetime of the resolver; later calls only recompute the display name.
pub struct IdentityResolver {
    lookup: Arc<dyn LookupService>,
    store: Arc<dyn LocalStore>,
    resolved: Mutex<Resolved>,
}

impl IdentityResolver {
    pub fn new(lookup: Arc<dyn LookupService>, store: Arc<dyn LocalStore>) -> Self {
        Self {
            lookup,
            store,
            resolved: Mutex::new(Resolved::default()),
        }
    }

    /// Returns the session identity. Never fails.
    pub async fn resolve(&self) -> Identity {
        let mut resolved = self.resolved.lock().await;

        if resolved.id.is_none() {
            let id = self.resolve_id().await;
            tracing::info!(identity = %id, "session identity resolved");
            resolved.id = Some(id);
            resolved.nickname = match self.store.get(NICKNAME_KEY).await {
                Ok(nickname) => nickname,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to read stored nickname");
                    None
                }
            };
        }

        let id = resolved.id.clone().unwrap_or_default();
        Identity::new(id, resolved.nickname.as_deref())
    }

    /// Sets or clears (blank input) the nickname and returns the updated
    /// identity.
    pub async fn set_nickname(&self, nickname: &str) -> Result<Identity, IdentityError> {
        let nickname = nickname.trim().to_string();
        self.store.set(NICKNAME_KEY, &nickname).await?;

        {
            let mut resolved = self.resolved.lock().await;
            resolved.nickname = Some(nickname);
        }
        Ok(self.resolve().await)
    }

    async fn resolve_id(&self) -> String {
        match self.lookup.lookup().await {
            Ok(id) => return id,
            Err(e) => {
                tracing::warn!(error = %e, "identity lookup failed, using fallback identity");
            }
        }

        match self.store.get(FALLBACK_IDENTITY_KEY).await {
            Ok(Some(id)) if !id.trim().is_empty() => return id,
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read fallback identity"),
        }

        let id = generate_fallback_id();
        if let Err(e) = self.store.set(FALLBACK_IDENTITY_KEY, &id).await {
            tracing::warn!(error = %e, "failed to persist fallback identity");
        }
        id
    }
}
