//! Anonymous session identity.
//!
//! Every session is bound to an [`Identity`](murmur_types::Identity) whose
//! `id` comes from a best-effort [`LookupService`] (the public network
//! address by default). When the lookup fails the resolver falls back to a
//! random identifier kept in a [`LocalStore`], so the same fallback id is
//! reused across restarts. Lookup failures never leave this crate: they are
//! logged and absorbed.
//!
//! The display name follows the user's nickname, also kept in the local
//! store, and defaults to the id.

mod lookup;
mod resolver;
mod store;

pub use lookup::{HttpLookupService, LookupError, LookupService};
pub use resolver::{generate_fallback_id, IdentityResolver};
pub use store::{LocalStore, SqliteLocalStore, StoreError, FALLBACK_IDENTITY_KEY, NICKNAME_KEY};

use thiserror::Error;

/// Errors surfaced by identity operations.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// The local store rejected a nickname write.
    #[error("failed to persist nickname: {0}")]
    Store(#[from] StoreError),
}
