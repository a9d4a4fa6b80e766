//! Identity lookup service.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors from an identity lookup. Never surfaced past the resolver.
#[derive(Debug, Error)]
pub enum LookupError {
    /// The service could not be reached or answered with an error status.
    #[error("lookup service unavailable: {0}")]
    Unavailable(#[from] reqwest::Error),

    /// The service answered, but not with a usable discriminator.
    #[error("malformed lookup response: {0}")]
    Malformed(String),
}

/// A best-effort source of a globally stable discriminator.
#[async_trait]
pub trait LookupService: Send + Sync + 'static {
    /// Returns a non-empty discriminator.
    async fn lookup(&self) -> Result<String, LookupError>;
}

#[derive(Debug, Deserialize)]
struct LookupResponse {
    ip: String,
}

/// Looks up the public network address through a JSON endpoint answering
/// `{"ip": "..."}` (e.g. `https://api.ipify.org?format=json`).
#[derive(Debug, Clone)]
pub struct HttpLookupService {
    client: reqwest::Client,
    url: String,
}

impl HttpLookupService {
    /// Builds a lookup client with a request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`LookupError::Unavailable`] if the HTTP client cannot be built.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl LookupService for HttpLookupService {
    async fn lookup(&self) -> Result<String, LookupError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?;

        let body: LookupResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Malformed(e.to_string()))?;

        let ip = body.ip.trim();
        if ip.is_empty() {
            return Err(LookupError::Malformed("empty discriminator".to_string()));
        }
        Ok(ip.to_string())
    }
}
