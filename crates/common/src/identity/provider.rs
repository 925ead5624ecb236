use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{AccessGrant, Principal};

/// OAuth scope for the per-application hidden drive folder
pub const DRIVE_APPDATA_SCOPE: &str = "https://www.googleapis.com/auth/drive.appdata";

/// The external identity provider's client.
///
/// Identity and storage access are two separate, separately consented
/// steps: [`IdentityProvider::assertion`] proves *who* the user is,
/// [`IdentityProvider::request_access_grant`] proves *what* the app may
/// touch on their behalf.
#[async_trait]
pub trait IdentityProvider: Send + Sync + Debug {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether the provider's client has loaded and can start a handshake.
    ///
    /// The client may come up asynchronously after the application starts,
    /// so callers poll this on a fixed delay until it turns true.
    async fn is_ready(&self) -> bool;

    /// Prompt for sign-in and return the signed assertion handed to the
    /// callback
    async fn assertion(&self) -> Result<String, Self::Error>;

    /// Run the token flow for `scope` on behalf of `principal`
    async fn request_access_grant(
        &self,
        principal: &Principal,
        scope: &str,
    ) -> Result<AccessGrant, Self::Error>;
}

#[derive(Debug, thiserror::Error)]
pub enum StaticProviderError {
    #[error("no access token was supplied")]
    NoAccessToken,
}

/// A provider whose credentials were obtained out of band.
///
/// Used by the CLI: the assertion and the access token come from flags or
/// files, so the provider is always ready and never prompts.
#[derive(Debug, Clone)]
pub struct StaticIdentityProvider {
    assertion: String,
    access_token: Option<String>,
    expires_at: DateTime<Utc>,
}

impl StaticIdentityProvider {
    pub fn new(
        assertion: impl Into<String>,
        access_token: Option<String>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            assertion: assertion.into(),
            access_token,
            expires_at,
        }
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    type Error = StaticProviderError;

    async fn is_ready(&self) -> bool {
        true
    }

    async fn assertion(&self) -> Result<String, Self::Error> {
        Ok(self.assertion.clone())
    }

    async fn request_access_grant(
        &self,
        _principal: &Principal,
        scope: &str,
    ) -> Result<AccessGrant, Self::Error> {
        let token = self
            .access_token
            .clone()
            .ok_or(StaticProviderError::NoAccessToken)?;
        Ok(AccessGrant::new(token, scope, self.expires_at))
    }
}
