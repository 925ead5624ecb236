//! The identity handshake as an explicit state machine.
//!
//! ```text
//! Unauthenticated --assertion--> IdentityEstablished --grant--> StorageAuthorized
//!                                                                 |        ^
//!                                                                 +-grant--+
//! ```
//!
//! Establishing identity derives the vault key. Requesting a grant never
//! touches the key or the principal, so it can be repeated whenever the
//! previous grant expires.

use std::sync::Arc;
use std::time::Duration;

use crate::crypto::{DerivedKey, KdfParams, KeyDerivationError};

use super::provider::DRIVE_APPDATA_SCOPE;
use super::{AccessGrant, AssertionError, Clock, IdentityProvider, Principal};

/// Default delay between readiness polls of the identity provider
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Unauthenticated,
    IdentityEstablished,
    StorageAuthorized,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Unauthenticated => write!(f, "unauthenticated"),
            SessionState::IdentityEstablished => write!(f, "identity established"),
            SessionState::StorageAuthorized => write!(f, "storage authorized"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("identity provider still not ready after {0} attempts")]
    IdentityNotReady(u32),
    #[error("invalid identity assertion: {0}")]
    Assertion(#[from] AssertionError),
    #[error("key derivation failed: {0}")]
    KeyDerivation(#[from] KeyDerivationError),
    #[error("session already belongs to {current}, refusing assertion for {offered}")]
    PrincipalMismatch { current: String, offered: String },
    #[error("assertion was issued for {found:?}, not for client {expected}")]
    AudienceMismatch { expected: String, found: Vec<String> },
    #[error("identity must be established before requesting storage access")]
    IdentityRequired,
    #[error("identity provider failed: {0}")]
    Provider(#[source] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Scope requested for the storage grant
    pub scope: String,
    /// Fixed delay between provider readiness polls
    pub retry_delay: Duration,
    /// Give up after this many polls. `None` waits forever.
    pub max_attempts: Option<u32>,
    /// OAuth client id this app signs in as. When set, assertions issued
    /// for another client are refused.
    pub client_id: Option<String>,
    pub kdf: KdfParams,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scope: DRIVE_APPDATA_SCOPE.to_string(),
            retry_delay: DEFAULT_RETRY_DELAY,
            max_attempts: None,
            client_id: None,
            kdf: KdfParams::default(),
        }
    }
}

/// Owns the principal, the vault key and the storage grant for one user.
///
/// Created and held by the application controller and lent to the
/// reconciler for each sync; nothing here is global.
#[derive(Debug)]
pub struct Session {
    config: SessionConfig,
    principal: Option<Principal>,
    key: Option<Arc<DerivedKey>>,
    grant: Option<AccessGrant>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

impl Session {
    pub fn new(config: SessionConfig) -> Self {
        Self {
            config,
            principal: None,
            key: None,
            grant: None,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn state(&self) -> SessionState {
        match (&self.principal, &self.grant) {
            (None, _) => SessionState::Unauthenticated,
            (Some(_), None) => SessionState::IdentityEstablished,
            (Some(_), Some(_)) => SessionState::StorageAuthorized,
        }
    }

    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    /// The vault key, once identity is established
    pub fn key(&self) -> Option<Arc<DerivedKey>> {
        self.key.clone()
    }

    /// The most recent storage grant. May have expired.
    pub fn grant(&self) -> Option<&AccessGrant> {
        self.grant.as_ref()
    }

    /// Poll the provider until its client is loaded.
    ///
    /// Retries on a fixed delay, never backing off. Returns the number of
    /// polls it took.
    pub async fn wait_until_ready<P, C>(&self, provider: &P, clock: &C) -> Result<u32, SessionError>
    where
        P: IdentityProvider,
        C: Clock,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            if provider.is_ready().await {
                tracing::debug!(attempts, "identity provider ready");
                return Ok(attempts);
            }
            if let Some(max) = self.config.max_attempts {
                if attempts >= max {
                    return Err(SessionError::IdentityNotReady(attempts));
                }
            }
            tracing::warn!(
                attempt = attempts,
                delay_ms = self.config.retry_delay.as_millis() as u64,
                "identity provider not yet available, retrying"
            );
            clock.sleep(self.config.retry_delay).await;
        }
    }

    /// Full sign-in: wait for the provider, take its assertion, establish
    /// identity.
    pub async fn sign_in<P, C>(&mut self, provider: &P, clock: &C) -> Result<&Principal, SessionError>
    where
        P: IdentityProvider,
        C: Clock,
    {
        self.wait_until_ready(provider, clock).await?;
        let assertion = provider
            .assertion()
            .await
            .map_err(|e| SessionError::Provider(Box::new(e)))?;
        self.establish_identity(&assertion).await
    }

    /// Handle the provider's sign-in callback.
    ///
    /// Decodes the assertion and derives the vault key from the principal's
    /// id. A repeated callback for the same principal is a no-op; one for a
    /// different principal is refused.
    pub async fn establish_identity(&mut self, assertion: &str) -> Result<&Principal, SessionError> {
        let offered = Principal::from_assertion(assertion)?;
        if let Some(client_id) = &self.config.client_id {
            if !offered.issued_for(client_id) {
                return Err(SessionError::AudienceMismatch {
                    expected: client_id.clone(),
                    found: offered.audience,
                });
            }
        }

        match self.principal.as_ref().map(|current| current.id.clone()) {
            Some(current) if current == offered.id => {
                tracing::debug!(principal = %current, "identity already established");
            }
            Some(current) => {
                return Err(SessionError::PrincipalMismatch {
                    current,
                    offered: offered.id,
                });
            }
            None => {
                let key =
                    DerivedKey::derive_blocking(offered.id.clone(), self.config.kdf.clone()).await?;
                tracing::info!(
                    principal = %offered,
                    key = %key.fingerprint(),
                    "vault key derived"
                );
                self.key = Some(Arc::new(key));
                self.principal = Some(offered);
            }
        }

        self.principal.as_ref().ok_or(SessionError::IdentityRequired)
    }

    /// Request a storage grant.
    ///
    /// Valid from `IdentityEstablished` and re-enterable from
    /// `StorageAuthorized`. The key and principal are left untouched.
    pub async fn authorize_storage<P>(&mut self, provider: &P) -> Result<&AccessGrant, SessionError>
    where
        P: IdentityProvider,
    {
        let principal = self
            .principal
            .as_ref()
            .ok_or(SessionError::IdentityRequired)?;

        let grant = provider
            .request_access_grant(principal, &self.config.scope)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "access grant request failed");
                SessionError::Provider(Box::new(e))
            })?;
        tracing::info!(scope = %grant.scope, expires_at = %grant.expires_at, "access grant acquired");

        Ok(&*self.grant.insert(grant))
    }
}
