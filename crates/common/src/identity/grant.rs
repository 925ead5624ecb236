use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A short-lived bearer credential for the storage API
///
/// Issued by the identity provider's token flow once a principal is known.
/// Expiry is controlled by the issuer; the session only records it so that
/// a sync against a stale grant can fail loudly instead of being rejected
/// somewhere inside the storage API.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    token: String,
    pub scope: String,
    pub expires_at: DateTime<Utc>,
}

impl std::fmt::Debug for AccessGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessGrant")
            .field("token", &"<redacted>")
            .field("scope", &self.scope)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

impl AccessGrant {
    pub fn new(token: impl Into<String>, scope: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            token: token.into(),
            scope: scope.into(),
            expires_at,
        }
    }

    /// Build a grant from an OAuth `expires_in` style lifetime
    pub fn expiring_in(
        token: impl Into<String>,
        scope: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self::new(token, scope, issued_at + lifetime)
    }

    /// The raw bearer token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Value for the `Authorization` header
    pub fn bearer(&self) -> String {
        format!("Bearer {}", self.token)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}
