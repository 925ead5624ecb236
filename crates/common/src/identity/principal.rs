//! # Principals
//!
//! A principal is the identity the provider vouches for. It arrives inside a
//! signed assertion (a JWT) delivered to the sign-in callback. Only the
//! payload segment is read here; the signature has already been checked by
//! the provider's own client before the callback fires.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Deserializer, Serialize};

/// Errors raised while reading an identity assertion
#[derive(Debug, thiserror::Error)]
pub enum AssertionError {
    #[error("assertion must have 3 dot-separated segments, found {0}")]
    Segments(usize),
    #[error("assertion payload is not base64url: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("assertion payload is not a claims object: {0}")]
    Claims(#[from] serde_json::Error),
    #[error("assertion carries no subject")]
    MissingSubject,
}

/// The authenticated identity for a session.
///
/// Immutable once the session has established it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Principal {
    /// Stable unique identifier (`sub`). This is the key derivation secret.
    #[serde(rename = "sub", default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    /// Avatar reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub picture: Option<String>,
    /// OAuth client ids the assertion was issued for (`aud`)
    #[serde(
        rename = "aud",
        default,
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub audience: Vec<String>,
}

/// `aud` may be a single string or an array of them
fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(aud) => vec![aud],
        OneOrMany::Many(auds) => auds,
    })
}

impl Principal {
    /// Read the principal out of a `header.payload.signature` assertion
    pub fn from_assertion(assertion: &str) -> Result<Self, AssertionError> {
        let segments: Vec<&str> = assertion.trim().split('.').collect();
        if segments.len() != 3 {
            return Err(AssertionError::Segments(segments.len()));
        }

        // some issuers pad the segment anyway
        let payload = URL_SAFE_NO_PAD.decode(segments[1].trim_end_matches('='))?;
        let principal: Principal = serde_json::from_slice(&payload)?;
        if principal.id.is_empty() {
            return Err(AssertionError::MissingSubject);
        }
        Ok(principal)
    }

    /// Whether the assertion was issued for `client_id`. An assertion
    /// without an audience claim is taken as issued for anyone.
    pub fn issued_for(&self, client_id: &str) -> bool {
        self.audience.is_empty() || self.audience.iter().any(|aud| aud == client_id)
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.name.is_empty(), self.email.is_empty()) {
            (false, false) => write!(f, "{} <{}>", self.name, self.email),
            (true, false) => write!(f, "{}", self.email),
            _ => write!(f, "{}", self.id),
        }
    }
}
