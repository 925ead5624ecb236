//! Snapshot sealing using AES-256-GCM
//!
//! A snapshot is serialized to JSON text, sealed under the vault key with a
//! fresh 96-bit nonce, and carried as an [`Envelope`] whose two fields are
//! standard base64. The persisted form is
//! `{ "cipher": "<ciphertext || tag>", "iv": "<nonce>" }`.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use super::DerivedKey;

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;
/// Size of the AES-GCM authentication tag in bytes
pub const TAG_SIZE: usize = 16;

/// Errors that can occur while sealing or opening an envelope
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    /// The tag check failed: tampered, truncated, or the wrong key
    #[error("cannot decrypt: authentication failed")]
    AuthenticationFailure,
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("payload is not representable as JSON: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("decrypted payload does not match the requested shape: {0}")]
    Deserialize(#[source] serde_json::Error),
    #[error("encryption unavailable: {0}")]
    UnavailableEnvironment(String),
}

/// A transportable encrypted payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Base64 of `ciphertext || tag`
    #[serde(rename = "cipher")]
    pub ciphertext: String,
    /// Base64 of the 12-byte nonce
    #[serde(rename = "iv")]
    pub nonce: String,
}

impl Envelope {
    /// Serialize to the persisted JSON wire form
    pub fn to_bytes(&self) -> Result<Vec<u8>, EnvelopeError> {
        serde_json::to_vec(self).map_err(EnvelopeError::Serialize)
    }

    /// Parse the persisted JSON wire form
    pub fn from_slice(data: &[u8]) -> Result<Self, EnvelopeError> {
        serde_json::from_slice(data).map_err(|e| EnvelopeError::MalformedEnvelope(e.to_string()))
    }

    fn decode(&self) -> Result<([u8; NONCE_SIZE], Vec<u8>), EnvelopeError> {
        let nonce = STANDARD
            .decode(&self.nonce)
            .map_err(|e| EnvelopeError::MalformedEnvelope(format!("iv: {}", e)))?;
        let nonce: [u8; NONCE_SIZE] = nonce.try_into().map_err(|v: Vec<u8>| {
            EnvelopeError::MalformedEnvelope(format!(
                "iv must be {} bytes, got {}",
                NONCE_SIZE,
                v.len()
            ))
        })?;
        let ciphertext = STANDARD
            .decode(&self.ciphertext)
            .map_err(|e| EnvelopeError::MalformedEnvelope(format!("cipher: {}", e)))?;
        Ok((nonce, ciphertext))
    }
}

/// Draw a nonce from the OS CSPRNG. An all-zero draw is discarded.
fn fresh_nonce() -> Result<[u8; NONCE_SIZE], EnvelopeError> {
    loop {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| EnvelopeError::UnavailableEnvironment(e.to_string()))?;
        if nonce != [0u8; NONCE_SIZE] {
            return Ok(nonce);
        }
    }
}

/// Seal a JSON-serializable payload under `key`
///
/// Every call uses a new random nonce, so sealing the same payload twice
/// yields two different envelopes.
///
/// # Errors
///
/// Returns an error if the payload cannot be serialized or the system RNG
/// is unavailable.
pub fn encrypt<T>(payload: &T, key: &DerivedKey) -> Result<Envelope, EnvelopeError>
where
    T: Serialize + ?Sized,
{
    let plaintext = serde_json::to_vec(payload).map_err(EnvelopeError::Serialize)?;

    let nonce_bytes = fresh_nonce()?;
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()));
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_ref())
        .map_err(|_| EnvelopeError::UnavailableEnvironment("aes-gcm encrypt failed".into()))?;

    Ok(Envelope {
        ciphertext: STANDARD.encode(ciphertext),
        nonce: STANDARD.encode(nonce_bytes),
    })
}

/// Open an envelope sealed under `key`
///
/// # Errors
///
/// - [`EnvelopeError::MalformedEnvelope`] if either field is not valid base64
///   or the nonce has the wrong length
/// - [`EnvelopeError::AuthenticationFailure`] if the ciphertext was modified,
///   truncated, or sealed under a different key or nonce
/// - [`EnvelopeError::Deserialize`] if the plaintext is not a `T`
pub fn decrypt<T>(envelope: &Envelope, key: &DerivedKey) -> Result<T, EnvelopeError>
where
    T: DeserializeOwned,
{
    let (nonce_bytes, ciphertext) = envelope.decode()?;
    if ciphertext.len() < TAG_SIZE {
        return Err(EnvelopeError::AuthenticationFailure);
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
        .map_err(|_| EnvelopeError::AuthenticationFailure)?;

    serde_json::from_slice(&plaintext).map_err(EnvelopeError::Deserialize)
}
