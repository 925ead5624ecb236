//! Symmetric vault key derivation using PBKDF2-HMAC-SHA256
//!
//! The vault key is never stored. It is re-derived from the principal's
//! stable identifier every time an identity is established, so the same
//! identity always lands on the same key.

use std::ops::Deref;

use pbkdf2::pbkdf2_hmac;
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Size of the derived AES-256-GCM key in bytes (256 bits)
pub const KEY_SIZE: usize = 32;
/// Application-wide salt. Uniqueness comes from the secret, not the salt.
pub const APPLICATION_SALT: &[u8] = b"OneTouchSalt";
/// PBKDF2 iteration count
pub const KDF_ITERATIONS: u32 = 100_000;

/// Errors that can occur during key derivation
#[derive(Debug, thiserror::Error)]
pub enum KeyDerivationError {
    #[error("cannot derive a key from an empty secret")]
    EmptySecret,
    #[error("key derivation unavailable: {0}")]
    UnavailableEnvironment(String),
}

/// Parameters fed to PBKDF2.
///
/// [`KdfParams::default`] is what every production path uses. Other values
/// only exist so callers can trade cost for speed where the key never
/// leaves the process (e.g. fixtures).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KdfParams {
    pub salt: Vec<u8>,
    pub iterations: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            salt: APPLICATION_SALT.to_vec(),
            iterations: KDF_ITERATIONS,
        }
    }
}

/// A 256-bit symmetric key for sealing vault snapshots
///
/// The key material is wiped when the value is dropped, and the `Debug`
/// implementation only ever prints a short fingerprint. There is no
/// `PartialEq`; compare fingerprints instead.
///
/// # Examples
///
/// ```ignore
/// let key = DerivedKey::derive("u123")?;
/// let again = DerivedKey::derive("u123")?;
/// assert_eq!(key.fingerprint(), again.fingerprint());
/// ```
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_SIZE]);

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DerivedKey").field(&self.fingerprint()).finish()
    }
}

impl Deref for DerivedKey {
    type Target = [u8; KEY_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; KEY_SIZE]> for DerivedKey {
    fn from(bytes: [u8; KEY_SIZE]) -> Self {
        DerivedKey(bytes)
    }
}

impl DerivedKey {
    /// Derive the vault key for `secret` with the application parameters
    pub fn derive(secret: &str) -> Result<Self, KeyDerivationError> {
        Self::derive_with(secret, &KdfParams::default())
    }

    /// Derive a key with explicit PBKDF2 parameters
    pub fn derive_with(secret: &str, params: &KdfParams) -> Result<Self, KeyDerivationError> {
        if secret.is_empty() {
            return Err(KeyDerivationError::EmptySecret);
        }
        if params.iterations == 0 {
            return Err(KeyDerivationError::UnavailableEnvironment(
                "pbkdf2 requires at least one iteration".to_string(),
            ));
        }

        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(secret.as_bytes(), &params.salt, params.iterations, &mut key);
        Ok(Self(key))
    }

    /// Derive off the async executor. PBKDF2 is deliberately slow.
    pub async fn derive_blocking(
        secret: String,
        params: KdfParams,
    ) -> Result<Self, KeyDerivationError> {
        tokio::task::spawn_blocking(move || Self::derive_with(&secret, &params))
            .await
            .map_err(|e| KeyDerivationError::UnavailableEnvironment(e.to_string()))?
    }

    /// Get a reference to the key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Short, non-reversible identifier for logs: first 8 bytes of SHA-256(key), hex
    pub fn fingerprint(&self) -> String {
        let digest = Sha256::digest(self.0);
        hex::encode(&digest[..8])
    }
}
