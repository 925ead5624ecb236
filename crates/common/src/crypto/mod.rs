//! Cryptographic primitives for vaultsync
//!
//! This module provides the two pieces the sync core needs before anything
//! touches the network:
//!
//! - **Key derivation**: PBKDF2-HMAC-SHA256 turns the principal's stable
//!   identifier into a 256-bit [`DerivedKey`]
//! - **Envelopes**: AES-256-GCM seals a JSON snapshot into an [`Envelope`]
//!
//! # Security Model
//!
//! ## Key
//! The key is derived with a fixed application salt and 100,000 rounds. It
//! lives only in memory and is wiped on drop. Since derivation is
//! deterministic, signing in again as the same principal recovers it.
//!
//! ## Envelopes
//! Each seal draws a fresh random 96-bit nonce. The GCM tag covers the whole
//! ciphertext, so any modification, truncation, or key/nonce mismatch is
//! reported as [`EnvelopeError::AuthenticationFailure`] and no plaintext is
//! ever returned.

mod derived_key;
mod envelope;

pub use derived_key::{
    DerivedKey, KdfParams, KeyDerivationError, APPLICATION_SALT, KDF_ITERATIONS, KEY_SIZE,
};
pub use envelope::{decrypt, encrypt, Envelope, EnvelopeError, NONCE_SIZE, TAG_SIZE};
