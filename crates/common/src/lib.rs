/**
 * Key derivation and authenticated encryption.
 *  - Deterministic per-principal vault key
 *  - Sealed `{cipher, iv}` envelopes
 */
pub mod crypto;
/**
 * Who the user is and what they may touch.
 * Decodes identity assertions, holds short-lived
 *  storage grants and drives the sign-in state machine.
 */
pub mod identity;
/**
 * Keeps the single remote snapshot object in step
 *  with local state. Create on first push,
 *  full overwrite after that.
 */
pub mod reconcile;
/**
 * Remote object storage behind a narrow trait,
 *  with an in-memory and a Google Drive backend.
 */
pub mod remote;
pub mod snapshot;
/**
 * Test doubles for clocks and identity providers.
 * Only built for tests and under the `testkit` feature.
 */
#[cfg(any(test, feature = "testkit"))]
pub mod testkit;

pub mod prelude {
    pub use crate::crypto::{decrypt, encrypt, DerivedKey, Envelope, EnvelopeError};
    pub use crate::identity::{AccessGrant, Principal, Session, SessionError, SessionState};
    pub use crate::reconcile::{
        DeferReason, DuplicatePolicy, ReconcileError, ReconcileOutcome, Reconciler,
    };
    pub use crate::remote::{RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError};
    pub use crate::snapshot::Snapshot;
}
