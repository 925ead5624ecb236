//! Identity handshake and session state
//!
//! - [`Principal`]: who the user is, read from the provider's assertion
//! - [`AccessGrant`]: what the app may touch, from the provider's token flow
//! - [`Session`]: the state machine that owns both plus the vault key
//! - [`IdentityProvider`]: the seam to the external provider's client
//! - [`Clock`]: injectable time for retries and expiry checks

mod clock;
mod grant;
mod principal;
mod provider;
mod session;

pub use clock::{Clock, SystemClock};
pub use grant::AccessGrant;
pub use principal::{AssertionError, Principal};
pub use provider::{
    IdentityProvider, StaticIdentityProvider, StaticProviderError, DRIVE_APPDATA_SCOPE,
};
pub use session::{Session, SessionConfig, SessionError, SessionState, DEFAULT_RETRY_DELAY};
