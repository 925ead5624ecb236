/// Lightweight harness for driving the sync core without a real identity
/// provider, wall clock, or network.
///
/// # Example
///
/// ```rust,ignore
/// use common::testkit::{ManualClock, ScriptedIdentityProvider, unsigned_assertion};
///
/// #[tokio::test]
/// async fn test_sign_in() {
///     let clock = ManualClock::default();
///     let provider = ScriptedIdentityProvider::new(
///         unsigned_assertion(&serde_json::json!({"sub": "u123"})),
///         &clock,
///     )
///     .ready_after(2);
///
///     let mut session = Session::new(fast_session_config());
///     session.sign_in(&provider, &clock).await.unwrap();
///     assert_eq!(clock.sleeps().len(), 2);
/// }
/// ```
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};

use crate::crypto::KdfParams;
use crate::identity::{AccessGrant, Clock, IdentityProvider, Principal, SessionConfig};

/// Build a `header.payload.signature` assertion around `claims`.
///
/// The signature segment is a placeholder; nothing in the core verifies it.
pub fn unsigned_assertion(claims: &serde_json::Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    format!("{}.{}.c2lnbmF0dXJl", header, payload)
}

/// Session config with a cheap KDF and no real delays
pub fn fast_session_config() -> SessionConfig {
    SessionConfig {
        kdf: KdfParams {
            iterations: 1_000,
            ..KdfParams::default()
        },
        retry_delay: Duration::from_millis(10),
        ..SessionConfig::default()
    }
}

/// A clock that only moves when something sleeps on it or it is advanced
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<Mutex<ManualClockInner>>,
}

#[derive(Debug)]
struct ManualClockInner {
    now: DateTime<Utc>,
    sleeps: Vec<Duration>,
}

impl Default for ManualClock {
    fn default() -> Self {
        let start = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::starting_at(start)
    }
}

impl ManualClock {
    pub fn starting_at(now: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ManualClockInner {
                now,
                sleeps: Vec::new(),
            })),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.lock().now += to_chrono(by);
    }

    /// Every delay slept so far, in order
    pub fn sleeps(&self) -> Vec<Duration> {
        self.lock().sleeps.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ManualClockInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn to_chrono(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).expect("test clock durations fit in chrono::Duration")
}

#[async_trait]
impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().now
    }

    async fn sleep(&self, duration: Duration) {
        let mut inner = self.lock();
        inner.sleeps.push(duration);
        inner.now += to_chrono(duration);
    }
}

#[derive(Debug, thiserror::Error)]
#[error("scripted provider: {0}")]
pub struct ScriptedProviderError(pub String);

/// An identity provider whose client "loads" after a number of polls and
/// hands out numbered one-hour grants.
#[derive(Debug)]
pub struct ScriptedIdentityProvider {
    assertion: String,
    clock: ManualClock,
    ready_after: u32,
    fail_grants: bool,
    polls: AtomicU32,
    grants: AtomicU32,
}

impl ScriptedIdentityProvider {
    pub fn new(assertion: impl Into<String>, clock: &ManualClock) -> Self {
        Self {
            assertion: assertion.into(),
            clock: clock.clone(),
            ready_after: 0,
            fail_grants: false,
            polls: AtomicU32::new(0),
            grants: AtomicU32::new(0),
        }
    }

    /// Report not-ready for the first `polls` readiness checks
    pub fn ready_after(mut self, polls: u32) -> Self {
        self.ready_after = polls;
        self
    }

    /// Reject every grant request
    pub fn failing_grants(mut self) -> Self {
        self.fail_grants = true;
        self
    }

    pub fn grants_issued(&self) -> u32 {
        self.grants.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentityProvider {
    type Error = ScriptedProviderError;

    async fn is_ready(&self) -> bool {
        self.polls.fetch_add(1, Ordering::SeqCst) >= self.ready_after
    }

    async fn assertion(&self) -> Result<String, Self::Error> {
        Ok(self.assertion.clone())
    }

    async fn request_access_grant(
        &self,
        principal: &Principal,
        scope: &str,
    ) -> Result<AccessGrant, Self::Error> {
        if self.fail_grants {
            return Err(ScriptedProviderError(format!(
                "consent denied for {}",
                principal.id
            )));
        }
        let n = self.grants.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(AccessGrant::expiring_in(
            format!("token-{}", n),
            scope,
            self.clock.now(),
            chrono::Duration::hours(1),
        ))
    }
}
