//! Shared test utilities for sync integration tests
#![allow(dead_code)]

use common::identity::Session;
use common::testkit::{fast_session_config, unsigned_assertion, ManualClock, ScriptedIdentityProvider};
use serde_json::json;

pub fn assertion_for(sub: &str) -> String {
    unsigned_assertion(&json!({
        "sub": sub,
        "name": "Test User",
        "email": format!("{}@example.com", sub),
    }))
}

/// A session that has signed in as `sub` but holds no grant yet
pub async fn signed_in_session(sub: &str, clock: &ManualClock) -> Session {
    let provider = ScriptedIdentityProvider::new(assertion_for(sub), clock);
    let mut session = Session::new(fast_session_config());
    session.sign_in(&provider, clock).await.unwrap();
    session
}

/// A session that has signed in as `sub` and holds a fresh one-hour grant
pub async fn authorized_session(sub: &str, clock: &ManualClock) -> Session {
    let provider = ScriptedIdentityProvider::new(assertion_for(sub), clock);
    let mut session = Session::new(fast_session_config());
    session.sign_in(&provider, clock).await.unwrap();
    session.authorize_storage(&provider).await.unwrap();
    session
}
