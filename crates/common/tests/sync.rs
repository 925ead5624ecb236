//! End-to-end sync through a session, the reconciler and the memory store

mod common;

use std::sync::Arc;

use ::common::crypto::{self, DerivedKey, Envelope, EnvelopeError};
use ::common::identity::{AccessGrant, Clock};
use ::common::reconcile::{DeferReason, ReconcileOutcome, Reconciler};
use ::common::remote::{
    MemoryRemoteStore, RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError,
};
use ::common::snapshot::Snapshot;
use ::common::testkit::{fast_session_config, ManualClock};
use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::{oneshot, Mutex, Notify};

fn key_for(sub: &str) -> DerivedKey {
    DerivedKey::derive_with(sub, &fast_session_config().kdf).unwrap()
}

fn stored_envelope(store: &MemoryRemoteStore, id: &str) -> Envelope {
    Envelope::from_slice(&store.body(id).unwrap()).unwrap()
}

#[tokio::test]
async fn test_first_sync_creates_then_updates() {
    let clock = ManualClock::default();
    let session = common::authorized_session("u123", &clock).await;
    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock);

    let first = reconciler
        .sync(&session, &json!({"note": "hello"}))
        .await
        .unwrap();
    let ReconcileOutcome::Created(handle) = first else {
        panic!("expected create, got {:?}", first);
    };
    assert_eq!(handle.name, "vault.json");

    let second = reconciler
        .sync(&session, &json!({"note": "hello again"}))
        .await
        .unwrap();
    assert_eq!(second, ReconcileOutcome::Updated(handle.clone()));

    let store = reconciler.store();
    assert_eq!(store.objects().len(), 1);
    assert_eq!(store.objects()[0].container, "appDataFolder");

    // Anyone holding the same principal id can open it
    let opened: Value = crypto::decrypt(&stored_envelope(store, &handle.id), &key_for("u123")).unwrap();
    assert_eq!(opened, json!({"note": "hello again"}));
}

#[tokio::test]
async fn test_remote_never_sees_plaintext() {
    let clock = ManualClock::default();
    let session = common::authorized_session("u123", &clock).await;
    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock);

    let outcome = reconciler
        .sync(&session, &json!({"note": "top secret"}))
        .await
        .unwrap();
    let body = reconciler.store().body(&outcome.handle().unwrap().id).unwrap();
    let text = String::from_utf8(body).unwrap();

    assert!(!text.contains("top secret"));
    let wire: Value = serde_json::from_str(&text).unwrap();
    assert!(wire.get("cipher").is_some());
    assert!(wire.get("iv").is_some());
}

#[tokio::test]
async fn test_snapshot_type_round_trips_through_remote() {
    let clock = ManualClock::default();
    let session = common::authorized_session("u123", &clock).await;
    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock);
    let snapshot = Snapshot::new()
        .with_section("note", &"hello")
        .unwrap()
        .with_section("tags", &vec!["a", "b"])
        .unwrap();

    let outcome = reconciler.sync(&session, &snapshot).await.unwrap();
    let envelope = stored_envelope(reconciler.store(), &outcome.handle().unwrap().id);
    let opened: Snapshot = crypto::decrypt(&envelope, &session.key().unwrap()).unwrap();

    assert_eq!(opened, snapshot);
    assert_eq!(opened.section::<Vec<String>>("tags").unwrap().unwrap(), vec!["a", "b"]);
}

#[tokio::test]
async fn test_unauthenticated_session_defers() {
    let clock = ManualClock::default();
    let session = ::common::identity::Session::new(fast_session_config());
    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock);

    let outcome = reconciler.sync(&session, &json!({"note": "x"})).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deferred(DeferReason::MissingKey));
    assert!(reconciler.store().calls().is_empty());
}

#[tokio::test]
async fn test_identity_without_grant_defers() {
    let clock = ManualClock::default();
    let session = common::signed_in_session("u123", &clock).await;
    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock);

    let outcome = reconciler.sync(&session, &json!({"note": "x"})).await.unwrap();
    assert_eq!(outcome, ReconcileOutcome::Deferred(DeferReason::MissingGrant));
    assert!(reconciler.store().calls().is_empty());
}

#[tokio::test]
async fn test_tampered_remote_is_rejected() {
    let clock = ManualClock::default();
    let session = common::authorized_session("u123", &clock).await;
    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock);

    let outcome = reconciler.sync(&session, &json!({"note": "x"})).await.unwrap();
    let envelope = stored_envelope(reconciler.store(), &outcome.handle().unwrap().id);

    let mut raw = base64::Engine::decode(
        &base64::engine::general_purpose::STANDARD,
        &envelope.ciphertext,
    )
    .unwrap();
    raw[0] ^= 0x01;
    let tampered = Envelope {
        ciphertext: base64::Engine::encode(&base64::engine::general_purpose::STANDARD, raw),
        nonce: envelope.nonce.clone(),
    };

    let result: Result<Value, _> = crypto::decrypt(&tampered, &session.key().unwrap());
    assert!(matches!(result, Err(EnvelopeError::AuthenticationFailure)));

    let other: Result<Value, _> = crypto::decrypt(&envelope, &key_for("someone-else"));
    assert!(matches!(other, Err(EnvelopeError::AuthenticationFailure)));
}

#[tokio::test]
async fn test_expired_grant_recovers_after_reauthorization() {
    let clock = ManualClock::default();
    let provider = ::common::testkit::ScriptedIdentityProvider::new(
        common::assertion_for("u123"),
        &clock,
    );
    let mut session = ::common::identity::Session::new(fast_session_config());
    session.sign_in(&provider, &clock).await.unwrap();
    session.authorize_storage(&provider).await.unwrap();
    let key_before = session.key().unwrap();

    let reconciler = Reconciler::with_clock(MemoryRemoteStore::new(), clock.clone());
    reconciler.sync(&session, &json!({"n": 1})).await.unwrap();

    clock.advance(std::time::Duration::from_secs(2 * 3600));
    assert!(reconciler.sync(&session, &json!({"n": 2})).await.is_err());

    session.authorize_storage(&provider).await.unwrap();
    assert!(Arc::ptr_eq(&key_before, &session.key().unwrap()));
    let outcome = reconciler.sync(&session, &json!({"n": 2})).await.unwrap();
    assert!(matches!(outcome, ReconcileOutcome::Updated(_)));
    assert_eq!(provider.grants_issued(), 2);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Create,
    Update,
}

/// Holds the first call of one kind until released, so a second push can
/// start while the first is mid-write.
#[derive(Debug)]
struct GatedStore {
    inner: MemoryRemoteStore,
    on: Gate,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    entered: Notify,
}

impl GatedStore {
    fn new(inner: MemoryRemoteStore, on: Gate) -> (Self, oneshot::Sender<()>) {
        let (release, gate) = oneshot::channel();
        let store = Self {
            inner,
            on,
            gate: Mutex::new(Some(gate)),
            entered: Notify::new(),
        };
        (store, release)
    }

    async fn hold(&self, kind: Gate) {
        if kind != self.on {
            return;
        }
        let gate = self.gate.lock().await.take();
        if let Some(gate) = gate {
            self.entered.notify_one();
            let _ = gate.await;
        }
    }
}

#[async_trait]
impl RemoteStore for GatedStore {
    async fn list(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
    ) -> Result<Vec<RemoteObjectHandle>, RemoteStoreError> {
        self.inner.list(grant, location).await
    }

    async fn create(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError> {
        self.hold(Gate::Create).await;
        self.inner.create(grant, location, body).await
    }

    async fn update(
        &self,
        grant: &AccessGrant,
        handle: &RemoteObjectHandle,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError> {
        self.hold(Gate::Update).await;
        self.inner.update(grant, handle, body).await
    }
}

/// Start an older sync that stalls inside the gated call, then a newer one,
/// then release the older. Returns both outcomes in that order.
async fn race(
    store: GatedStore,
    release: oneshot::Sender<()>,
    clock: &ManualClock,
    session: Arc<::common::identity::Session>,
) -> (ReconcileOutcome, ReconcileOutcome) {
    let reconciler = Arc::new(Reconciler::with_clock(store, clock.clone()));

    let older = tokio::spawn({
        let reconciler = reconciler.clone();
        let session = session.clone();
        async move { reconciler.sync(&session, &json!({"v": "older"})).await }
    });
    reconciler.store().entered.notified().await;

    let newer = tokio::spawn({
        let reconciler = reconciler.clone();
        let session = session.clone();
        async move { reconciler.sync(&session, &json!({"v": "newer"})).await }
    });
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }

    release.send(()).unwrap();
    let older = older.await.unwrap().unwrap();
    let newer = newer.await.unwrap().unwrap();
    (older, newer)
}

fn remote_value(memory: &MemoryRemoteStore, session: &::common::identity::Session) -> Value {
    let objects = memory.objects();
    assert_eq!(objects.len(), 1);
    let envelope = Envelope::from_slice(&objects[0].body).unwrap();
    crypto::decrypt(&envelope, &session.key().unwrap()).unwrap()
}

#[tokio::test]
async fn test_slow_update_does_not_overwrite_newer() {
    let clock = ManualClock::default();
    let session = Arc::new(common::authorized_session("u123", &clock).await);
    let memory = MemoryRemoteStore::new();
    let existing = memory.seed(&RemoteLocation::default(), b"{}".to_vec());
    let (store, release) = GatedStore::new(memory.clone(), Gate::Update);

    let (older, newer) = race(store, release, &clock, session.clone()).await;

    assert_eq!(older, ReconcileOutcome::Updated(existing.clone()));
    assert_eq!(newer, ReconcileOutcome::Updated(existing));
    assert_eq!(remote_value(&memory, &session), json!({"v": "newer"}));
}

#[tokio::test]
async fn test_concurrent_first_pushes_create_once() {
    let clock = ManualClock::default();
    let session = Arc::new(common::authorized_session("u123", &clock).await);
    let memory = MemoryRemoteStore::new();
    let (store, release) = GatedStore::new(memory.clone(), Gate::Create);

    let (older, newer) = race(store, release, &clock, session.clone()).await;

    let ReconcileOutcome::Created(created) = older else {
        panic!("expected create, got {:?}", older);
    };
    assert_eq!(newer, ReconcileOutcome::Updated(created));
    assert_eq!(remote_value(&memory, &session), json!({"v": "newer"}));
    assert!(clock.now() < session.grant().unwrap().expires_at);
}
