//! Create-or-update of the single remote snapshot object
//!
//! Each push lists the well-known name inside the container, creates the
//! object when nothing matches and replaces its full content when something
//! does. There is no version check against the remote: the last write to
//! land wins.
//!
//! Pushes through one `Reconciler` run one at a time: the LIST and the
//! write that follows it happen under a single lock, so two concurrent
//! first pushes cannot both create. Pushes started through
//! [`Reconciler::sync`] are also numbered locally. A push that gets the lock
//! after a newer one from the same reconciler has already landed gives up
//! with [`ReconcileOutcome::Superseded`] rather than overwrite it. None of
//! this orders writers in other processes.

use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::crypto::{self, Envelope, EnvelopeError};
use crate::identity::{AccessGrant, Clock, Session, SystemClock};
use crate::remote::{RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError};

/// What to do when more than one remote object carries the snapshot name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Update the first listed match and log a warning
    #[default]
    FirstMatch,
    /// Fail with [`ReconcileError::AmbiguousRemote`] without writing
    Reject,
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first_match" | "first-match" => Ok(DuplicatePolicy::FirstMatch),
            "reject" => Ok(DuplicatePolicy::Reject),
            other => Err(format!(
                "unknown duplicate policy '{}', expected first_match or reject",
                other
            )),
        }
    }
}

impl std::fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DuplicatePolicy::FirstMatch => write!(f, "first_match"),
            DuplicatePolicy::Reject => write!(f, "reject"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeferReason {
    MissingKey,
    MissingGrant,
}

impl std::fmt::Display for DeferReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeferReason::MissingKey => write!(f, "vault key not derived"),
            DeferReason::MissingGrant => write!(f, "no storage access grant"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// No object existed; one was created
    Created(RemoteObjectHandle),
    /// An existing object's content was replaced
    Updated(RemoteObjectHandle),
    /// Authentication is incomplete. Nothing was sent.
    Deferred(DeferReason),
    /// A newer push from this reconciler already landed
    Superseded,
}

impl ReconcileOutcome {
    pub fn handle(&self) -> Option<&RemoteObjectHandle> {
        match self {
            ReconcileOutcome::Created(h) | ReconcileOutcome::Updated(h) => Some(h),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReconcileOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ReconcileOutcome::Created(h) => write!(f, "created remote snapshot {}", h.id),
            ReconcileOutcome::Updated(h) => write!(f, "updated remote snapshot {}", h.id),
            ReconcileOutcome::Deferred(reason) => write!(f, "sync deferred: {}", reason),
            ReconcileOutcome::Superseded => write!(f, "sync superseded by a newer snapshot"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("access grant expired at {0}; request a new one")]
    GrantExpired(DateTime<Utc>),
    #[error("found {count} remote objects at {location}; refusing to pick one")]
    AmbiguousRemote {
        location: RemoteLocation,
        count: usize,
    },
    #[error("cannot seal snapshot: {0}")]
    Envelope(#[from] EnvelopeError),
    #[error("sync failed: {0}")]
    Remote(#[from] RemoteStoreError),
}

/// Pushes sealed snapshots to the single remote object
#[derive(Debug)]
pub struct Reconciler<S, C = SystemClock> {
    store: S,
    clock: C,
    location: RemoteLocation,
    policy: DuplicatePolicy,
    issued: AtomicU64,
    committed: AtomicU64,
    /// Held from LIST through the write
    write_lock: Mutex<()>,
}

impl<S: RemoteStore> Reconciler<S, SystemClock> {
    pub fn new(store: S) -> Self {
        Self::with_clock(store, SystemClock)
    }
}

impl<S, C> Reconciler<S, C>
where
    S: RemoteStore,
    C: Clock,
{
    pub fn with_clock(store: S, clock: C) -> Self {
        Self {
            store,
            clock,
            location: RemoteLocation::default(),
            policy: DuplicatePolicy::default(),
            issued: AtomicU64::new(0),
            committed: AtomicU64::new(0),
            write_lock: Mutex::new(()),
        }
    }

    pub fn with_location(mut self, location: RemoteLocation) -> Self {
        self.location = location;
        self
    }

    pub fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }

    /// Push an already sealed envelope.
    ///
    /// Without a grant this is a soft no-op reported as
    /// [`ReconcileOutcome::Deferred`].
    pub async fn reconcile(
        &self,
        envelope: &Envelope,
        grant: Option<&AccessGrant>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(grant) = grant else {
            tracing::warn!("sync deferred: authentication incomplete");
            return Ok(ReconcileOutcome::Deferred(DeferReason::MissingGrant));
        };
        self.push(envelope, grant, None).await
    }

    /// Seal `snapshot` with the session's key and push it.
    ///
    /// Deferred, with no encryption and no network traffic, until the
    /// session holds both a key and a grant.
    pub async fn sync<T>(
        &self,
        session: &Session,
        snapshot: &T,
    ) -> Result<ReconcileOutcome, ReconcileError>
    where
        T: Serialize + ?Sized,
    {
        let Some(key) = session.key() else {
            tracing::warn!("sync deferred: vault key not derived");
            return Ok(ReconcileOutcome::Deferred(DeferReason::MissingKey));
        };
        let Some(grant) = session.grant() else {
            tracing::warn!("sync deferred: no storage access grant");
            return Ok(ReconcileOutcome::Deferred(DeferReason::MissingGrant));
        };

        let sequence = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let envelope = crypto::encrypt(snapshot, &key)?;
        self.push(&envelope, grant, Some(sequence)).await
    }

    async fn push(
        &self,
        envelope: &Envelope,
        grant: &AccessGrant,
        sequence: Option<u64>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if grant.is_expired_at(self.clock.now()) {
            tracing::warn!(expired_at = %grant.expires_at, "sync refused: access grant expired");
            return Err(ReconcileError::GrantExpired(grant.expires_at));
        }
        let body = envelope.to_bytes()?;

        let _guard = self.write_lock.lock().await;
        if let Some(sequence) = sequence {
            let committed = self.committed.load(Ordering::SeqCst);
            if committed > sequence {
                tracing::debug!(sequence, committed, "dropping stale snapshot push");
                return Ok(ReconcileOutcome::Superseded);
            }
        }

        let matches = self
            .store
            .list(grant, &self.location)
            .await
            .map_err(log_remote)?;
        let count = matches.len();
        let target = match (count, self.policy) {
            (0, _) | (1, _) => matches.into_iter().next(),
            (_, DuplicatePolicy::FirstMatch) => {
                tracing::warn!(
                    count,
                    location = %self.location,
                    "multiple remote snapshots found, updating the first"
                );
                matches.into_iter().next()
            }
            (_, DuplicatePolicy::Reject) => {
                tracing::error!(count, location = %self.location, "multiple remote snapshots found");
                return Err(ReconcileError::AmbiguousRemote {
                    location: self.location.clone(),
                    count,
                });
            }
        };

        let outcome = match target {
            None => {
                let handle = self
                    .store
                    .create(grant, &self.location, body)
                    .await
                    .map_err(log_remote)?;
                tracing::info!(id = %handle.id, location = %self.location, "created remote snapshot");
                ReconcileOutcome::Created(handle)
            }
            Some(existing) => {
                let handle = self
                    .store
                    .update(grant, &existing, body)
                    .await
                    .map_err(log_remote)?;
                tracing::info!(id = %handle.id, location = %self.location, "updated remote snapshot");
                ReconcileOutcome::Updated(handle)
            }
        };

        if let Some(sequence) = sequence {
            self.committed.fetch_max(sequence, Ordering::SeqCst);
        }
        Ok(outcome)
    }
}

fn log_remote(e: RemoteStoreError) -> ReconcileError {
    tracing::error!(error = %e, "remote snapshot sync failed");
    ReconcileError::Remote(e)
}
