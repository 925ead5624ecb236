use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::provider::{RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError};
use crate::identity::AccessGrant;

/// One request as the memory store saw it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    List { name: String, container: String },
    Create { name: String, container: String },
    Update { id: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub handle: RemoteObjectHandle,
    pub container: String,
    pub body: Vec<u8>,
}

/// In-memory remote store
///
/// Behaves like the drive API for the three operations and records every
/// call, so tests can assert both the end state and the traffic.
#[derive(Debug, Clone, Default)]
pub struct MemoryRemoteStore {
    inner: Arc<RwLock<MemoryRemoteStoreInner>>,
}

#[derive(Debug, Default)]
struct MemoryRemoteStoreInner {
    objects: Vec<StoredObject>,
    calls: Vec<RemoteCall>,
    next_id: u64,
    /// When set, only this bearer token is accepted
    accepted_token: Option<String>,
}

fn lock_error(e: impl std::fmt::Display) -> RemoteStoreError {
    RemoteStoreError::Internal(format!("failed to acquire lock: {}", e))
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject any grant whose token differs from `token`
    pub fn accepting_only(token: impl Into<String>) -> Self {
        let store = Self::default();
        if let Ok(mut inner) = store.inner.write() {
            inner.accepted_token = Some(token.into());
        }
        store
    }

    /// Place an object directly, bypassing the API and the call log
    pub fn seed(&self, location: &RemoteLocation, body: Vec<u8>) -> RemoteObjectHandle {
        let mut inner = self.inner.write().unwrap_or_else(|e| e.into_inner());
        inner.insert(location, body)
    }

    pub fn objects(&self) -> Vec<StoredObject> {
        self.inner
            .read()
            .map(|inner| inner.objects.clone())
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.inner
            .read()
            .map(|inner| inner.calls.clone())
            .unwrap_or_default()
    }

    pub fn body(&self, id: &str) -> Option<Vec<u8>> {
        self.objects()
            .into_iter()
            .find(|o| o.handle.id == id)
            .map(|o| o.body)
    }
}

impl MemoryRemoteStoreInner {
    fn insert(&mut self, location: &RemoteLocation, body: Vec<u8>) -> RemoteObjectHandle {
        self.next_id += 1;
        let handle = RemoteObjectHandle {
            id: format!("mem-{}", self.next_id),
            name: location.name.clone(),
        };
        self.objects.push(StoredObject {
            handle: handle.clone(),
            container: location.container.clone(),
            body,
        });
        handle
    }

    fn authorize(&self, grant: &AccessGrant) -> Result<(), RemoteStoreError> {
        match &self.accepted_token {
            Some(token) if token != grant.token() => Err(RemoteStoreError::GrantRejected),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn list(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
    ) -> Result<Vec<RemoteObjectHandle>, RemoteStoreError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.calls.push(RemoteCall::List {
            name: location.name.clone(),
            container: location.container.clone(),
        });
        inner.authorize(grant)?;

        Ok(inner
            .objects
            .iter()
            .filter(|o| o.container == location.container && o.handle.name == location.name)
            .map(|o| o.handle.clone())
            .collect())
    }

    async fn create(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.calls.push(RemoteCall::Create {
            name: location.name.clone(),
            container: location.container.clone(),
        });
        inner.authorize(grant)?;

        Ok(inner.insert(location, body))
    }

    async fn update(
        &self,
        grant: &AccessGrant,
        handle: &RemoteObjectHandle,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError> {
        let mut inner = self.inner.write().map_err(lock_error)?;
        inner.calls.push(RemoteCall::Update {
            id: handle.id.clone(),
        });
        inner.authorize(grant)?;

        let object = inner
            .objects
            .iter_mut()
            .find(|o| o.handle.id == handle.id)
            .ok_or_else(|| RemoteStoreError::NotFound(handle.id.clone()))?;
        object.body = body;
        Ok(object.handle.clone())
    }
}
