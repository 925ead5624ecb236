use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::identity::AccessGrant;

/// File name of the snapshot object
pub const DEFAULT_SNAPSHOT_NAME: &str = "vault.json";
/// Hidden per-application folder on the user's drive
pub const DEFAULT_CONTAINER: &str = "appDataFolder";

/// Where the single snapshot object lives: a well-known name inside a
/// private per-application container
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteLocation {
    pub name: String,
    pub container: String,
}

impl Default for RemoteLocation {
    fn default() -> Self {
        Self {
            name: DEFAULT_SNAPSHOT_NAME.to_string(),
            container: DEFAULT_CONTAINER.to_string(),
        }
    }
}

impl Display for RemoteLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.container, self.name)
    }
}

/// A remote object as the store reports it
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteObjectHandle {
    /// Opaque, store-assigned identifier
    pub id: String,
    pub name: String,
}

#[derive(thiserror::Error, Debug)]
pub enum RemoteStoreError {
    /// The store refused the bearer credential
    #[error("storage API rejected the access grant")]
    GrantRejected,
    #[error("storage API returned HTTP {0}: {1}")]
    HttpStatus(u16, String),
    #[error("network failure: {0}")]
    Network(#[from] reqwest::Error),
    #[error("invalid storage URL: {0}")]
    Url(#[from] url::ParseError),
    #[error("object not found: {0}")]
    NotFound(String),
    #[error("unhandled remote store error: {0}")]
    Internal(String),
}

/// The three storage operations the reconciler is allowed to use.
///
/// Every call carries the bearer grant and is confined to the container
/// named by the location. Nothing here deletes.
#[async_trait]
pub trait RemoteStore: Send + Sync + Debug {
    /// Objects named `location.name` inside `location.container`
    async fn list(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
    ) -> Result<Vec<RemoteObjectHandle>, RemoteStoreError>;

    /// Create a new object named `location.name` inside
    /// `location.container`
    async fn create(
        &self,
        grant: &AccessGrant,
        location: &RemoteLocation,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError>;

    /// Replace the full content of an existing object, keeping its id
    async fn update(
        &self,
        grant: &AccessGrant,
        handle: &RemoteObjectHandle,
        body: Vec<u8>,
    ) -> Result<RemoteObjectHandle, RemoteStoreError>;
}
