//! Remote object storage for the encrypted snapshot
//!
//! The [`RemoteStore`] trait exposes exactly the three operations the
//! reconciler needs (list by name, create, full-content update). Two
//! providers ship with the crate: [`MemoryRemoteStore`] for tests and dry
//! runs, and [`DriveRemoteStore`] for the real drive API.

mod drive;
mod memory;
mod provider;

pub use drive::{DriveRemoteStore, GOOGLE_API_URL};
pub use memory::{MemoryRemoteStore, RemoteCall, StoredObject};
pub use provider::{
    RemoteLocation, RemoteObjectHandle, RemoteStore, RemoteStoreError, DEFAULT_CONTAINER,
    DEFAULT_SNAPSHOT_NAME,
};
