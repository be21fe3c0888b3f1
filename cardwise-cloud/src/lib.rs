//! Remote document store adapters for the Cardwise sync core.
//!
//! The reconciler only needs get/set/add/delete/exists over alternating
//! collection/document paths. This crate defines that capability set as the
//! [`RemoteStore`] trait and ships two implementations:
//! - [`RestRemoteStore`]: a REST document API client with bearer auth
//! - [`MemoryRemoteStore`]: an in-process store for tests and demos
//!
//! Which one runs is decided at startup by [`RemoteBackend`].

pub mod config;
pub mod error;
pub mod memory;
pub mod remote;
pub mod rest;

pub use config::{CloudConfig, RemoteBackend};
pub use error::{CloudError, CloudResult};
pub use memory::MemoryRemoteStore;
pub use remote::{RemoteDocument, RemoteSnapshot, RemoteStore};
pub use rest::{AuthTokens, RestRemoteStore};

use std::sync::Arc;

/// Builds the remote store selected by configuration.
pub fn connect(backend: &RemoteBackend) -> CloudResult<Arc<dyn RemoteStore>> {
    match backend {
        RemoteBackend::Memory => Ok(Arc::new(MemoryRemoteStore::new())),
        RemoteBackend::Rest(config) => Ok(Arc::new(RestRemoteStore::new(config.clone())?)),
    }
}
