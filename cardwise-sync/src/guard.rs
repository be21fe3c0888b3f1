//! In-flight push bookkeeping.
//!
//! A [`SyncGuard`] remembers which payloads are currently being written to
//! the remote store, keyed by [`SyncId`]. Acquiring returns a [`SyncPermit`];
//! the id is released when the permit drops, on every exit path.

use cardwise_types::{DocPath, SyncId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone)]
struct InFlight {
    path: DocPath,
    started: Instant,
}

/// Lock set shared by every pass of one reconciler.
#[derive(Debug, Clone, Default)]
pub struct SyncGuard {
    held: Arc<Mutex<HashMap<SyncId, InFlight>>>,
}

/// Holds a sync id until dropped.
#[derive(Debug)]
pub struct SyncPermit {
    held: Arc<Mutex<HashMap<SyncId, InFlight>>>,
    id: SyncId,
}

impl SyncGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `id` for `path`. Returns `None` if it is already held.
    pub fn try_acquire(&self, id: SyncId, path: &DocPath) -> Option<SyncPermit> {
        let mut held = lock(&self.held);
        if held.contains_key(&id) {
            debug!("sync id {id} already in flight, skipping {path}");
            return None;
        }
        held.insert(
            id.clone(),
            InFlight {
                path: path.clone(),
                started: Instant::now(),
            },
        );
        Some(SyncPermit {
            held: Arc::clone(&self.held),
            id,
        })
    }

    pub fn is_held(&self, id: &SyncId) -> bool {
        lock(&self.held).contains_key(id)
    }

    /// Number of ids currently held.
    pub fn len(&self) -> usize {
        lock(&self.held).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Paths currently in flight with how long each has been held, oldest first.
    pub fn in_flight(&self) -> Vec<(DocPath, Duration)> {
        let mut entries: Vec<(DocPath, Duration)> = lock(&self.held)
            .values()
            .map(|f| (f.path.clone(), f.started.elapsed()))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1));
        entries
    }
}

impl SyncPermit {
    pub fn id(&self) -> &SyncId {
        &self.id
    }
}

impl Drop for SyncPermit {
    fn drop(&mut self) {
        lock(&self.held).remove(&self.id);
    }
}

// The map stays consistent even if a holder panicked, so poisoning is ignored.
fn lock(held: &Mutex<HashMap<SyncId, InFlight>>) -> MutexGuard<'_, HashMap<SyncId, InFlight>> {
    held.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
