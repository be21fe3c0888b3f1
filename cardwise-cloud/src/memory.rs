//! In-process remote store.
//!
//! Behaves like the REST document API (merge semantics, filtered queries,
//! store-assigned ids) without leaving the process. Used by the daemon's
//! `memory` backend and by tests, which can also inject latency and failures
//! and read back per-operation call counts.

use crate::error::{CloudError, CloudResult};
use crate::remote::{RemoteDocument, RemoteStore};
use async_trait::async_trait;
use cardwise_types::{DocPath, Filter, Payload};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

type Collections = BTreeMap<String, BTreeMap<String, Payload>>;

/// Remote store kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryRemoteStore {
    collections: Mutex<Collections>,
    latency: Option<Duration>,
    id_prefix: Option<String>,
    next_id: AtomicU64,
    failing: AtomicBool,
    gets: AtomicU64,
    sets: AtomicU64,
    adds: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every operation by `latency` before it takes effect.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Assigns ids `{prefix}1`, `{prefix}2`, ... on `add` instead of random ones.
    pub fn with_sequential_ids(mut self, prefix: impl Into<String>) -> Self {
        self.id_prefix = Some(prefix.into());
        self
    }

    /// While set, every operation fails with [`CloudError::Unavailable`].
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Stores a document directly, bypassing call counting and latency.
    pub fn insert(&self, path: &DocPath, payload: Payload) -> CloudResult<()> {
        let (collection, id) = path.split_document()?;
        let mut collections = self.lock()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), payload);
        Ok(())
    }

    /// Current contents of a document, bypassing call counting and latency.
    pub fn document(&self, path: &DocPath) -> Option<Payload> {
        let (collection, id) = path.split_document().ok()?;
        let collections = self.lock().ok()?;
        collections.get(&collection.to_string())?.get(id).cloned()
    }

    /// Current contents of a collection, ordered by document id.
    pub fn collection(&self, path: &DocPath) -> Vec<RemoteDocument> {
        let Ok(collections) = self.lock() else {
            return Vec::new();
        };
        collections
            .get(&path.to_string())
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| RemoteDocument::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> u64 {
        self.sets.load(Ordering::SeqCst)
    }

    pub fn add_count(&self) -> u64 {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> u64 {
        self.deletes.load(Ordering::SeqCst)
    }

    fn lock(&self) -> CloudResult<std::sync::MutexGuard<'_, Collections>> {
        self.collections
            .lock()
            .map_err(|_| CloudError::Unavailable("memory store lock poisoned".to_string()))
    }

    async fn enter(&self, counter: &AtomicU64) -> CloudResult<()> {
        counter.fetch_add(1, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(CloudError::Unavailable(
                "memory store set to fail".to_string(),
            ));
        }
        Ok(())
    }

    fn next_document_id(&self) -> String {
        match &self.id_prefix {
            Some(prefix) => {
                let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                format!("{prefix}{n}")
            }
            None => Uuid::new_v4().simple().to_string(),
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get_document(&self, path: &DocPath) -> CloudResult<Option<Payload>> {
        self.enter(&self.gets).await?;
        let (collection, id) = path.split_document()?;
        let collections = self.lock()?;
        Ok(collections
            .get(&collection.to_string())
            .and_then(|docs| docs.get(id))
            .cloned())
    }

    async fn get_collection(
        &self,
        collection: &DocPath,
        filters: &[Filter],
    ) -> CloudResult<Vec<RemoteDocument>> {
        self.enter(&self.gets).await?;
        let collection = collection.expect_collection()?;
        let collections = self.lock()?;
        Ok(collections
            .get(&collection.to_string())
            .map(|docs| {
                docs.iter()
                    .filter(|(_, data)| Filter::all_match(filters, data))
                    .map(|(id, data)| RemoteDocument::new(id.clone(), data.clone()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn set(&self, path: &DocPath, payload: &Payload, merge: bool) -> CloudResult<()> {
        self.enter(&self.sets).await?;
        let (collection, id) = path.split_document()?;
        let mut collections = self.lock()?;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => {
                for (k, v) in payload {
                    existing.insert(k.clone(), v.clone());
                }
            }
            _ => {
                docs.insert(id.to_string(), payload.clone());
            }
        }
        debug!(path = %path, merge, "memory set");
        Ok(())
    }

    async fn add(&self, collection: &DocPath, payload: &Payload) -> CloudResult<String> {
        self.enter(&self.adds).await?;
        let collection = collection.expect_collection()?;
        let id = self.next_document_id();
        let mut collections = self.lock()?;
        collections
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), payload.clone());
        debug!(collection = %collection, id = %id, "memory add");
        Ok(id)
    }

    async fn delete(&self, path: &DocPath) -> CloudResult<()> {
        self.enter(&self.deletes).await?;
        let (collection, id) = path.split_document()?;
        let mut collections = self.lock()?;
        if let Some(docs) = collections.get_mut(&collection.to_string()) {
            docs.remove(id);
        }
        Ok(())
    }
}
