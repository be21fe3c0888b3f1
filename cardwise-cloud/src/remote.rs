//! The remote store capability set.

use crate::error::CloudResult;
use async_trait::async_trait;
use cardwise_types::{DocPath, Filter, Payload, parse_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A document as returned by a collection query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// Document identifier assigned by the remote store.
    pub id: String,
    /// Document fields.
    #[serde(default)]
    pub data: Payload,
}

impl RemoteDocument {
    pub fn new(id: impl Into<String>, data: Payload) -> Self {
        Self {
            id: id.into(),
            data,
        }
    }

    /// The id written back into the document after its first push, falling
    /// back to the store-assigned document id.
    pub fn logical_id(&self) -> &str {
        self.data
            .get("id")
            .and_then(|v| v.as_str())
            .unwrap_or(&self.id)
    }

    /// The `modified` field, if present and readable.
    pub fn modified(&self) -> Option<DateTime<Utc>> {
        self.data.get("modified").and_then(parse_timestamp)
    }
}

/// Result of [`RemoteStore::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteSnapshot {
    Document(Option<Payload>),
    Collection(Vec<RemoteDocument>),
}

/// A document/collection database reachable over the network.
///
/// Even-indexed path segments are collections, odd-indexed segments are
/// document ids. Implementations report failures as errors; callers treat a
/// failed read as "unknown", never as "empty".
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Reads a single document. `Ok(None)` means the document does not exist.
    async fn get_document(&self, path: &DocPath) -> CloudResult<Option<Payload>>;

    /// Lists the documents of a collection matching every filter.
    async fn get_collection(
        &self,
        collection: &DocPath,
        filters: &[Filter],
    ) -> CloudResult<Vec<RemoteDocument>>;

    /// Writes a document, merging top-level fields when `merge` is set.
    async fn set(&self, path: &DocPath, payload: &Payload, merge: bool) -> CloudResult<()>;

    /// Adds a document with a store-assigned id and returns that id.
    async fn add(&self, collection: &DocPath, payload: &Payload) -> CloudResult<String>;

    /// Deletes a document. Deleting a missing document succeeds.
    async fn delete(&self, path: &DocPath) -> CloudResult<()>;

    /// Returns whether a document exists.
    async fn exists(&self, path: &DocPath) -> CloudResult<bool> {
        Ok(self.get_document(path).await?.is_some())
    }

    /// Reads a document or a collection depending on the path's shape.
    async fn get(&self, path: &DocPath, filters: &[Filter]) -> CloudResult<RemoteSnapshot> {
        if path.is_document() {
            Ok(RemoteSnapshot::Document(self.get_document(path).await?))
        } else {
            Ok(RemoteSnapshot::Collection(
                self.get_collection(path, filters).await?,
            ))
        }
    }
}
