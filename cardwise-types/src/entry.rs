//! Stored entries and their sync metadata.

use crate::path::DocPath;
use crate::timestamp::timestamp_value;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Domain fields of a document.
pub type Payload = Map<String, Value>;

/// Metadata keys that never leave the device and never take part in
/// payload comparison.
pub const META_FIELDS: [&str; 4] = ["meta_synced", "meta_id", "meta_remote_id", "meta_modified"];

/// Sync bookkeeping kept next to every local entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// True once the remote store is known to hold an equivalent payload.
    pub synced: bool,
    /// Local identifier, assigned at local creation.
    pub id: String,
    /// Identifier returned by the remote store after the first push.
    pub remote_id: Option<String>,
    /// Last local modification.
    pub modified: DateTime<Utc>,
    /// Deleted locally; the remote delete has not been pushed yet.
    #[serde(default)]
    pub deleted: bool,
}

impl EntryMeta {
    /// Metadata for a freshly created, unsynced entry.
    pub fn unsynced(id: impl Into<String>) -> Self {
        Self {
            synced: false,
            id: id.into(),
            remote_id: None,
            modified: Utc::now(),
            deleted: false,
        }
    }
}

/// One stored item: a user, a card-ownership record, a transaction, a
/// catalog row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub path: DocPath,
    pub payload: Payload,
    pub meta: EntryMeta,
}

impl Entry {
    pub fn new(path: DocPath, payload: Payload, meta: EntryMeta) -> Self {
        Self {
            path,
            payload,
            meta,
        }
    }

    /// The payload with all meta fields removed.
    pub fn stripped(&self) -> Payload {
        strip_metadata(&self.payload)
    }

    /// Content hash of the stripped payload.
    pub fn sync_id(&self) -> SyncId {
        SyncId::of(&self.stripped())
    }

    /// Identifier domain code should address this entry by: the remote id
    /// once known, otherwise the local id.
    pub fn doc_id(&self) -> &str {
        self.meta.remote_id.as_deref().unwrap_or(&self.meta.id)
    }

    /// True when `id` names this entry either locally or remotely.
    pub fn is_known_as(&self, id: &str) -> bool {
        self.meta.id == id || self.meta.remote_id.as_deref() == Some(id)
    }

    /// The persisted shape: payload fields with the four meta fields inlined.
    pub fn to_value(&self) -> Value {
        let mut obj = self.stripped();
        obj.insert("meta_synced".into(), Value::Bool(self.meta.synced));
        obj.insert("meta_id".into(), Value::String(self.meta.id.clone()));
        obj.insert(
            "meta_remote_id".into(),
            self.meta
                .remote_id
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
        );
        obj.insert("meta_modified".into(), timestamp_value(self.meta.modified));
        Value::Object(obj)
    }
}

/// Removes the meta fields from a payload before comparison or transmission.
pub fn strip_metadata(payload: &Payload) -> Payload {
    payload
        .iter()
        .filter(|(k, _)| !META_FIELDS.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

/// Generates a new local identifier (UUID v7, time ordered).
pub fn new_local_id() -> String {
    Uuid::now_v7().to_string()
}

/// Content hash of a stripped payload, used as the key of in-flight pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SyncId(String);

impl SyncId {
    /// Hashes the canonical JSON form (object keys sorted at every level).
    pub fn of(payload: &Payload) -> Self {
        let canonical = canonicalize(&Value::Object(payload.clone()));
        let mut hasher = Sha256::new();
        hasher.update(canonical.to_string().as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            let mut out = Map::new();
            for key in keys {
                out.insert(key.clone(), canonicalize(&map[key]));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}
