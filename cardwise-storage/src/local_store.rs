//! Account-scoped document cache.
//!
//! Rows are keyed by `(account_id, collection_key, meta_id)` where
//! `collection_key` is the dot-delimited collection path. A document path
//! resolves its final segment against `meta_id` first and `meta_remote_id`
//! second, so domain code may address an entry by either identifier.

use crate::error::{StorageError, StorageResult};
use cardwise_types::{DocPath, Entry, EntryMeta, Filter, Payload, from_millis, new_local_id, strip_metadata};
use chrono::{DateTime, Utc};
use duckdb::{Connection, params};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// Result of a read: a single document or the entries of a collection.
#[derive(Debug, Clone, PartialEq)]
pub enum Snapshot {
    Document(Option<Entry>),
    Collection(Vec<Entry>),
}

impl Snapshot {
    /// Flattens into a list (an absent document yields an empty list).
    pub fn into_entries(self) -> Vec<Entry> {
        match self {
            Self::Document(doc) => doc.into_iter().collect(),
            Self::Collection(entries) => entries,
        }
    }
}

/// Local document cache backed by DuckDB.
#[derive(Clone)]
pub struct LocalStore {
    conn: Arc<Mutex<Connection>>,
}

struct StoredRow {
    collection_key: String,
    meta_id: String,
    meta_remote_id: Option<String>,
    payload_json: String,
    synced: bool,
    modified: i64,
    deleted: bool,
}

const ROW_COLUMNS: &str = "collection_key, meta_id, meta_remote_id, payload_json, meta_synced, meta_modified, meta_deleted";

impl LocalStore {
    /// Opens or creates a local store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = crate::open_duckdb_with_wal_recovery(path, crate::MEMORY_LIMIT, 1)?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory local store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| StorageError::Poisoned)
    }

    // ── Reads ──

    /// Reads a document or a (filtered) collection. Tombstones are hidden.
    pub fn get(&self, account: &str, path: &DocPath, filters: &[Filter]) -> StorageResult<Snapshot> {
        if path.is_document() {
            Ok(Snapshot::Document(self.get_document(account, path)?))
        } else {
            Ok(Snapshot::Collection(self.get_collection(account, path, filters)?))
        }
    }

    /// Reads a single document, or `None` if absent or tombstoned.
    pub fn get_document(&self, account: &str, path: &DocPath) -> StorageResult<Option<Entry>> {
        Ok(self
            .find_entry(account, path)?
            .filter(|entry| !entry.meta.deleted))
    }

    /// Reads a document including a pending tombstone.
    pub fn find_entry(&self, account: &str, path: &DocPath) -> StorageResult<Option<Entry>> {
        let (collection, id) = path.split_document()?;
        let conn = self.conn()?;
        match find_row(&conn, account, &collection.to_string(), id)? {
            Some(row) => Ok(Some(row_to_entry(row)?)),
            None => Ok(None),
        }
    }

    /// Lists the live entries of a collection that satisfy every filter,
    /// in creation order.
    pub fn get_collection(
        &self,
        account: &str,
        collection: &DocPath,
        filters: &[Filter],
    ) -> StorageResult<Vec<Entry>> {
        Ok(self
            .entries(account, collection, false)?
            .into_iter()
            .filter(|entry| Filter::all_match(filters, &entry.payload))
            .collect())
    }

    /// Lists the entries of a collection, optionally including tombstones.
    pub fn entries(
        &self,
        account: &str,
        collection: &DocPath,
        include_deleted: bool,
    ) -> StorageResult<Vec<Entry>> {
        let collection = collection.expect_collection()?;
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {ROW_COLUMNS} FROM entries WHERE account_id = ? AND collection_key = ?"
        );
        if !include_deleted {
            sql.push_str(" AND meta_deleted = FALSE");
        }
        sql.push_str(" ORDER BY meta_id");

        let mut stmt = conn.prepare(&sql)?;
        let rows: Vec<StoredRow> = stmt
            .query_map(params![account, collection.to_string()], read_row)?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        drop(conn);

        rows.into_iter().map(row_to_entry).collect()
    }

    /// Entries of a collection that still have to be pushed, tombstones included.
    pub fn unsynced(&self, account: &str, collection: &DocPath) -> StorageResult<Vec<Entry>> {
        Ok(self
            .entries(account, collection, true)?
            .into_iter()
            .filter(|entry| !entry.meta.synced)
            .collect())
    }

    /// Collection paths that currently hold entries for the account.
    pub fn collections(&self, account: &str) -> StorageResult<Vec<DocPath>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT collection_key FROM entries WHERE account_id = ? ORDER BY collection_key",
        )?;
        let keys: Vec<String> = stmt
            .query_map(params![account], |row| row.get::<_, String>(0))?
            .collect::<Result<_, _>>()?;
        keys.iter()
            .map(|key| DocPath::parse(key).map_err(StorageError::from))
            .collect()
    }

    /// Number of rows held for the account, tombstones included.
    pub fn count_entries(&self, account: &str) -> StorageResult<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM entries WHERE account_id = ?",
            params![account],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // ── Writes ──

    /// Writes a document. With `merge` the given top-level fields are laid
    /// over the stored ones; otherwise the payload replaces them.
    ///
    /// A write that leaves the payload unchanged is skipped entirely, so
    /// retries are idempotent. Any real change marks the entry unsynced.
    pub fn set(
        &self,
        account: &str,
        path: &DocPath,
        payload: &Payload,
        merge: bool,
    ) -> StorageResult<Entry> {
        let (collection, id) = path.split_document()?;
        let collection_key = collection.to_string();
        let incoming = strip_metadata(payload);

        let conn = self.conn()?;
        let existing = match find_row(&conn, account, &collection_key, id)? {
            Some(row) => Some(row_to_entry(row)?),
            None => None,
        };

        let entry = match existing {
            Some(mut entry) => {
                let next = if merge {
                    let mut merged = entry.payload.clone();
                    merged.extend(incoming);
                    merged
                } else {
                    incoming
                };
                if next == entry.payload && !entry.meta.deleted {
                    return Ok(entry);
                }
                entry.payload = next;
                entry.meta.synced = false;
                entry.meta.deleted = false;
                entry.meta.modified = Utc::now();
                entry
            }
            None => Entry::new(collection.child(id)?, incoming, EntryMeta::unsynced(id)),
        };

        write_entry(&conn, account, &collection_key, &entry)?;
        debug!("local set {account}/{}", entry.path);
        Ok(entry)
    }

    /// Adds a new document to a collection and returns its local id.
    pub fn add(&self, account: &str, collection: &DocPath, payload: &Payload) -> StorageResult<String> {
        let collection = collection.expect_collection()?;
        let id = new_local_id();
        let entry = Entry::new(
            collection.child(&id)?,
            strip_metadata(payload),
            EntryMeta::unsynced(id.clone()),
        );
        let conn = self.conn()?;
        write_entry(&conn, account, &collection.to_string(), &entry)?;
        debug!("local add {account}/{}", entry.path);
        Ok(id)
    }

    /// Removes a document row outright.
    pub fn delete(&self, account: &str, path: &DocPath) -> StorageResult<()> {
        let (collection, id) = path.split_document()?;
        let collection_key = collection.to_string();
        let conn = self.conn()?;
        if let Some(row) = find_row(&conn, account, &collection_key, id)? {
            conn.execute(
                "DELETE FROM entries WHERE account_id = ? AND collection_key = ? AND meta_id = ?",
                params![account, collection_key, row.meta_id],
            )?;
            debug!("local delete {account}/{path}");
        }
        Ok(())
    }

    /// Deletes a document locally and leaves a tombstone for the push pass.
    ///
    /// An entry that never reached the remote store has nothing to delete
    /// there and is removed immediately.
    pub fn mark_deleted(&self, account: &str, path: &DocPath) -> StorageResult<()> {
        let Some(mut entry) = self.find_entry(account, path)? else {
            return Ok(());
        };
        if entry.meta.remote_id.is_none() {
            return self.delete(account, path);
        }
        entry.meta.deleted = true;
        entry.meta.synced = false;
        entry.meta.modified = Utc::now();
        let conn = self.conn()?;
        write_entry(&conn, account, &entry.path.collection().to_string(), &entry)?;
        debug!("local tombstone {account}/{}", entry.path);
        Ok(())
    }

    /// Updates sync bookkeeping in place. Re-keys the entry when `local_id`
    /// differs from its current local id. Returns false if no entry matched.
    pub fn modify_entry_metainfo(
        &self,
        account: &str,
        path: &DocPath,
        synced: bool,
        local_id: &str,
        remote_id: Option<&str>,
    ) -> StorageResult<bool> {
        let Some(mut entry) = self.find_entry(account, path)? else {
            return Ok(false);
        };
        let collection = entry.path.collection();
        let collection_key = collection.to_string();
        let old_id = entry.meta.id.clone();

        entry.meta.synced = synced;
        entry.meta.remote_id = remote_id.map(str::to_string);
        if local_id != old_id {
            entry.meta.id = local_id.to_string();
            entry.path = collection.child(local_id)?;
        }

        let conn = self.conn()?;
        if local_id != old_id {
            conn.execute(
                "DELETE FROM entries WHERE account_id = ? AND collection_key = ? AND meta_id = ?",
                params![account, collection_key, old_id],
            )?;
        }
        write_entry(&conn, account, &collection_key, &entry)?;
        Ok(true)
    }

    /// Stores a payload read from the remote store as a synced entry.
    ///
    /// An existing entry keeps its local id; a new one takes the path's last
    /// segment. Tombstones are revived.
    pub fn apply_remote(
        &self,
        account: &str,
        path: &DocPath,
        payload: &Payload,
        remote_id: &str,
        modified: DateTime<Utc>,
    ) -> StorageResult<Entry> {
        let (collection, id) = path.split_document()?;
        let collection_key = collection.to_string();
        let conn = self.conn()?;
        let mut entry = match find_row(&conn, account, &collection_key, id)? {
            Some(row) => row_to_entry(row)?,
            None => Entry::new(collection.child(id)?, Payload::new(), EntryMeta::unsynced(id)),
        };
        entry.payload = strip_metadata(payload);
        entry.meta.synced = true;
        entry.meta.deleted = false;
        entry.meta.remote_id = Some(remote_id.to_string());
        entry.meta.modified = modified;

        write_entry(&conn, account, &collection_key, &entry)?;
        debug!("local apply remote {account}/{} <- {remote_id}", entry.path);
        Ok(entry)
    }

    /// Overrides the last-modified stamp of an entry.
    pub fn set_modified(
        &self,
        account: &str,
        path: &DocPath,
        modified: DateTime<Utc>,
    ) -> StorageResult<bool> {
        let (collection, id) = path.split_document()?;
        let collection_key = collection.to_string();
        let conn = self.conn()?;
        let Some(row) = find_row(&conn, account, &collection_key, id)? else {
            return Ok(false);
        };
        conn.execute(
            "UPDATE entries SET meta_modified = ? WHERE account_id = ? AND collection_key = ? AND meta_id = ?",
            params![modified.timestamp_millis(), account, collection_key, row.meta_id],
        )?;
        Ok(true)
    }
}

fn find_row(
    conn: &Connection,
    account: &str,
    collection_key: &str,
    id: &str,
) -> StorageResult<Option<StoredRow>> {
    let sql = format!(
        "SELECT {ROW_COLUMNS} FROM entries \
         WHERE account_id = ? AND collection_key = ? AND (meta_id = ? OR meta_remote_id = ?) \
         ORDER BY CASE WHEN meta_id = ? THEN 0 ELSE 1 END LIMIT 1"
    );
    match conn.query_row(&sql, params![account, collection_key, id, id, id], read_row) {
        Ok(row) => Ok(Some(row)),
        Err(duckdb::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn read_row(row: &duckdb::Row<'_>) -> duckdb::Result<StoredRow> {
    Ok(StoredRow {
        collection_key: row.get(0)?,
        meta_id: row.get(1)?,
        meta_remote_id: row.get(2)?,
        payload_json: row.get(3)?,
        synced: row.get(4)?,
        modified: row.get(5)?,
        deleted: row.get(6)?,
    })
}

fn row_to_entry(row: StoredRow) -> StorageResult<Entry> {
    let payload: Payload = serde_json::from_str(&row.payload_json)?;
    let path = DocPath::parse(&row.collection_key)?.child(&row.meta_id)?;
    let modified = from_millis(row.modified).ok_or_else(|| {
        StorageError::InvalidData(format!("bad meta_modified {} on {path}", row.modified))
    })?;
    Ok(Entry::new(
        path,
        payload,
        EntryMeta {
            synced: row.synced,
            id: row.meta_id,
            remote_id: row.meta_remote_id,
            modified,
            deleted: row.deleted,
        },
    ))
}

fn write_entry(
    conn: &Connection,
    account: &str,
    collection_key: &str,
    entry: &Entry,
) -> StorageResult<()> {
    let payload_json = serde_json::to_string(&entry.payload)?;
    conn.execute(
        r#"
        INSERT OR REPLACE INTO entries (
            account_id, collection_key, meta_id, meta_remote_id,
            payload_json, meta_synced, meta_modified, meta_deleted
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
        params![
            account,
            collection_key,
            entry.meta.id,
            entry.meta.remote_id.as_deref(),
            payload_json,
            entry.meta.synced,
            entry.meta.modified.timestamp_millis(),
            entry.meta.deleted,
        ],
    )?;
    Ok(())
}

fn initialize_schema(conn: &Connection) -> StorageResult<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS entries (
            account_id VARCHAR NOT NULL,
            collection_key VARCHAR NOT NULL,
            meta_id VARCHAR NOT NULL,
            meta_remote_id VARCHAR,
            payload_json TEXT NOT NULL,
            meta_synced BOOLEAN NOT NULL DEFAULT FALSE,
            meta_modified BIGINT NOT NULL,
            meta_deleted BOOLEAN NOT NULL DEFAULT FALSE,
            PRIMARY KEY (account_id, collection_key, meta_id)
        );

        CREATE TABLE IF NOT EXISTS login_state (
            slot INTEGER PRIMARY KEY,
            signed_in BOOLEAN NOT NULL,
            account_type VARCHAR NOT NULL,
            account_id VARCHAR
        );
        "#,
    )?;
    Ok(())
}
