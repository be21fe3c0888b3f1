//! DuckDB local store for the Cardwise sync core.
//!
//! Keeps an account-scoped cache of documents and collections. Every row
//! carries sync bookkeeping (synced flag, local id, remote id, last local
//! modification) next to its JSON payload, plus a tombstone flag for
//! deletes that still have to reach the remote store. The persisted
//! login state lives in the same database.

mod error;
mod local_store;
mod login;

pub use error::{StorageError, StorageResult};
pub use local_store::{LocalStore, Snapshot};

use std::path::{Path, PathBuf};

/// DuckDB memory cap for the local store.
pub const MEMORY_LIMIT: &str = "128MB";

/// Opens the database file, recovering from a stale write-ahead log.
///
/// A device killed mid-write can leave a `.wal` next to the database that
/// DuckDB refuses to replay. When the first open fails and such a file
/// exists, it is discarded and the open is attempted once more.
pub fn open_duckdb_with_wal_recovery(
    path: &Path,
    memory_limit: &str,
    threads: u32,
) -> StorageResult<duckdb::Connection> {
    let conn = duckdb::Connection::open(path).or_else(|err| {
        let wal = wal_path(path);
        if !wal.exists() {
            return Err(err);
        }
        tracing::warn!("discarding stale WAL {} after failed open: {err}", wal.display());
        match std::fs::remove_file(&wal) {
            Ok(()) => duckdb::Connection::open(path),
            Err(_) => Err(err),
        }
    })?;
    conn.execute_batch(&format!(
        "SET memory_limit = '{memory_limit}'; SET threads = {threads};"
    ))?;
    Ok(conn)
}

/// `cards.duckdb` -> `cards.duckdb.wal`, `cards` -> `cards.wal`.
fn wal_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".wal");
    PathBuf::from(name)
}
