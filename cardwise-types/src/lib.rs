//! Core type definitions for the Cardwise sync core.
//!
//! This crate defines the storage-agnostic types shared by the local store,
//! the remote store adapters and the reconciler:
//! - Document paths (alternating collection / document segments)
//! - Entries with their sync metadata
//! - Query filters
//! - Login / account state
//! - Content hashes used as sync lock keys

mod entry;
mod filter;
mod login;
mod path;
mod timestamp;

pub use entry::{Entry, EntryMeta, META_FIELDS, Payload, SyncId, new_local_id, strip_metadata};
pub use filter::{Filter, FilterOp, compare_values};
pub use login::{AccountType, LoginState, OFFLINE_ACCOUNT_ID};
pub use path::{DocPath, PathError};
pub use timestamp::{from_millis, parse_timestamp, timestamp_value};
