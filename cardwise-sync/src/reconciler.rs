//! Local/remote reconciliation.
//!
//! The reconciler compares what the local store holds with what the remote
//! store returned and moves whichever side is stale:
//!
//! - documents: [`Reconciler::reconcile_document`] picks one action per
//!   document from the presence of each side and the local `synced` flag
//! - collections: a Local→Remote pass pushes every unsynced item and a
//!   Remote→Local pass pulls every remote item whose `modified` stamp is
//!   strictly newer than the local one
//!
//! Remote failures never escape a pass. They are logged, the item stays
//! unsynced and the next tick retries it. Local store failures abort only
//! the operation that hit them.

use crate::error::SyncResult;
use crate::guard::SyncGuard;
use cardwise_cloud::{RemoteDocument, RemoteStore};
use cardwise_storage::LocalStore;
use cardwise_types::{DocPath, Entry, Payload, SyncId, strip_metadata, timestamp_value};
use chrono::{DateTime, SubsecRound, Utc};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// What a single reconciliation step did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Both sides already agree, or there is nothing to do.
    Unchanged,
    /// A local entry was created from a remote document.
    Created,
    /// The remote side was written from the local entry.
    Pushed,
    /// The local entry was overwritten from the remote side.
    Pulled,
    /// A tombstone was deleted remotely and purged locally.
    Deleted,
    /// The payload was already in flight.
    Skipped,
    /// The remote store failed; the item stays unsynced.
    Failed,
}

/// Counts of what a pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub pushed: usize,
    pub pulled: usize,
    pub created: usize,
    pub deleted: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl SyncReport {
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Unchanged => {}
            Outcome::Created => self.created += 1,
            Outcome::Pushed => self.pushed += 1,
            Outcome::Pulled => self.pulled += 1,
            Outcome::Deleted => self.deleted += 1,
            Outcome::Skipped => self.skipped += 1,
            Outcome::Failed => self.failed += 1,
        }
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.pushed += other.pushed;
        self.pulled += other.pulled;
        self.created += other.created;
        self.deleted += other.deleted;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    /// True when the pass changed nothing on either side.
    pub fn is_quiet(&self) -> bool {
        self.pushed + self.pulled + self.created + self.deleted == 0
    }
}

/// Moves data between the local store and a remote store.
#[derive(Clone)]
pub struct Reconciler {
    local: LocalStore,
    remote: Arc<dyn RemoteStore>,
    guard: SyncGuard,
}

impl Reconciler {
    pub fn new(local: LocalStore, remote: Arc<dyn RemoteStore>) -> Self {
        Self {
            local,
            remote,
            guard: SyncGuard::new(),
        }
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn guard(&self) -> &SyncGuard {
        &self.guard
    }

    // ── Documents ──

    /// Reconciles one document given both sides' current state.
    pub async fn reconcile_document(
        &self,
        account: &str,
        path: &DocPath,
        remote: Option<&Payload>,
        local: Option<&Entry>,
    ) -> SyncResult<Outcome> {
        let target = remote_target(path, local)?;
        let remote = remote.map(strip_metadata);
        if let (Some(entry), Some(data)) = (local, remote.as_ref()) {
            if entry.stripped() == *data && !entry.meta.deleted {
                if !entry.meta.synced {
                    self.local.modify_entry_metainfo(
                        account,
                        &entry.path,
                        true,
                        &entry.meta.id,
                        Some(target.last()),
                    )?;
                }
                return Ok(Outcome::Unchanged);
            }
        }

        match (local, remote) {
            (None, None) => Ok(Outcome::Unchanged),
            (None, Some(data)) => {
                let modified = modified_of(&data);
                self.local
                    .apply_remote(account, path, &data, path.last(), modified)?;
                debug!("created local {path} from remote");
                Ok(Outcome::Created)
            }
            (Some(entry), _) if entry.meta.deleted => self.push_entry(account, entry.clone()).await,
            (Some(entry), Some(_)) if !entry.meta.synced => {
                let id = entry.sync_id();
                let Some(_permit) = self.guard.try_acquire(id.clone(), &entry.path) else {
                    return Ok(Outcome::Skipped);
                };
                if let Err(e) = self.remote.set(&target, &entry.stripped(), true).await {
                    warn!("push of {path} to {target} failed: {e}");
                    return Ok(Outcome::Failed);
                }
                self.confirm_pushed(account, entry, &id, target.last(), None)?;
                Ok(Outcome::Pushed)
            }
            (Some(entry), None) if !entry.meta.synced => {
                // Addressed documents are created at their own id, so the
                // next read of `target` finds them.
                let id = entry.sync_id();
                let Some(_permit) = self.guard.try_acquire(id.clone(), &entry.path) else {
                    return Ok(Outcome::Skipped);
                };
                if let Err(e) = self.remote.set(&target, &entry.stripped(), false).await {
                    warn!("create of {path} at {target} failed: {e}");
                    return Ok(Outcome::Failed);
                }
                self.confirm_pushed(account, entry, &id, target.last(), None)?;
                Ok(Outcome::Pushed)
            }
            (Some(entry), Some(data)) => {
                // Synced locally but the remote differs: it changed elsewhere.
                let Some(_permit) = self.guard.try_acquire(entry.sync_id(), &entry.path) else {
                    return Ok(Outcome::Skipped);
                };
                let modified = modified_of(&data);
                self.local
                    .apply_remote(account, &entry.path, &data, target.last(), modified)?;
                debug!("pulled remote {path} over synced local");
                Ok(Outcome::Pulled)
            }
            // Synced locally, absent remotely: unknown or deleted elsewhere.
            (Some(_), None) => Ok(Outcome::Unchanged),
        }
    }

    /// Fetches a document from both stores and reconciles it. The remote
    /// side is read where the local entry says its copy lives. A failed
    /// remote read leaves the document alone.
    pub async fn sync_document(&self, account: &str, path: &DocPath) -> SyncResult<Outcome> {
        let local = self.local.find_entry(account, path)?;
        let target = remote_target(path, local.as_ref())?;
        let remote = match self.remote.get_document(&target).await {
            Ok(remote) => remote,
            Err(e) => {
                warn!("could not read remote {target}: {e}");
                return Ok(Outcome::Failed);
            }
        };
        self.reconcile_document(account, path, remote.as_ref(), local.as_ref())
            .await
    }

    // ── Collections ──

    /// Runs both collection passes over already-fetched state.
    pub async fn reconcile_collection(
        &self,
        account: &str,
        collection: &DocPath,
        remote_items: &[RemoteDocument],
        local_items: Vec<Entry>,
    ) -> SyncResult<SyncReport> {
        let mut report = self.push_entries(account, local_items).await;
        report.merge(self.pull_collection(account, collection, remote_items)?);
        Ok(report)
    }

    /// Local→Remote: pushes every unsynced entry of a collection.
    pub async fn push_collection(
        &self,
        account: &str,
        collection: &DocPath,
    ) -> SyncResult<SyncReport> {
        let pending = self.local.unsynced(account, collection)?;
        Ok(self.push_entries(account, pending).await)
    }

    /// Pushes entries concurrently; one failing or slow item does not hold
    /// up the others.
    pub async fn push_entries(&self, account: &str, entries: Vec<Entry>) -> SyncReport {
        let pushes = entries
            .into_iter()
            .filter(|entry| !entry.meta.synced)
            .map(|entry| async move {
                let path = entry.path.clone();
                match self.push_entry(account, entry).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("local store failed while pushing {path}: {e}");
                        Outcome::Failed
                    }
                }
            });

        let mut report = SyncReport::default();
        for outcome in join_all(pushes).await {
            report.record(outcome);
        }
        report
    }

    async fn push_entry(&self, account: &str, entry: Entry) -> SyncResult<Outcome> {
        let id = entry.sync_id();
        let Some(_permit) = self.guard.try_acquire(id.clone(), &entry.path) else {
            return Ok(Outcome::Skipped);
        };
        let collection = entry.path.collection();

        if entry.meta.deleted {
            if let Some(remote_id) = &entry.meta.remote_id {
                let target = collection.child(remote_id)?;
                if let Err(e) = self.remote.delete(&target).await {
                    warn!("remote delete of {target} failed: {e}");
                    return Ok(Outcome::Failed);
                }
            }
            self.local.delete(account, &entry.path)?;
            debug!("purged tombstone {}", entry.path);
            return Ok(Outcome::Deleted);
        }

        let stamp = Utc::now();

        let remote_id = match &entry.meta.remote_id {
            Some(remote_id) => {
                let target = collection.child(remote_id)?;
                let stamped = with_sync_fields(entry.stripped(), remote_id, stamp);
                if let Err(e) = self.remote.set(&target, &stamped, true).await {
                    warn!("push of {} to {target} failed: {e}", entry.path);
                    return Ok(Outcome::Failed);
                }
                remote_id.clone()
            }
            None => {
                let remote_id = match self.remote.add(&collection, &entry.stripped()).await {
                    Ok(remote_id) => remote_id,
                    Err(e) => {
                        warn!("add of {} failed: {e}", entry.path);
                        return Ok(Outcome::Failed);
                    }
                };
                let target = collection.child(&remote_id)?;
                let write_back = with_sync_fields(Payload::new(), &remote_id, stamp);
                if let Err(e) = self.remote.set(&target, &write_back, true).await {
                    // The document exists remotely now; keep its id so the
                    // retry updates it instead of adding a duplicate.
                    warn!("write-back to {target} failed: {e}");
                    self.local.modify_entry_metainfo(
                        account,
                        &entry.path,
                        false,
                        &entry.meta.id,
                        Some(&remote_id),
                    )?;
                    return Ok(Outcome::Failed);
                }
                remote_id
            }
        };

        self.confirm_pushed(account, &entry, &id, &remote_id, Some(stamp))?;
        Ok(Outcome::Pushed)
    }

    /// Marks an entry synced after its payload reached the remote store,
    /// unless it was edited again while the push was in flight.
    fn confirm_pushed(
        &self,
        account: &str,
        pushed: &Entry,
        pushed_id: &SyncId,
        remote_id: &str,
        stamp: Option<DateTime<Utc>>,
    ) -> SyncResult<()> {
        let Some(current) = self.local.find_entry(account, &pushed.path)? else {
            return Ok(());
        };
        let unchanged = current.sync_id() == *pushed_id && !current.meta.deleted;
        self.local.modify_entry_metainfo(
            account,
            &current.path,
            unchanged,
            &current.meta.id,
            Some(remote_id),
        )?;
        if unchanged {
            if let Some(stamp) = stamp {
                self.local.set_modified(account, &current.path, stamp)?;
            }
            debug!("pushed {} as {remote_id}", current.path);
        } else {
            debug!("{} changed during push, left unsynced", current.path);
        }
        Ok(())
    }

    /// Remote→Local: applies remote items that are new or strictly newer.
    pub fn pull_collection(
        &self,
        account: &str,
        collection: &DocPath,
        remote_items: &[RemoteDocument],
    ) -> SyncResult<SyncReport> {
        let locals = self.local.entries(account, collection, true)?;
        let mut report = SyncReport::default();

        for item in remote_items {
            let logical_id = item.logical_id();
            let found = locals
                .iter()
                .find(|e| e.is_known_as(logical_id))
                .or_else(|| locals.iter().find(|e| e.is_known_as(&item.id)));

            let Some(entry) = found else {
                let path = collection.child(&item.id)?;
                let modified = item.modified().unwrap_or(DateTime::<Utc>::UNIX_EPOCH);
                self.local
                    .apply_remote(account, &path, &item.data, &item.id, modified)?;
                report.record(Outcome::Created);
                continue;
            };

            // Local stamps are kept to the millisecond.
            let remote_modified = item.modified().map(|m| m.trunc_subsecs(3));
            let newer = remote_modified.is_some_and(|modified| modified > entry.meta.modified);
            if newer && !entry.meta.deleted {
                let Some(_permit) = self.guard.try_acquire(entry.sync_id(), &entry.path) else {
                    report.record(Outcome::Skipped);
                    continue;
                };
                let modified = remote_modified.unwrap_or(entry.meta.modified);
                self.local
                    .apply_remote(account, &entry.path, &item.data, &item.id, modified)?;
                report.record(Outcome::Pulled);
            } else if entry.meta.remote_id.as_deref() != Some(item.id.as_str()) {
                self.local.modify_entry_metainfo(
                    account,
                    &entry.path,
                    entry.meta.synced,
                    &entry.meta.id,
                    Some(&item.id),
                )?;
            }
        }

        Ok(report)
    }

    // ── Accounts ──

    /// Full Remote→Local over the tracked collections and documents.
    /// Collections the remote store could not list are left alone.
    pub async fn pull_account(
        &self,
        account: &str,
        collections: &[DocPath],
        documents: &[DocPath],
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();

        for path in documents {
            report.record(self.sync_document(account, path).await?);
        }

        for collection in collections {
            let remote_items = match self.remote.get_collection(collection, &[]).await {
                Ok(items) => items,
                Err(e) => {
                    warn!("could not list remote {collection}: {e}");
                    report.record(Outcome::Failed);
                    continue;
                }
            };
            report.merge(self.pull_collection(account, collection, &remote_items)?);
        }

        info!(
            "pull for {account}: {} created, {} pulled, {} failed",
            report.created, report.pulled, report.failed
        );
        Ok(report)
    }

    /// Local→Remote over the tracked documents and collections. Documents
    /// are only touched when they have unsynced local changes.
    pub async fn push_account(
        &self,
        account: &str,
        collections: &[DocPath],
        documents: &[DocPath],
    ) -> SyncResult<SyncReport> {
        let mut report = SyncReport::default();
        for path in documents {
            let pending = self
                .local
                .find_entry(account, path)?
                .is_some_and(|entry| !entry.meta.synced);
            if pending {
                report.record(self.sync_document(account, path).await?);
            }
        }
        for collection in collections {
            report.merge(self.push_collection(account, collection).await?);
        }
        if !report.is_quiet() || report.failed > 0 {
            info!(
                "push for {account}: {} pushed, {} deleted, {} skipped, {} failed",
                report.pushed, report.deleted, report.skipped, report.failed
            );
        }
        Ok(report)
    }
}

/// Where the remote copy of `path` lives: under the entry's remote id once
/// one is known, at `path` itself otherwise.
fn remote_target(path: &DocPath, local: Option<&Entry>) -> SyncResult<DocPath> {
    match local.and_then(|entry| entry.meta.remote_id.as_deref()) {
        Some(remote_id) if remote_id != path.last() => Ok(path.collection().child(remote_id)?),
        _ => Ok(path.clone()),
    }
}

/// Adds the fields written next to a pushed payload: the remote id, so
/// other devices can match the item, and the push time.
fn with_sync_fields(mut data: Payload, remote_id: &str, stamp: DateTime<Utc>) -> Payload {
    data.insert("id".to_string(), Value::String(remote_id.to_string()));
    data.insert("modified".to_string(), timestamp_value(stamp));
    data
}

fn modified_of(data: &Payload) -> DateTime<Utc> {
    data.get("modified")
        .and_then(cardwise_types::parse_timestamp)
        .unwrap_or_else(Utc::now)
}
