//! Backend facade used by domain code.
//!
//! Every read and write goes to the local store under the signed-in
//! account's key space. Writes leave entries unsynced; the scheduler pushes
//! them later. Deletes by a normal account become tombstones so the remote
//! delete can follow; offline accounts delete outright.

use crate::config::SyncConfig;
use crate::error::{BackendError, BackendResult};
use crate::reconciler::Reconciler;
use crate::scheduler::{SchedulerHandle, create_sync_scheduler};
use cardwise_cloud::RemoteStore;
use cardwise_storage::{LocalStore, Snapshot};
use cardwise_types::{AccountType, DocPath, Filter, LoginState, Payload, timestamp_value};
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

/// Field injected into listed documents carrying the id to address them by.
pub const DOC_ID_FIELD: &str = "docId";

#[derive(Clone)]
pub struct Backend {
    local: LocalStore,
}

impl Backend {
    pub fn new(local: LocalStore) -> Self {
        Self { local }
    }

    /// Opens the local store configured in `config`.
    pub fn open(config: &SyncConfig) -> BackendResult<Self> {
        let local = match &config.database_path {
            Some(path) => LocalStore::open(path)?,
            None => LocalStore::open_in_memory()?,
        };
        Ok(Self::new(local))
    }

    pub fn local(&self) -> &LocalStore {
        &self.local
    }

    // ── Account ──

    pub fn sign_in(&self, account_id: &str) -> BackendResult<()> {
        self.local.store_login_state(&LoginState::normal(account_id))?;
        info!("signed in as {account_id}");
        Ok(())
    }

    pub fn sign_in_offline(&self) -> BackendResult<()> {
        self.local.store_login_state(&LoginState::offline())?;
        info!("signed in offline");
        Ok(())
    }

    /// Signs out, keeping the account type so the next sign-in screen can
    /// offer the same kind of account.
    pub fn sign_out(&self) -> BackendResult<()> {
        let current = self.local.login_state()?;
        self.local
            .store_login_state(&LoginState::signed_out(current.account_type))?;
        info!("signed out");
        Ok(())
    }

    pub fn user_logged_in(&self) -> BackendResult<bool> {
        Ok(self.local.login_state()?.signed_in)
    }

    /// The account whose key space reads and writes use.
    pub fn user_id(&self) -> BackendResult<String> {
        self.local
            .login_state()?
            .active_account()
            .map(str::to_string)
            .ok_or(BackendError::NotSignedIn)
    }

    pub fn user_account_type(&self) -> BackendResult<AccountType> {
        Ok(self.local.login_state()?.account_type)
    }

    /// The current time in the form stored in `modified`-style fields.
    pub fn timestamp(&self) -> Value {
        timestamp_value(Utc::now())
    }

    // ── Data ──

    pub fn db_get(&self, path: &str, filters: &[Filter]) -> BackendResult<Snapshot> {
        let account = self.user_id()?;
        let path = DocPath::parse(path)?;
        Ok(self.local.get(&account, &path, filters)?)
    }

    /// Reads a single document's payload.
    pub fn db_get_document(&self, path: &str) -> BackendResult<Option<Payload>> {
        let account = self.user_id()?;
        let path = DocPath::parse(path)?;
        Ok(self
            .local
            .get_document(&account, &path)?
            .map(|entry| entry.payload))
    }

    pub fn db_set(&self, path: &str, payload: &Payload, merge: bool) -> BackendResult<()> {
        let account = self.user_id()?;
        let path = DocPath::parse(path)?;
        self.local.set(&account, &path, payload, merge)?;
        Ok(())
    }

    /// Adds a document to a collection and returns its id.
    pub fn db_add(&self, path: &str, payload: &Payload) -> BackendResult<String> {
        let account = self.user_id()?;
        let path = DocPath::parse(path)?;
        Ok(self.local.add(&account, &path, payload)?)
    }

    pub fn db_delete(&self, path: &str) -> BackendResult<()> {
        let state = self.local.login_state()?;
        let account = state
            .active_account()
            .ok_or(BackendError::NotSignedIn)?
            .to_string();
        let path = DocPath::parse(path)?;
        match state.account_type {
            AccountType::Offline => self.local.delete(&account, &path)?,
            AccountType::Normal => self.local.mark_deleted(&account, &path)?,
        }
        debug!("deleted {path}");
        Ok(())
    }

    /// Lists every document of a collection, each with [`DOC_ID_FIELD`] set
    /// to the id it can be addressed by.
    pub fn db_get_sub_collections(&self, path: &str) -> BackendResult<Vec<Payload>> {
        self.db_query(path, &[])
    }

    /// Like [`Backend::db_get_sub_collections`], keeping only documents that
    /// match every filter.
    pub fn db_query(&self, path: &str, filters: &[Filter]) -> BackendResult<Vec<Payload>> {
        let account = self.user_id()?;
        let path = DocPath::parse(path)?;
        let entries = self.local.get_collection(&account, &path, filters)?;
        Ok(entries
            .into_iter()
            .map(|entry| {
                let doc_id = entry.doc_id().to_string();
                let mut payload = entry.payload;
                payload.insert(DOC_ID_FIELD.to_string(), Value::String(doc_id));
                payload
            })
            .collect())
    }

    pub fn db_does_doc_exist(&self, path: &str) -> BackendResult<bool> {
        Ok(self.db_get_document(path)?.is_some())
    }

    // ── Sync ──

    /// Starts the sync scheduler against `remote` on the current runtime.
    pub fn spawn_sync(&self, remote: Arc<dyn RemoteStore>, config: SyncConfig) -> SchedulerHandle {
        let reconciler = Reconciler::new(self.local.clone(), remote);
        let (handle, scheduler) = create_sync_scheduler(reconciler, config);
        tokio::spawn(scheduler.run());
        handle
    }
}
