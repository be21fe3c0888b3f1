//! Sync configuration.

use crate::error::{SyncError, SyncResult};
use cardwise_cloud::RemoteBackend;
use cardwise_types::DocPath;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder substituted with the signed-in account id in tracked paths.
pub const ACCOUNT_PLACEHOLDER: &str = "{account}";

/// Configuration for the sync scheduler and the daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// DuckDB file; `None` keeps the local store in memory.
    pub database_path: Option<PathBuf>,
    /// Delay before the one-shot startup pull.
    pub startup_delay_secs: u64,
    /// Interval between push passes.
    pub push_interval_secs: u64,
    /// Collection path templates reconciled on every pass.
    pub tracked_collections: Vec<String>,
    /// Document path templates reconciled by the startup pull and pushed on
    /// each tick when they carry unsynced changes.
    pub tracked_documents: Vec<String>,
    /// Which remote store to talk to.
    pub remote: RemoteBackend,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            startup_delay_secs: 15,
            push_interval_secs: 30,
            tracked_collections: vec![
                "users.{account}.cards".to_string(),
                "users.{account}.transactions".to_string(),
                "cards".to_string(),
            ],
            tracked_documents: vec!["users.{account}".to_string()],
            remote: RemoteBackend::default(),
        }
    }
}

impl SyncConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn startup_delay(&self) -> Duration {
        Duration::from_secs(self.startup_delay_secs)
    }

    pub fn push_interval(&self) -> Duration {
        Duration::from_secs(self.push_interval_secs)
    }

    /// Rejects settings the scheduler cannot run with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.push_interval_secs == 0 {
            return Err(SyncError::Config(
                "push_interval_secs must be greater than zero".to_string(),
            ));
        }
        self.collections_for("validate")?;
        self.documents_for("validate")?;
        Ok(())
    }

    /// Tracked collections expanded for `account`.
    pub fn collections_for(&self, account: &str) -> SyncResult<Vec<DocPath>> {
        self.tracked_collections
            .iter()
            .map(|template| {
                let path = expand(template, account)?;
                path.expect_collection()?;
                Ok(path)
            })
            .collect()
    }

    /// Tracked documents expanded for `account`.
    pub fn documents_for(&self, account: &str) -> SyncResult<Vec<DocPath>> {
        self.tracked_documents
            .iter()
            .map(|template| {
                let path = expand(template, account)?;
                path.split_document()?;
                Ok(path)
            })
            .collect()
    }
}

fn expand(template: &str, account: &str) -> SyncResult<DocPath> {
    Ok(DocPath::parse(&template.replace(ACCOUNT_PLACEHOLDER, account))?)
}
