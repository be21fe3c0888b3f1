//! Timed sync driver.
//!
//! Two timers run for the lifetime of a backend:
//! - a one-shot startup pull after `startup_delay_secs`
//! - a push pass every `push_interval_secs` over the tracked collections and
//!   any tracked document with unsynced changes, each spawned as its own task
//!   so a hung remote call never delays the next tick
//!
//! Both look up the signed-in account on every firing and do nothing for
//! offline accounts or when signed out. [`SchedulerHandle`] sends commands
//! to the loop and reads its status.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::reconciler::{Reconciler, SyncReport};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Commands accepted by the scheduler loop.
#[derive(Debug)]
pub enum SchedulerCommand {
    /// Run a push pass now.
    PushNow,
    /// Run a full pull now, even if the startup pull already ran.
    PullNow,
    /// Stop the loop.
    Stop,
}

/// Snapshot of what the scheduler has done so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStatus {
    pub startup_pull_done: bool,
    pub last_pull: Option<DateTime<Utc>>,
    pub last_push: Option<DateTime<Utc>>,
    pub running_pushes: usize,
    pub last_pull_report: Option<SyncReport>,
    pub last_push_report: Option<SyncReport>,
}

type SharedStatus = Arc<Mutex<SchedulerStatus>>;

fn lock(status: &SharedStatus) -> MutexGuard<'_, SchedulerStatus> {
    status.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Handle for sending commands to the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    command_tx: mpsc::Sender<SchedulerCommand>,
    status: SharedStatus,
}

impl SchedulerHandle {
    pub async fn stop(&self) -> SyncResult<()> {
        self.send(SchedulerCommand::Stop).await
    }

    pub async fn push_now(&self) -> SyncResult<()> {
        self.send(SchedulerCommand::PushNow).await
    }

    pub async fn pull_now(&self) -> SyncResult<()> {
        self.send(SchedulerCommand::PullNow).await
    }

    pub fn status(&self) -> SchedulerStatus {
        lock(&self.status).clone()
    }

    /// True once the loop has exited.
    pub fn is_stopped(&self) -> bool {
        self.command_tx.is_closed()
    }

    async fn send(&self, command: SchedulerCommand) -> SyncResult<()> {
        self.command_tx
            .send(command)
            .await
            .map_err(|_| SyncError::ChannelClosed)
    }
}

/// The scheduler loop. Drive it with [`SyncScheduler::run`].
pub struct SyncScheduler {
    reconciler: Reconciler,
    config: SyncConfig,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    status: SharedStatus,
}

/// Creates a scheduler and its command handle.
pub fn create_sync_scheduler(
    reconciler: Reconciler,
    config: SyncConfig,
) -> (SchedulerHandle, SyncScheduler) {
    let (command_tx, command_rx) = mpsc::channel(16);
    let status = SharedStatus::default();

    let handle = SchedulerHandle {
        command_tx,
        status: Arc::clone(&status),
    };
    let scheduler = SyncScheduler {
        reconciler,
        config,
        command_rx,
        status,
    };

    (handle, scheduler)
}

impl SyncScheduler {
    /// Runs until stopped or until every handle is dropped.
    pub async fn run(mut self) {
        info!(
            "sync scheduler started (startup pull in {}s, push every {}s)",
            self.config.startup_delay_secs, self.config.push_interval_secs
        );

        let startup = tokio::time::sleep(self.config.startup_delay());
        tokio::pin!(startup);
        let mut startup_fired = false;

        let mut push_interval = tokio::time::interval(self.config.push_interval());
        // Skip first immediate tick
        push_interval.tick().await;

        loop {
            tokio::select! {
                _ = &mut startup, if !startup_fired => {
                    startup_fired = true;
                    self.startup_pull().await;
                }
                _ = push_interval.tick() => {
                    self.spawn_push();
                }
                cmd = self.command_rx.recv() => {
                    match cmd {
                        Some(SchedulerCommand::PushNow) => self.spawn_push(),
                        Some(SchedulerCommand::PullNow) => self.pull().await,
                        Some(SchedulerCommand::Stop) => {
                            info!("sync scheduler stopping");
                            break;
                        }
                        None => {
                            info!("command channel closed, stopping sync scheduler");
                            break;
                        }
                    }
                }
            }
        }

        info!("sync scheduler stopped");
    }

    /// The signed-in account whose data may be synced, if any.
    fn remote_account(&self) -> Option<String> {
        match self.reconciler.local().login_state() {
            Ok(state) if state.allows_remote() => state.account_id,
            Ok(_) => None,
            Err(e) => {
                error!("could not read login state: {e}");
                None
            }
        }
    }

    async fn startup_pull(&self) {
        if lock(&self.status).startup_pull_done {
            return;
        }
        if self.remote_account().is_none() {
            debug!("startup pull skipped: no remote account");
            return;
        }
        self.pull().await;
        lock(&self.status).startup_pull_done = true;
    }

    async fn pull(&self) {
        let Some(account) = self.remote_account() else {
            debug!("pull skipped: no remote account");
            return;
        };
        let result = async {
            let collections = self.config.collections_for(&account)?;
            let documents = self.config.documents_for(&account)?;
            self.reconciler
                .pull_account(&account, &collections, &documents)
                .await
        }
        .await;

        match result {
            Ok(report) => {
                let mut status = lock(&self.status);
                status.last_pull = Some(Utc::now());
                status.last_pull_report = Some(report);
            }
            Err(e) => warn!("pull for {account} failed: {e}"),
        }
    }

    fn spawn_push(&self) {
        let Some(account) = self.remote_account() else {
            debug!("push skipped: no remote account");
            return;
        };
        let (collections, documents) = match (
            self.config.collections_for(&account),
            self.config.documents_for(&account),
        ) {
            (Ok(collections), Ok(documents)) => (collections, documents),
            (Err(e), _) | (_, Err(e)) => {
                error!("invalid tracked paths: {e}");
                return;
            }
        };

        let reconciler = self.reconciler.clone();
        let status = Arc::clone(&self.status);
        lock(&status).running_pushes += 1;

        tokio::spawn(async move {
            let result = reconciler
                .push_account(&account, &collections, &documents)
                .await;
            let mut status = lock(&status);
            status.running_pushes = status.running_pushes.saturating_sub(1);
            match result {
                Ok(report) => {
                    status.last_push = Some(Utc::now());
                    status.last_push_report = Some(report);
                }
                Err(e) => warn!("push for {account} failed: {e}"),
            }
        });
    }
}
