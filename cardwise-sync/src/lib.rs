//! Sync core for Cardwise.
//!
//! Domain code talks to the [`Backend`] facade, which reads and writes the
//! local store immediately. A [`SyncScheduler`] drives the [`Reconciler`]
//! in the background to exchange changes with the remote store:
//!
//! - a one-shot pull shortly after startup
//! - a push pass on a fixed interval
//!
//! The [`SyncGuard`] keeps two passes from pushing the same payload at once.

pub mod backend;
pub mod config;
pub mod error;
pub mod guard;
pub mod ledger;
pub mod reconciler;
pub mod scheduler;

pub use backend::{Backend, DOC_ID_FIELD};
pub use config::SyncConfig;
pub use error::{BackendError, BackendResult, SyncError, SyncResult};
pub use guard::{SyncGuard, SyncPermit};
pub use ledger::{CardRank, Ledger, OwnedCard, StoreInfo, Transaction, category_for_store_type};
pub use reconciler::{Outcome, Reconciler, SyncReport};
pub use scheduler::{
    SchedulerCommand, SchedulerHandle, SchedulerStatus, SyncScheduler, create_sync_scheduler,
};
