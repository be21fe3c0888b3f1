//! Error types for the sync core and the backend facade.

use cardwise_cloud::CloudError;
use cardwise_storage::StorageError;
use cardwise_types::PathError;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur while configuring or running sync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Local store error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Remote store error.
    #[error("remote error: {0}")]
    Remote(#[from] CloudError),

    /// Malformed path or path template.
    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}

/// Result type for facade operations.
pub type BackendResult<T> = Result<T, BackendError>;

/// Errors surfaced to domain code by the backend facade.
#[derive(Debug, Error)]
pub enum BackendError {
    /// No account is signed in, so there is no key space to use.
    #[error("no account is signed in")]
    NotSignedIn,

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("invalid path: {0}")]
    Path(#[from] PathError),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
