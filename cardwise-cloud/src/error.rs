//! Remote store error types.

use thiserror::Error;

/// Result type for remote store operations.
pub type CloudResult<T> = Result<T, CloudError>;

/// Errors that can occur talking to the remote store.
#[derive(Debug, Error)]
pub enum CloudError {
    #[error("API request failed: {0}")]
    Api(String),

    #[error("authentication required")]
    AuthRequired,

    #[error("authentication failed: {0}")]
    AuthFailed(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid path: {0}")]
    Path(#[from] cardwise_types::PathError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("remote store unavailable: {0}")]
    Unavailable(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CloudError {
    /// Returns true if this error means the addressed document does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            CloudError::NotFound(_) => true,
            CloudError::Http(e) => e.status().is_some_and(|s| s.as_u16() == 404),
            _ => false,
        }
    }
}
