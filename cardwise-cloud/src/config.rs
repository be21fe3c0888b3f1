//! Remote store configuration.

use serde::{Deserialize, Serialize};

/// Settings for the REST document API.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CloudConfig {
    /// Base URL of the document API (e.g., "https://api.cardwise.app").
    pub api_base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.cardwise.app".to_string(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Which remote store implementation to run.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RemoteBackend {
    /// In-process store; nothing leaves the device.
    #[default]
    Memory,
    /// REST document API.
    Rest(CloudConfig),
}
