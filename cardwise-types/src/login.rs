//! Persisted login / account state.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account id used for every offline account.
pub const OFFLINE_ACCOUNT_ID: &str = "offline";

/// Kind of account the user signed in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    /// Backed by the remote store.
    #[default]
    Normal,
    /// Local only; remote calls are never issued.
    Offline,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Offline => "offline",
        }
    }
}

impl fmt::Display for AccountType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Self::Normal),
            "offline" => Ok(Self::Offline),
            other => Err(format!("unknown account type: {other}")),
        }
    }
}

/// Login state as persisted in the local database.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LoginState {
    pub signed_in: bool,
    pub account_type: AccountType,
    /// Remote user id for normal accounts.
    pub account_id: Option<String>,
}

impl LoginState {
    pub fn signed_out(account_type: AccountType) -> Self {
        Self {
            signed_in: false,
            account_type,
            account_id: None,
        }
    }

    pub fn offline() -> Self {
        Self {
            signed_in: true,
            account_type: AccountType::Offline,
            account_id: None,
        }
    }

    pub fn normal(account_id: impl Into<String>) -> Self {
        Self {
            signed_in: true,
            account_type: AccountType::Normal,
            account_id: Some(account_id.into()),
        }
    }

    /// The account whose key space reads and writes go to, if any.
    pub fn active_account(&self) -> Option<&str> {
        if !self.signed_in {
            return None;
        }
        match self.account_type {
            AccountType::Offline => Some(OFFLINE_ACCOUNT_ID),
            AccountType::Normal => self.account_id.as_deref(),
        }
    }

    /// True when the reconciler's remote half may run for this state.
    pub fn allows_remote(&self) -> bool {
        self.signed_in && self.account_type == AccountType::Normal && self.account_id.is_some()
    }
}
