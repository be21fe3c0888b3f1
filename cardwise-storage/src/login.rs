//! Persisted login state (a single row).

use crate::error::{StorageError, StorageResult};
use crate::local_store::LocalStore;
use cardwise_types::{AccountType, LoginState};
use duckdb::params;

impl LocalStore {
    /// Persists the login state, replacing any previous one.
    pub fn store_login_state(&self, state: &LoginState) -> StorageResult<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO login_state (slot, signed_in, account_type, account_id) VALUES (0, ?, ?, ?)",
            params![
                state.signed_in,
                state.account_type.as_str(),
                state.account_id.as_deref(),
            ],
        )?;
        Ok(())
    }

    /// Reads the persisted login state; signed out if nothing was stored.
    pub fn login_state(&self) -> StorageResult<LoginState> {
        let conn = self.conn()?;
        let result = conn.query_row(
            "SELECT signed_in, account_type, account_id FROM login_state WHERE slot = 0",
            [],
            |row| {
                Ok((
                    row.get::<_, bool>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            },
        );

        match result {
            Ok((signed_in, account_type, account_id)) => {
                let account_type: AccountType = account_type
                    .parse()
                    .map_err(StorageError::InvalidData)?;
                Ok(LoginState {
                    signed_in,
                    account_type,
                    account_id,
                })
            }
            Err(duckdb::Error::QueryReturnedNoRows) => Ok(LoginState::default()),
            Err(e) => Err(e.into()),
        }
    }
}
