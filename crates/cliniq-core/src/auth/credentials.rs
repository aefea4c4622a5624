//! Remembered login credentials in the OS keychain.
//!
//! Opt-in convenience for the CLI's `login --remember` flow. These entries
//! are independent of the session store: logout wipes the store but leaves
//! remembered credentials alone, so the next login can reuse them.

use anyhow::{Context, Result};
use keyring::Entry;

/// Keychain service under which remembered credentials live
const SERVICE_NAME: &str = "cliniq";

pub struct CredentialStore;

impl CredentialStore {
    /// Remember a password for a username.
    pub fn remember(username: &str, password: &str) -> Result<()> {
        Self::entry(username)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Look up the remembered password for a username, if any.
    pub fn recall(username: &str) -> Result<Option<String>> {
        match Self::entry(username)?.get_password() {
            Ok(password) => Ok(Some(password)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read password from keychain"),
        }
    }

    /// Drop the remembered credentials for a username.
    pub fn forget(username: &str) -> Result<()> {
        match Self::entry(username)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete credential from keychain"),
        }
    }

    fn entry(username: &str) -> Result<Entry> {
        Entry::new(SERVICE_NAME, username).context("Failed to create keyring entry")
    }
}
