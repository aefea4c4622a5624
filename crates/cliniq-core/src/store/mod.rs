//! Persistent key-value storage for session state.
//!
//! This is the durable string store the session manager persists tokens and
//! the cached user record into. Two implementations are provided:
//! - `FileStore`: a single JSON map on disk, optionally sealed with
//!   ChaCha20-Poly1305 (the default in the CLI, keyed from the OS keychain)
//! - `MemoryStore`: in-process map for tests and ephemeral sessions

pub mod file;
pub mod vault;

pub use file::FileStore;
pub use vault::{DeviceKey, StoreCipher};

use std::collections::BTreeMap;
use std::sync::Mutex;

use anyhow::Result;

/// Well-known store keys. All of them are wiped together on logout.
pub mod keys {
    /// Access token (short-lived bearer credential)
    pub const USER_TOKEN: &str = "userToken";
    /// Refresh token (longer-lived, exchanged for new access tokens)
    pub const REFRESH_TOKEN: &str = "refreshToken";
    /// JSON-serialized user record
    pub const USER: &str = "user";
    /// Raw role string exactly as the login response reported it
    pub const ROLE: &str = "role";
    /// Optional numeric IDs, stored as strings (empty string when absent)
    pub const DOCTOR_ID: &str = "doctorId";
    pub const PATIENT_ID: &str = "patientId";
    pub const CLINIC_ID: &str = "clinicId";
    /// RFC 3339 timestamp of the last successful login
    pub const LOGGED_IN_AT: &str = "loggedInAt";
}

/// Durable string storage surviving app restarts.
///
/// Multi-key writes are all-or-nothing: a failed `set_many` must leave the
/// store exactly as it was. `clear` wipes every key, not just the well-known
/// session keys.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.set_many(&[(key, value)])
    }

    /// Write several keys in one atomic batch.
    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()>;

    fn remove_many(&self, keys: &[&str]) -> Result<()>;

    /// All keys currently present, in sorted order.
    fn keys(&self) -> Result<Vec<String>>;

    /// Wipe every key in the store.
    fn clear(&self) -> Result<()>;
}

/// In-process store used by tests and short-lived tooling.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.map.lock().unwrap().keys().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        self.map.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_batch_and_clear() {
        let store = MemoryStore::new();
        store
            .set_many(&[(keys::USER_TOKEN, "A1"), (keys::REFRESH_TOKEN, "R1")])
            .unwrap();
        assert_eq!(store.get(keys::USER_TOKEN).unwrap().as_deref(), Some("A1"));
        assert_eq!(store.keys().unwrap().len(), 2);

        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());
        assert_eq!(store.get(keys::USER_TOKEN).unwrap(), None);
    }

    #[test]
    fn test_default_set_goes_through_batch() {
        let store = MemoryStore::new();
        store.set("role", "doctor").unwrap();
        assert_eq!(store.get("role").unwrap().as_deref(), Some("doctor"));
        store.remove_many(&["role"]).unwrap();
        assert_eq!(store.get("role").unwrap(), None);
    }
}
