//! File-backed key-value store.
//!
//! The whole store is one JSON object persisted to a single file. Batch
//! writes rewrite the file through a temp-file-then-rename step, so a
//! multi-key `set_many` is visible either in full or not at all.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};
use tracing::warn;

use super::vault::StoreCipher;
use super::KeyValueStore;

/// Default store file name inside the app storage directory
pub const STORE_FILE: &str = "store.bin";

pub struct FileStore {
    path: PathBuf,
    cipher: Option<StoreCipher>,
    map: Mutex<BTreeMap<String, String>>,
}

impl FileStore {
    /// Open a plaintext store file. Intended for development setups where no
    /// keychain is available.
    pub fn open_plain(path: PathBuf) -> Result<Self> {
        Self::open(path, None)
    }

    /// Open a store file sealed with the given 256-bit key.
    pub fn open_sealed(path: PathBuf, key: &[u8; 32]) -> Result<Self> {
        Self::open(path, Some(StoreCipher::new(key)))
    }

    fn open(path: PathBuf, cipher: Option<StoreCipher>) -> Result<Self> {
        let store = Self {
            path,
            cipher,
            map: Mutex::new(BTreeMap::new()),
        };
        store.load()?;
        Ok(store)
    }

    /// Read the store file into memory. An unreadable or undecryptable file
    /// is treated as an absent store: the session manager will fail closed
    /// into the logged-out state rather than trust stale contents.
    fn load(&self) -> Result<()> {
        if !self.path.exists() {
            return Ok(());
        }
        let raw = std::fs::read(&self.path).context("Failed to read store file")?;

        let plaintext = match &self.cipher {
            Some(cipher) => match cipher.open(&raw) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(error = %e, "store file cannot be opened, starting empty");
                    return Ok(());
                }
            },
            None => raw,
        };

        match serde_json::from_slice::<BTreeMap<String, String>>(&plaintext) {
            Ok(map) => *self.map.lock().unwrap() = map,
            Err(e) => warn!(error = %e, "store file is corrupt, starting empty"),
        }
        Ok(())
    }

    /// Persist the in-memory map, all-or-nothing.
    fn persist(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let plaintext = serde_json::to_vec(map)?;
        let contents = match &self.cipher {
            Some(cipher) => cipher.seal(&plaintext)?,
            None => plaintext,
        };

        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, contents).context("Failed to write store file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace store file")?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        let mut next = map.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), (*value).to_string());
        }
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        let mut next = map.clone();
        for key in keys {
            next.remove(*key);
        }
        self.persist(&next)?;
        *map = next;
        Ok(())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.map.lock().unwrap().keys().cloned().collect())
    }

    fn clear(&self) -> Result<()> {
        let mut map = self.map.lock().unwrap();
        self.persist(&BTreeMap::new())?;
        map.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::keys;

    #[test]
    fn test_batch_write_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);

        let store = FileStore::open_plain(path.clone()).unwrap();
        store
            .set_many(&[(keys::USER_TOKEN, "A1"), (keys::ROLE, "doctor")])
            .unwrap();
        drop(store);

        let reopened = FileStore::open_plain(path).unwrap();
        assert_eq!(reopened.get(keys::USER_TOKEN).unwrap().as_deref(), Some("A1"));
        assert_eq!(reopened.get(keys::ROLE).unwrap().as_deref(), Some("doctor"));
    }

    #[test]
    fn test_clear_empties_reopened_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);

        let store = FileStore::open_plain(path.clone()).unwrap();
        store.set(keys::USER_TOKEN, "A1").unwrap();
        store.clear().unwrap();
        assert!(store.keys().unwrap().is_empty());

        let reopened = FileStore::open_plain(path).unwrap();
        assert!(reopened.keys().unwrap().is_empty());
    }

    #[test]
    fn test_sealed_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);
        let key = [9u8; 32];

        let token = "refresh-token-R1";
        let store = FileStore::open_sealed(path.clone(), &key).unwrap();
        store.set(keys::REFRESH_TOKEN, token).unwrap();
        drop(store);

        // On-disk bytes must not leak the token
        let raw = std::fs::read(&path).unwrap();
        assert!(!raw.windows(token.len()).any(|w| w == token.as_bytes()));

        let reopened = FileStore::open_sealed(path, &key).unwrap();
        assert_eq!(reopened.get(keys::REFRESH_TOKEN).unwrap().as_deref(), Some(token));
    }

    #[test]
    fn test_wrong_key_yields_empty_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);

        let store = FileStore::open_sealed(path.clone(), &[1u8; 32]).unwrap();
        store.set(keys::USER_TOKEN, "A1").unwrap();
        drop(store);

        let reopened = FileStore::open_sealed(path, &[2u8; 32]).unwrap();
        assert_eq!(reopened.get(keys::USER_TOKEN).unwrap(), None);
        assert!(reopened.keys().unwrap().is_empty());
    }
}
