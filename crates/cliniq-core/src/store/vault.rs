//! Sealing for the on-disk store file.
//!
//! The store holds bearer tokens for a system that fronts patient data, so
//! `FileStore` encrypts its file at rest. The cipher is ChaCha20-Poly1305
//! with a random per-device key kept in the OS keychain; tests inject a
//! fixed key instead.

use anyhow::{anyhow, Context, Result};
use chacha20poly1305::aead::{Aead, KeyInit, OsRng};
use chacha20poly1305::{AeadCore, ChaCha20Poly1305, Key, Nonce};
use keyring::Entry;
use rand::RngCore;

/// Keychain service under which the device store key lives
const SERVICE_NAME: &str = "cliniq";

/// Keychain account name for the store key
const STORE_KEY_ENTRY: &str = "store-key";

/// Nonce length for ChaCha20-Poly1305
const NONCE_LEN: usize = 12;

/// Symmetric cipher wrapping the store file contents.
///
/// Sealed bytes are `nonce || ciphertext`; a fresh random nonce is drawn for
/// every write.
pub struct StoreCipher {
    cipher: ChaCha20Poly1305,
}

impl StoreCipher {
    pub fn new(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| anyhow!("failed to seal store file: {e}"))?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        if sealed.len() < NONCE_LEN {
            return Err(anyhow!("sealed store file is truncated"));
        }
        let (nonce, ciphertext) = sealed.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| anyhow!("failed to open sealed store file: {e}"))
    }
}

/// Per-device store key, generated once and kept in the OS keychain.
pub struct DeviceKey;

impl DeviceKey {
    /// Load the device key, generating and persisting one on first use.
    pub fn load_or_create() -> Result<[u8; 32]> {
        let entry = Entry::new(SERVICE_NAME, STORE_KEY_ENTRY)
            .context("Failed to create keyring entry for store key")?;

        match entry.get_password() {
            Ok(encoded) => {
                let bytes = hex::decode(&encoded)
                    .context("Stored device key is not valid hex")?;
                bytes
                    .try_into()
                    .map_err(|_| anyhow!("stored device key has the wrong length"))
            }
            Err(keyring::Error::NoEntry) => {
                let mut key = [0u8; 32];
                rand::rngs::OsRng.fill_bytes(&mut key);
                entry
                    .set_password(&hex::encode(key))
                    .context("Failed to persist device key in keychain")?;
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to read device key from keychain"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seal_open_round_trip() {
        let cipher = StoreCipher::new(&[7u8; 32]);
        let sealed = cipher.seal(b"{\"userToken\":\"A1\"}").unwrap();
        assert_ne!(&sealed[NONCE_LEN..], b"{\"userToken\":\"A1\"}");

        let opened = cipher.open(&sealed).unwrap();
        assert_eq!(opened, b"{\"userToken\":\"A1\"}");
    }

    #[test]
    fn test_open_rejects_wrong_key() {
        let sealed = StoreCipher::new(&[1u8; 32]).seal(b"secret").unwrap();
        assert!(StoreCipher::new(&[2u8; 32]).open(&sealed).is_err());
    }

    #[test]
    fn test_open_rejects_truncated_input() {
        let cipher = StoreCipher::new(&[7u8; 32]);
        assert!(cipher.open(&[0u8; 4]).is_err());
    }

    #[test]
    fn test_nonces_are_unique_per_seal() {
        let cipher = StoreCipher::new(&[7u8; 32]);
        let a = cipher.seal(b"x").unwrap();
        let b = cipher.seal(b"x").unwrap();
        assert_ne!(a[..NONCE_LEN], b[..NONCE_LEN]);
    }
}
