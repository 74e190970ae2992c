//! Authenticated encryption of a stored value.
//!
//! Layout on the inner backend: `MAGIC || nonce (12 bytes) || ciphertext`.
//! A fresh random nonce is drawn for every write.

use anyhow::{anyhow, bail, Context, Result};
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use keyring::Entry;
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::info;

use super::StateStorage;

const MAGIC: &[u8; 4] = b"AKS1";
const NONCE_LEN: usize = 12;
const KEY_LEN: usize = 32;

/// Keychain account name the sealing key is kept under.
const SEAL_KEY_ACCOUNT: &str = "storage-key";

/// 256-bit key for [`SealedStorage`].
#[derive(Clone)]
pub struct SealKey([u8; KEY_LEN]);

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SealKey(..)")
    }
}

impl SealKey {
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow!("Seal key must be {} bytes, got {}", KEY_LEN, bytes.len()))?;
        Ok(Self(key))
    }

    /// Fetch the key kept in the OS keychain under `service`, creating and
    /// storing a new one on first use.
    pub fn load_or_create(service: &str) -> Result<Self> {
        let entry = Entry::new(service, SEAL_KEY_ACCOUNT).context("Failed to create keyring entry")?;
        match entry.get_secret() {
            Ok(bytes) => Self::from_bytes(&bytes),
            Err(keyring::Error::NoEntry) => {
                let key = Self::generate();
                entry
                    .set_secret(&key.0)
                    .context("Failed to store seal key in keychain")?;
                info!("Created new storage encryption key");
                Ok(key)
            }
            Err(e) => Err(e).context("Failed to read seal key from keychain"),
        }
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new(Key::from_slice(&self.0))
    }
}

/// Encrypts values before handing them to the inner backend.
pub struct SealedStorage<S> {
    inner: S,
    key: SealKey,
}

impl<S: StateStorage> SealedStorage<S> {
    pub fn new(inner: S, key: SealKey) -> Self {
        Self { inner, key }
    }

    fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .key
            .cipher()
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| anyhow!("Failed to encrypt session record"))?;

        let mut out = Vec::with_capacity(MAGIC.len() + NONCE_LEN + ciphertext.len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn open(&self, sealed: &[u8]) -> Result<Vec<u8>> {
        let header = MAGIC.len() + NONCE_LEN;
        if sealed.len() < header || &sealed[..MAGIC.len()] != MAGIC {
            bail!("Stored session record is not sealed");
        }
        let nonce = Nonce::from_slice(&sealed[MAGIC.len()..header]);
        self.key
            .cipher()
            .decrypt(nonce, &sealed[header..])
            .map_err(|_| anyhow!("Failed to decrypt session record"))
    }
}

impl<S: StateStorage> StateStorage for SealedStorage<S> {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match self.inner.load()? {
            Some(sealed) => Ok(Some(self.open(&sealed)?)),
            None => Ok(None),
        }
    }

    fn save(&self, value: &[u8]) -> Result<()> {
        let sealed = self.seal(value)?;
        self.inner.save(&sealed)
    }

    fn remove(&self) -> Result<()> {
        self.inner.remove()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    #[test]
    fn test_sealed_value_is_not_plaintext() {
        let inner = MemoryStorage::new();
        let sealed = SealedStorage::new(inner.clone(), SealKey::generate());

        sealed.save(b"{\"tokens\":{\"access\":\"A1\"}}").unwrap();

        let raw = inner.load().unwrap().unwrap();
        assert!(raw.starts_with(MAGIC));
        assert!(!raw.windows(2).any(|w| w == b"A1"));
        assert_eq!(
            sealed.load().unwrap().as_deref(),
            Some(b"{\"tokens\":{\"access\":\"A1\"}}".as_slice())
        );
    }

    #[test]
    fn test_nonce_differs_per_write() {
        let inner = MemoryStorage::new();
        let sealed = SealedStorage::new(inner.clone(), SealKey::generate());

        sealed.save(b"same").unwrap();
        let first = inner.load().unwrap().unwrap();
        sealed.save(b"same").unwrap();
        let second = inner.load().unwrap().unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn test_wrong_key_fails() {
        let inner = MemoryStorage::new();
        SealedStorage::new(inner.clone(), SealKey::generate())
            .save(b"secret")
            .unwrap();

        let other = SealedStorage::new(inner, SealKey::generate());
        assert!(other.load().is_err());
    }

    #[test]
    fn test_plaintext_record_is_rejected() {
        let inner = MemoryStorage::with_value(b"{\"isAuthenticated\":true}".to_vec());
        let sealed = SealedStorage::new(inner, SealKey::generate());
        assert!(sealed.load().is_err());
    }

    #[test]
    fn test_seal_key_from_bytes() {
        assert!(SealKey::from_bytes(&[7u8; 32]).is_ok());
        assert!(SealKey::from_bytes(&[7u8; 16]).is_err());
        assert_eq!(format!("{:?}", SealKey::generate()), "SealKey(..)");
    }
}
