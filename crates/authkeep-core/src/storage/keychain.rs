use anyhow::{Context, Result};
use keyring::Entry;

use crate::config::APP_NAME;

use super::StateStorage;

/// Stores the value as a secret in the OS keychain.
pub struct KeyringStorage {
    service: String,
    namespace: String,
}

impl KeyringStorage {
    pub fn new(namespace: &str) -> Self {
        Self::with_service(APP_NAME, namespace)
    }

    pub fn with_service(service: &str, namespace: &str) -> Self {
        Self {
            service: service.to_string(),
            namespace: namespace.to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service, &self.namespace).context("Failed to create keyring entry")
    }
}

impl StateStorage for KeyringStorage {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        match self.entry()?.get_secret() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to read session from keychain"),
        }
    }

    fn save(&self, value: &[u8]) -> Result<()> {
        self.entry()?
            .set_secret(value)
            .context("Failed to store session in keychain")
    }

    fn remove(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete session from keychain"),
        }
    }
}
