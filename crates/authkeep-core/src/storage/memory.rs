use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use super::StateStorage;

/// In-process storage. Clones share the same slot, which lets tests
/// simulate a restart by opening a second store over a clone.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    slot: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with `value` already stored.
    pub fn with_value(value: impl Into<Vec<u8>>) -> Self {
        Self {
            slot: Arc::new(Mutex::new(Some(value.into()))),
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Option<Vec<u8>>>> {
        self.slot.lock().map_err(|_| anyhow!("Memory storage lock poisoned"))
    }
}

impl StateStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.lock()?.clone())
    }

    fn save(&self, value: &[u8]) -> Result<()> {
        *self.lock()? = Some(value.to_vec());
        Ok(())
    }

    fn remove(&self) -> Result<()> {
        *self.lock()? = None;
        Ok(())
    }
}
