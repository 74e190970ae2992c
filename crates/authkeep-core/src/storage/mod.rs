//! Durable storage for the persisted session record.
//!
//! Every backend stores one opaque byte value under a namespace key:
//! - `FileStorage`: `<dir>/<namespace>.json`
//! - `KeyringStorage`: an OS keychain entry
//! - `MemoryStorage`: process memory, for tests and throwaway sessions
//! - `SealedStorage`: ChaCha20-Poly1305 wrapper around any other backend

pub mod file;
pub mod keychain;
pub mod memory;
pub mod sealed;

use anyhow::Result;

pub use self::file::FileStorage;
pub use self::keychain::KeyringStorage;
pub use self::memory::MemoryStorage;
pub use self::sealed::{SealKey, SealedStorage};

/// Fixed key the session record is stored under.
pub const SESSION_NAMESPACE: &str = "auth-storage";

/// A single durable slot.
pub trait StateStorage: Send + Sync {
    /// Read the stored value. `Ok(None)` when nothing has been written.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    fn save(&self, value: &[u8]) -> Result<()>;

    /// Remove the stored value. Removing an empty slot is not an error.
    fn remove(&self) -> Result<()>;
}
