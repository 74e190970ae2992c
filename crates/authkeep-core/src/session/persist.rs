//! Persistence adapter around [`SessionStore`].
//!
//! Rehydrates synchronously when opened and writes the persisted subset
//! (`user`, `tokens`, `isAuthenticated`) after every committed mutation of
//! that subset. Loading changes are never written. Storage failures are
//! logged and never fail a mutation or startup.

use std::sync::Mutex;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{Config, StorageBackend, APP_NAME};
use crate::models::{PersistedSession, SessionSnapshot, SessionState, User};
use crate::storage::{
    FileStorage, KeyringStorage, MemoryStorage, SealKey, SealedStorage, StateStorage, SESSION_NAMESPACE,
};

use super::store::{LoadingGuard, SessionStore};

pub struct PersistentStore {
    store: SessionStore,
    storage: Box<dyn StateStorage>,
    /// Serializes mutate-then-write so records land in commit order.
    write_lock: Mutex<()>,
}

impl PersistentStore {
    /// Open a store over `storage`, rehydrating whatever it holds.
    pub fn open(storage: Box<dyn StateStorage>) -> Self {
        let state = Self::rehydrate(storage.as_ref());
        Self {
            store: SessionStore::with_state(state),
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// A store that keeps nothing across restarts.
    pub fn in_memory() -> Self {
        Self::open(Box::new(MemoryStorage::new()))
    }

    /// Open the backend selected by `config`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage: Box<dyn StateStorage> = match config.storage {
            StorageBackend::File => {
                let file = FileStorage::new(Config::data_dir()?, SESSION_NAMESPACE);
                if config.encrypt_at_rest {
                    let key = SealKey::load_or_create(APP_NAME)
                        .context("Failed to obtain storage encryption key")?;
                    Box::new(SealedStorage::new(file, key))
                } else {
                    Box::new(file)
                }
            }
            StorageBackend::Keyring => Box::new(KeyringStorage::new(SESSION_NAMESPACE)),
            StorageBackend::Memory => Box::new(MemoryStorage::new()),
        };
        debug!(backend = ?config.storage, encrypted = config.encrypt_at_rest, "Session storage configured");
        Ok(Self::open(storage))
    }

    /// Read the stored record. Anything missing, unreadable or malformed
    /// yields the empty state.
    fn rehydrate(storage: &dyn StateStorage) -> SessionState {
        let bytes = match storage.load() {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                debug!("No persisted session found");
                return SessionState::default();
            }
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session, starting empty");
                return SessionState::default();
            }
        };

        match serde_json::from_slice::<PersistedSession>(&bytes) {
            Ok(persisted) => {
                let state = persisted.into_state();
                info!(authenticated = state.is_authenticated, "Session rehydrated");
                state
            }
            Err(e) => {
                warn!(error = %e, "Persisted session is corrupt, starting empty");
                SessionState::default()
            }
        }
    }

    fn write(&self, state: &SessionState) {
        let record = match serde_json::to_vec(&state.to_persisted()) {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Failed to serialize session");
                return;
            }
        };
        if let Err(e) = self.storage.save(&record) {
            warn!(error = %e, "Failed to persist session");
        }
    }

    /// Run `mutate` against the core store and persist if it committed.
    fn commit<F>(&self, mutate: F) -> bool
    where
        F: FnOnce(&SessionStore) -> bool,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        let changed = mutate(&self.store);
        if changed {
            self.write(&self.store.state());
        }
        changed
    }

    // ===== Reads =====

    pub fn state(&self) -> SessionState {
        self.store.state()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.access_token()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.refresh_token()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    // ===== Mutations =====

    pub fn set_user(&self, user: User) -> bool {
        self.commit(|s| s.set_user(user))
    }

    pub fn set_user_for(&self, refresh_token: &str, user: User) -> bool {
        self.commit(|s| s.set_user_for(refresh_token, user))
    }

    pub fn set_tokens(&self, access: String, refresh: String) -> bool {
        self.commit(|s| s.set_tokens(access, refresh))
    }

    pub fn start_session(&self, access: String, refresh: String) -> bool {
        self.commit(|s| s.start_session(access, refresh))
    }

    pub fn set_access_token(&self, refresh_used: &str, access: String) -> bool {
        self.commit(|s| s.set_access_token(refresh_used, access))
    }

    /// Drop identity and tokens and delete the stored record. If the
    /// backend cannot delete it, the empty record is written instead.
    pub fn clear(&self) {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        self.store.clear();
        if let Err(e) = self.storage.remove() {
            warn!(error = %e, "Failed to remove persisted session, overwriting it");
            self.write(&self.store.state());
        }
    }

    pub fn clear_session(&self, refresh_used: &str) -> bool {
        self.commit(|s| s.clear_session(refresh_used))
    }

    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        self.store.begin_loading()
    }
}
