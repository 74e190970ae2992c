//! Session lifecycle management.
//!
//! This module provides:
//! - `SessionStore`: the observable in-memory session
//! - `PersistentStore`: the store plus durable persistence and rehydration
//! - `SessionManager`: login, logout, register, refresh and user fetches
//!
//! Sessions survive restarts through the configured storage backend and
//! expired access tokens are renewed with a single shared refresh call.

pub mod manager;
pub mod persist;
pub mod store;

use std::fmt;

pub use manager::SessionManager;
pub use persist::PersistentStore;
pub use store::{LoadingGuard, SessionStore};

/// Where a session currently sits in its lifecycle.
///
/// `Authenticating` and `RefreshPending` only last for the duration of a
/// single operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Anonymous,
    Authenticating,
    Authenticated,
    RefreshPending,
}

impl SessionPhase {
    pub fn label(self) -> &'static str {
        match self {
            Self::Anonymous => "anonymous",
            Self::Authenticating => "authenticating",
            Self::Authenticated => "authenticated",
            Self::RefreshPending => "refresh pending",
        }
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
