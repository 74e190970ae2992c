//! Core library for authkeep.
//!
//! Client-side session management for a token-authenticated web backend:
//!
//! - `models`: `User`, `TokenPair`, session snapshots
//! - `api`: the `AuthApi` seam and its reqwest-backed `HttpAuthApi`
//! - `storage`: durable byte storage backends (file, keychain, memory, sealed)
//! - `session`: the observable store, its persistence adapter and the
//!   `SessionManager` that runs login/logout/register/refresh
//! - `config`: application configuration

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod session;
pub mod storage;

pub use api::{ApiError, AuthApi, HttpAuthApi};
pub use config::{Config, StorageBackend};
pub use error::SessionError;
pub use models::{RegisterData, SessionSnapshot, SessionState, TokenPair, User};
pub use session::{PersistentStore, SessionManager, SessionPhase, SessionStore};
