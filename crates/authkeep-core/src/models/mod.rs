//! Data models for authkeep.
//!
//! - `User`, `RegisterData`: identity records exchanged with the backend
//! - `TokenPair`: the access/refresh credential pair
//! - `SessionState`, `SessionSnapshot`: in-memory session and its read view
//! - `PersistedSession`: the subset written to durable storage

pub mod session;
pub mod user;

pub use session::{PersistedSession, SessionSnapshot, SessionState, TokenPair};
pub use user::{RegisterData, User};
