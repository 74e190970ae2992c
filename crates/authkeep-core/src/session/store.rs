//! In-memory, observable session container.
//!
//! The store owns no I/O. Every mutation is applied atomically through a
//! `tokio::sync::watch` channel, so readers never observe a half-applied
//! change and subscribers are woken once per committed change.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::Utc;
use tokio::sync::watch;
use tracing::debug;

use crate::models::{SessionSnapshot, SessionState, TokenPair, User};

pub struct SessionStore {
    state: watch::Sender<SessionState>,
    /// Operations currently holding a [`LoadingGuard`].
    in_flight: AtomicUsize,
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore {
    /// Empty, anonymous store.
    pub fn new() -> Self {
        Self::with_state(SessionState::default())
    }

    /// Store seeded with `state`. Loading is always reset.
    pub fn with_state(mut state: SessionState) -> Self {
        state.is_loading = false;
        let (state, _) = watch::channel(state);
        Self {
            state,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.borrow().snapshot()
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.borrow().access_token().map(str::to_string)
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.borrow().refresh_token().map(str::to_string)
    }

    /// Receive every committed change from now on.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Replace the user. Refused while no tokens are held, so a user can
    /// never outlive the session it belongs to.
    pub fn set_user(&self, user: User) -> bool {
        self.state.send_if_modified(|s| {
            if s.tokens.is_none() {
                debug!("Ignoring user update without a session");
                return false;
            }
            s.user = Some(user);
            true
        })
    }

    /// Replace the user only if the session still uses `refresh_token`.
    pub fn set_user_for(&self, refresh_token: &str, user: User) -> bool {
        self.state.send_if_modified(|s| {
            if s.refresh_token() != Some(refresh_token) {
                debug!("Session changed during user fetch, discarding user");
                return false;
            }
            s.user = Some(user);
            true
        })
    }

    /// Install a new token pair. The user is left as is. A pair with an
    /// empty token is refused.
    pub fn set_tokens(&self, access: String, refresh: String) -> bool {
        let tokens = TokenPair::new(access, refresh);
        if !tokens.is_usable() {
            debug!("Ignoring empty token pair");
            return false;
        }
        self.state.send_modify(|s| {
            s.tokens = Some(tokens);
            s.is_authenticated = true;
        });
        true
    }

    /// Replace the whole session with a fresh token pair and no user.
    pub fn start_session(&self, access: String, refresh: String) -> bool {
        let tokens = TokenPair::new(access, refresh);
        if !tokens.is_usable() {
            debug!("Ignoring empty token pair");
            return false;
        }
        self.state.send_modify(|s| {
            s.user = None;
            s.tokens = Some(tokens);
            s.is_authenticated = true;
        });
        true
    }

    /// Swap in a renewed access token, provided the session still holds
    /// the refresh token it was minted from.
    pub fn set_access_token(&self, refresh_used: &str, access: String) -> bool {
        if access.is_empty() {
            debug!("Ignoring empty access token");
            return false;
        }
        self.state.send_if_modified(|s| match s.tokens.as_mut() {
            Some(tokens) if tokens.refresh == refresh_used => {
                tokens.access = access;
                tokens.issued_at = Some(Utc::now());
                s.is_authenticated = true;
                true
            }
            _ => {
                debug!("Session changed during refresh, discarding new access token");
                false
            }
        })
    }

    /// Drop identity and tokens. Idempotent.
    pub fn clear(&self) -> bool {
        self.state.send_if_modified(|s| {
            if s.user.is_none() && s.tokens.is_none() && !s.is_authenticated {
                return false;
            }
            s.user = None;
            s.tokens = None;
            s.is_authenticated = false;
            true
        })
    }

    /// Clear only if the session still holds `refresh_used`.
    pub fn clear_session(&self, refresh_used: &str) -> bool {
        if self.state.borrow().refresh_token() != Some(refresh_used) {
            return false;
        }
        self.state.send_if_modified(|s| {
            if s.refresh_token() != Some(refresh_used) {
                return false;
            }
            s.user = None;
            s.tokens = None;
            s.is_authenticated = false;
            true
        })
    }

    /// Mark an operation as in flight until the guard is dropped.
    pub fn begin_loading(&self) -> LoadingGuard<'_> {
        self.state.send_if_modified(|s| {
            let previous = self.in_flight.fetch_add(1, Ordering::SeqCst);
            if previous == 0 && !s.is_loading {
                s.is_loading = true;
                true
            } else {
                false
            }
        });
        LoadingGuard { store: self }
    }

    fn end_loading(&self) {
        self.state.send_if_modified(|s| {
            let previous = self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if previous == 1 && s.is_loading {
                s.is_loading = false;
                true
            } else {
                false
            }
        });
    }
}

/// Keeps `is_loading` set while alive. Dropping it (on success, error or
/// cancellation) releases the flag.
#[must_use = "loading is cleared as soon as the guard is dropped"]
pub struct LoadingGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.store.end_loading();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> User {
        serde_json::from_str(r#"{"id": 1, "username": "alice", "email": "alice@example.com"}"#)
            .expect("Failed to parse user JSON")
    }

    fn assert_invariants(state: &SessionState) {
        if state.user.is_some() {
            assert!(state.tokens.is_some(), "user present without tokens");
        }
        assert_eq!(state.is_authenticated, state.access_token().is_some());
    }

    #[test]
    fn test_new_store_is_anonymous() {
        let store = SessionStore::new();
        let snapshot = store.snapshot();
        assert!(snapshot.user.is_none());
        assert!(snapshot.access_token.is_none());
        assert!(!snapshot.is_authenticated);
        assert!(!snapshot.is_loading);
    }

    #[test]
    fn test_set_tokens_authenticates_without_touching_user() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R1".to_string());
        assert!(store.set_user(alice()));

        store.set_tokens("A2".to_string(), "R2".to_string());
        let state = store.state();
        assert_eq!(state.access_token(), Some("A2"));
        assert_eq!(state.refresh_token(), Some("R2"));
        assert!(state.is_authenticated);
        assert_eq!(state.user.as_ref().map(|u| u.username.as_str()), Some("alice"));
        assert_invariants(&state);
    }

    #[test]
    fn test_start_session_drops_previous_user() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R1".to_string());
        store.set_user(alice());

        assert!(store.start_session("A2".to_string(), "R2".to_string()));
        let state = store.state();
        assert!(state.user.is_none());
        assert_eq!(state.access_token(), Some("A2"));
        assert_eq!(state.refresh_token(), Some("R2"));
        assert_invariants(&state);
    }

    #[test]
    fn test_empty_tokens_are_refused() {
        let store = SessionStore::new();
        assert!(!store.set_tokens(String::new(), "R1".to_string()));
        assert!(!store.start_session("A1".to_string(), String::new()));
        assert_eq!(store.state(), SessionState::default());

        store.set_tokens("A1".to_string(), "R1".to_string());
        assert!(!store.set_access_token("R1", String::new()));
        assert_eq!(store.access_token().as_deref(), Some("A1"));
        assert_invariants(&store.state());
    }

    #[test]
    fn test_set_user_requires_tokens() {
        let store = SessionStore::new();
        assert!(!store.set_user(alice()));
        assert!(store.state().user.is_none());
        assert_invariants(&store.state());
    }

    #[test]
    fn test_set_user_for_other_session_is_discarded() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R1".to_string());
        assert!(!store.set_user_for("R0", alice()));
        assert!(store.set_user_for("R1", alice()));
        assert!(store.state().user.is_some());
    }

    #[test]
    fn test_set_access_token_keeps_refresh_token() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R1".to_string());

        assert!(store.set_access_token("R1", "A2".to_string()));
        let state = store.state();
        assert_eq!(state.access_token(), Some("A2"));
        assert_eq!(state.refresh_token(), Some("R1"));
        assert!(state.is_authenticated);
    }

    #[test]
    fn test_set_access_token_after_clear_is_discarded() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R1".to_string());
        store.clear();

        assert!(!store.set_access_token("R1", "A2".to_string()));
        assert_eq!(store.state(), SessionState::default());
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R1".to_string());
        store.set_user(alice());

        assert!(store.clear());
        let once = store.state();
        assert!(!store.clear());
        assert_eq!(store.state(), once);
        assert_eq!(once, SessionState::default());
    }

    #[test]
    fn test_clear_session_only_matches_current_refresh_token() {
        let store = SessionStore::new();
        store.set_tokens("A1".to_string(), "R2".to_string());
        assert!(!store.clear_session("R1"));
        assert!(store.state().is_authenticated);
        assert!(store.clear_session("R2"));
        assert!(!store.state().is_authenticated);
    }

    #[test]
    fn test_loading_guard_nesting() {
        let store = SessionStore::new();
        let outer = store.begin_loading();
        assert!(store.snapshot().is_loading);
        {
            let _inner = store.begin_loading();
            assert!(store.snapshot().is_loading);
        }
        assert!(store.snapshot().is_loading);
        drop(outer);
        assert!(!store.snapshot().is_loading);
    }

    #[test]
    fn test_with_state_resets_loading() {
        let store = SessionStore::with_state(SessionState {
            is_loading: true,
            ..SessionState::default()
        });
        assert!(!store.snapshot().is_loading);
    }

    #[tokio::test]
    async fn test_subscribers_see_committed_changes() {
        let store = SessionStore::new();
        let mut rx = store.subscribe();

        store.set_tokens("A1".to_string(), "R1".to_string());
        rx.changed().await.unwrap();
        assert!(rx.borrow_and_update().is_authenticated);

        store.clear();
        rx.changed().await.unwrap();
        assert!(!rx.borrow_and_update().is_authenticated);

        // No-op mutations do not wake subscribers
        store.clear();
        assert!(!rx.has_changed().unwrap());
    }
}
