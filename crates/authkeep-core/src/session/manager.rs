//! Session operations: login, logout, register, refresh and user fetches.
//!
//! Each operation is a sequence of remote calls plus store mutations. The
//! manager never leaves `is_loading` set: operations hold a
//! [`LoadingGuard`](super::LoadingGuard) that is released on every exit
//! path, including when the future is dropped mid-flight.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Duration;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::api::{ApiError, AuthApi, HttpAuthApi};
use crate::config::Config;
use crate::error::SessionError;
use crate::models::user::{validate_credentials, validate_password};
use crate::models::{RegisterData, SessionSnapshot, SessionState, User};

use super::{PersistentStore, SessionPhase};

const LOGIN_FAILED: &str = "Login failed";
const REGISTRATION_FAILED: &str = "Registration failed";
const REFRESH_FAILED: &str = "Token refresh failed";
const PASSWORD_CHANGE_FAILED: &str = "Password change failed";

/// Message carried by an [`ApiError`], falling back to `generic` when the
/// server did not say anything useful.
fn message_or(err: &ApiError, generic: &str) -> String {
    err.server_detail().unwrap_or(generic).to_string()
}

/// Drives the session lifecycle against an [`AuthApi`].
/// Clone is cheap - clones share the same store and refresh coordination.
#[derive(Clone)]
pub struct SessionManager {
    api: Arc<dyn AuthApi>,
    store: Arc<PersistentStore>,
    /// Serializes refresh calls so concurrent 401s share one renewal.
    refresh_gate: Arc<Mutex<()>>,
    refreshes_in_flight: Arc<AtomicUsize>,
    logins_in_flight: Arc<AtomicUsize>,
    token_ttl: Duration,
    refresh_buffer: Duration,
}

/// Counts an operation as in flight until its future finishes or is dropped.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionManager {
    pub fn new(api: Arc<dyn AuthApi>, store: Arc<PersistentStore>) -> Self {
        let defaults = Config::default();
        Self {
            api,
            store,
            refresh_gate: Arc::new(Mutex::new(())),
            refreshes_in_flight: Arc::new(AtomicUsize::new(0)),
            logins_in_flight: Arc::new(AtomicUsize::new(0)),
            token_ttl: defaults.access_token_ttl(),
            refresh_buffer: defaults.refresh_buffer(),
        }
    }

    /// Build the HTTP client and storage backend described by `config`.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api = HttpAuthApi::from_config(config)?;
        let store = PersistentStore::from_config(config)?;
        Ok(Self::new(Arc::new(api), Arc::new(store))
            .with_token_lifetime(config.access_token_ttl(), config.refresh_buffer()))
    }

    /// Set how long access tokens live and how early `ensure_fresh` renews them.
    pub fn with_token_lifetime(mut self, ttl: Duration, buffer: Duration) -> Self {
        self.token_ttl = ttl;
        self.refresh_buffer = buffer;
        self
    }

    pub fn store(&self) -> &Arc<PersistentStore> {
        &self.store
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.store.subscribe()
    }

    pub fn phase(&self) -> SessionPhase {
        if self.refreshes_in_flight.load(Ordering::SeqCst) > 0 {
            return SessionPhase::RefreshPending;
        }
        let logging_in = self.logins_in_flight.load(Ordering::SeqCst) > 0;
        match (self.store.snapshot().is_authenticated, logging_in) {
            (true, _) => SessionPhase::Authenticated,
            (false, true) => SessionPhase::Authenticating,
            (false, false) => SessionPhase::Anonymous,
        }
    }

    // =========================================================================
    // Lifecycle operations
    // =========================================================================

    /// Start a new session.
    ///
    /// On rejection the previous session is left exactly as it was. On
    /// success the new tokens replace the whole session, including any
    /// previous user, and the user record is fetched; a transient fetch
    /// failure does not fail the login.
    pub async fn login(&self, username: &str, password: &str) -> Result<(), SessionError> {
        validate_credentials(username, password).map_err(SessionError::InvalidInput)?;

        let _loading = self.store.begin_loading();
        let _login = InFlight::enter(&self.logins_in_flight);
        debug!(username, "Logging in");

        let tokens = match self.api.login(username, password).await {
            Ok(tokens) => tokens,
            Err(e) => {
                warn!(error = %e, username, "Login failed");
                return Err(SessionError::Authentication(message_or(&e, LOGIN_FAILED)));
            }
        };

        if !self.store.start_session(tokens.access_token, tokens.refresh_token) {
            warn!(username, "Login response held an empty token");
            return Err(SessionError::Authentication(LOGIN_FAILED.to_string()));
        }
        info!(username, "Login successful");

        self.fetch_user_data().await?;
        Ok(())
    }

    /// End the session. Always succeeds locally; the remote revoke is best
    /// effort.
    pub async fn logout(&self) {
        let state = self.store.state();
        if let (Some(access), Some(refresh)) = (state.access_token(), state.refresh_token()) {
            if let Err(e) = self.api.logout(access, refresh).await {
                warn!(error = %e, "Remote logout failed, clearing local session anyway");
            }
        }

        self.store.clear();
        info!("Logged out");
    }

    /// Create an account. Does not log in.
    pub async fn register(&self, data: &RegisterData) -> Result<User, SessionError> {
        data.validate().map_err(SessionError::InvalidInput)?;

        let _loading = self.store.begin_loading();
        match self.api.register(data).await {
            Ok(user) => {
                info!(username = %user.username, "Registration successful");
                Ok(user)
            }
            Err(e) => {
                warn!(error = %e, username = %data.username, "Registration failed");
                Err(SessionError::Registration(message_or(&e, REGISTRATION_FAILED)))
            }
        }
    }

    /// Renew the access token.
    ///
    /// Concurrent callers share a single renewal: whoever finds the token
    /// already replaced by the time it gets the gate returns without a
    /// network call. A rejected refresh token ends the session.
    pub async fn refresh(&self) -> Result<(), SessionError> {
        let observed = self.store.state();
        if observed.refresh_token().is_none() {
            return Err(SessionError::NoRefreshToken);
        }
        let observed_access = observed.access_token().map(str::to_string);

        let _gate = self.refresh_gate.lock().await;

        let current = self.store.state();
        let Some(refresh_token) = current.refresh_token().map(str::to_string) else {
            debug!("Session ended while waiting to refresh");
            return Err(SessionError::SessionExpired(REFRESH_FAILED.to_string()));
        };
        if current.access_token() != observed_access.as_deref() {
            debug!("Access token already renewed");
            return Ok(());
        }

        let _refreshing = InFlight::enter(&self.refreshes_in_flight);
        let result = self.api.refresh(&refresh_token).await.and_then(|renewed| {
            if renewed.access_token.is_empty() {
                Err(ApiError::InvalidResponse("Empty access token".to_string()))
            } else {
                Ok(renewed)
            }
        });
        match result {
            Ok(renewed) => {
                if self.store.set_access_token(&refresh_token, renewed.access_token) {
                    info!("Access token refreshed");
                    Ok(())
                } else if self.store.access_token().is_some() {
                    // A new session replaced this one mid-flight
                    Ok(())
                } else {
                    Err(SessionError::NotAuthenticated)
                }
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed, clearing session");
                self.store.clear_session(&refresh_token);
                Err(SessionError::SessionExpired(message_or(&e, REFRESH_FAILED)))
            }
        }
    }

    /// Load the current user into the store.
    ///
    /// No session is not an error. A 401 triggers one refresh and the fetch
    /// is not retried; other failures are logged and leave the session
    /// alone. Only a failed refresh is surfaced, after the session has been
    /// cleared.
    pub async fn fetch_user_data(&self) -> Result<Option<User>, SessionError> {
        let state = self.store.state();
        let (Some(access), Some(refresh)) = (state.access_token(), state.refresh_token()) else {
            return Ok(None);
        };

        match self.api.current_user(access).await {
            Ok(user) => {
                if self.store.set_user_for(refresh, user.clone()) {
                    Ok(Some(user))
                } else {
                    Ok(None)
                }
            }
            Err(e) if e.is_unauthorized() => {
                debug!("Access token rejected, refreshing");
                self.refresh().await?;
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Failed to fetch user data");
                Ok(None)
            }
        }
    }

    /// Change the account password. An expired access token is refreshed
    /// once and the request repeated once.
    pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<(), SessionError> {
        validate_password(new_password).map_err(SessionError::InvalidInput)?;
        let access = self.store.access_token().ok_or(SessionError::NotAuthenticated)?;

        let _loading = self.store.begin_loading();
        let result = match self.api.change_password(&access, current_password, new_password).await {
            Err(e) if e.is_unauthorized() => {
                debug!("Access token rejected, refreshing before retry");
                self.refresh().await?;
                let access = self.store.access_token().ok_or(SessionError::NotAuthenticated)?;
                self.api.change_password(&access, current_password, new_password).await
            }
            other => other,
        };

        match result {
            Ok(()) => {
                info!("Password changed");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Password change failed");
                Err(SessionError::PasswordChange(message_or(&e, PASSWORD_CHANGE_FAILED)))
            }
        }
    }

    /// Refresh ahead of expiry when the access token is close to its
    /// lifetime. Returns whether a refresh was performed.
    pub async fn ensure_fresh(&self) -> Result<bool, SessionError> {
        let needs_refresh = self
            .store
            .state()
            .tokens
            .as_ref()
            .map(|t| t.needs_refresh(self.token_ttl, self.refresh_buffer))
            .unwrap_or(false);
        if !needs_refresh {
            return Ok(false);
        }

        debug!("Access token near expiry, refreshing");
        self.refresh().await?;
        Ok(true)
    }
}
