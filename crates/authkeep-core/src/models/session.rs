use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::User;

/// Access + refresh credential pair. Both tokens are opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
    /// When this client received `access`. Absent in records written
    /// before it was tracked.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub issued_at: Option<DateTime<Utc>>,
}

impl TokenPair {
    pub fn new(access: impl Into<String>, refresh: impl Into<String>) -> Self {
        Self {
            access: access.into(),
            refresh: refresh.into(),
            issued_at: Some(Utc::now()),
        }
    }

    /// A pair with an empty token cannot back a session.
    pub fn is_usable(&self) -> bool {
        !self.access.is_empty() && !self.refresh.is_empty()
    }

    /// Age of the access token as seen by this client, if known.
    pub fn access_age(&self) -> Option<Duration> {
        self.issued_at.map(|issued| Utc::now() - issued)
    }

    /// Whether the access token is old enough that it should be renewed
    /// before use. Unknown age never triggers a refresh.
    pub fn needs_refresh(&self, ttl: Duration, buffer: Duration) -> bool {
        match self.access_age() {
            Some(age) => age > ttl - buffer,
            None => false,
        }
    }
}

/// The full in-memory session.
///
/// `is_authenticated` always mirrors the presence of an access token and a
/// `user` is only ever held alongside tokens. The store enforces both.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<User>,
    pub tokens: Option<TokenPair>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

impl SessionState {
    pub fn access_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.access.as_str())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.tokens.as_ref().map(|t| t.refresh.as_str())
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            user: self.user.clone(),
            access_token: self.tokens.as_ref().map(|t| t.access.clone()),
            refresh_token: self.tokens.as_ref().map(|t| t.refresh.clone()),
            is_authenticated: self.is_authenticated,
            is_loading: self.is_loading,
        }
    }

    /// The part of the session that survives a restart.
    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            user: self.user.clone(),
            tokens: self.tokens.clone(),
            is_authenticated: self.is_authenticated,
        }
    }
}

/// Read-only view handed to consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub user: Option<User>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub is_authenticated: bool,
    pub is_loading: bool,
}

/// Serialized form kept under the storage namespace key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSession {
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub tokens: Option<TokenPair>,
    #[serde(rename = "isAuthenticated", default)]
    pub is_authenticated: bool,
}

impl PersistedSession {
    /// Rebuild in-memory state from a stored record.
    ///
    /// Stored flags are not trusted: authentication is recomputed from the
    /// access token and a user without tokens is dropped. Loading is always
    /// false after a restart.
    pub fn into_state(self) -> SessionState {
        let tokens = self.tokens.filter(TokenPair::is_usable);
        let is_authenticated = tokens.is_some();
        if is_authenticated != self.is_authenticated {
            debug!(
                stored = self.is_authenticated,
                derived = is_authenticated,
                "Reconciled persisted authentication flag"
            );
        }

        let user = if tokens.is_some() {
            self.user
        } else {
            if self.user.is_some() {
                debug!("Dropping persisted user without tokens");
            }
            None
        };

        SessionState {
            user,
            tokens,
            is_authenticated,
            is_loading: false,
        }
    }
}
