use thiserror::Error;

/// Failures surfaced by [`SessionManager`](crate::SessionManager) operations.
///
/// Transport errors and server rejections are folded into the same
/// variants; callers only see a human-readable message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Login rejected. The previous session is left untouched.
    #[error("{0}")]
    Authentication(String),

    /// Registration rejected. No session impact.
    #[error("{0}")]
    Registration(String),

    /// Refresh requested without a refresh token. No network call was made.
    #[error("No refresh token available")]
    NoRefreshToken,

    /// The refresh token was rejected; the session has been cleared.
    #[error("Session expired: {0}")]
    SessionExpired(String),

    /// Input rejected locally before contacting the server.
    #[error("{0}")]
    InvalidInput(String),

    /// An authenticated operation was attempted without a session.
    #[error("Not logged in")]
    NotAuthenticated,

    #[error("{0}")]
    PasswordChange(String),
}

impl SessionError {
    /// Whether the caller should send the user back to a login prompt.
    pub fn requires_login(&self) -> bool {
        matches!(
            self,
            SessionError::NoRefreshToken | SessionError::SessionExpired(_) | SessionError::NotAuthenticated
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            SessionError::Authentication("Login failed".to_string()).to_string(),
            "Login failed"
        );
        assert_eq!(SessionError::NoRefreshToken.to_string(), "No refresh token available");
        assert_eq!(
            SessionError::SessionExpired("Token refresh failed".to_string()).to_string(),
            "Session expired: Token refresh failed"
        );
    }

    #[test]
    fn test_requires_login() {
        assert!(SessionError::NoRefreshToken.requires_login());
        assert!(SessionError::SessionExpired(String::new()).requires_login());
        assert!(SessionError::NotAuthenticated.requires_login());
        assert!(!SessionError::Authentication(String::new()).requires_login());
        assert!(!SessionError::Registration(String::new()).requires_login());
    }
}
