use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Minimum password length accepted before anything is sent to the backend.
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Identity record for the authenticated user.
///
/// Always replaced wholesale from a backend response, never patched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub is_superuser: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "ts", ts(type = "string | null"))]
    pub updated_at: Option<DateTime<Utc>>,
}

fn default_true() -> bool {
    true
}

impl User {
    /// Name to show for this user: full name when set, else username.
    pub fn display_name(&self) -> &str {
        match self.full_name.as_deref() {
            Some(name) if !name.trim().is_empty() => name,
            _ => &self.username,
        }
    }
}

/// Payload for creating a new account.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct RegisterData {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl RegisterData {
    /// Check the fields the backend would reject outright.
    /// Returns a user-facing message for the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.username.trim().is_empty() {
            return Err("Username is required".to_string());
        }
        if !self.email.contains('@') {
            return Err("A valid email address is required".to_string());
        }
        validate_password(&self.password)
    }
}

/// Validate login form input.
pub fn validate_credentials(username: &str, password: &str) -> Result<(), String> {
    if username.trim().is_empty() {
        return Err("Username is required".to_string());
    }
    if password.is_empty() {
        return Err("Password is required".to_string());
    }
    validate_password(password)
}

pub fn validate_password(password: &str) -> Result<(), String> {
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LENGTH
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_from_backend() {
        let json = r#"{"id": 1, "username": "alice", "email": "alice@example.com", "is_active": true, "is_superuser": false, "created_at": "2024-03-01T12:00:00Z", "updated_at": null}"#;

        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert_eq!(user.id, 1);
        assert_eq!(user.username, "alice");
        assert!(user.full_name.is_none());
        assert!(user.is_active);
        assert!(!user.is_superuser);
        assert!(user.created_at.is_some());
        assert!(user.updated_at.is_none());
    }

    #[test]
    fn test_parse_user_minimal() {
        let json = r#"{"id": 7, "username": "bob", "email": "bob@example.com"}"#;
        let user: User = serde_json::from_str(json).expect("Failed to parse user JSON");
        assert!(user.is_active);
        assert!(!user.is_superuser);
    }

    #[test]
    fn test_display_name() {
        let mut user: User =
            serde_json::from_str(r#"{"id": 1, "username": "alice", "email": "a@x.io"}"#).unwrap();
        assert_eq!(user.display_name(), "alice");

        user.full_name = Some("Alice Liddell".to_string());
        assert_eq!(user.display_name(), "Alice Liddell");

        user.full_name = Some("   ".to_string());
        assert_eq!(user.display_name(), "alice");
    }

    #[test]
    fn test_validate_credentials() {
        assert!(validate_credentials("alice", "password123").is_ok());
        assert!(validate_credentials("", "password123").is_err());
        assert!(validate_credentials("   ", "password123").is_err());
        assert!(validate_credentials("alice", "").is_err());
        assert!(validate_credentials("alice", "short").is_err());
    }

    #[test]
    fn test_register_data_validate() {
        let mut data = RegisterData {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "password123".to_string(),
            full_name: None,
        };
        assert!(data.validate().is_ok());

        data.email = "not-an-email".to_string();
        assert_eq!(
            data.validate().unwrap_err(),
            "A valid email address is required"
        );

        data.email = "alice@example.com".to_string();
        data.password = "1234567".to_string();
        assert!(data.validate().is_err());
    }

    #[test]
    fn test_register_data_omits_missing_full_name() {
        let data = RegisterData {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "password123".to_string(),
            full_name: None,
        };
        let value = serde_json::to_value(&data).unwrap();
        assert!(value.get("full_name").is_none());
    }
}
