//! Application configuration management.
//!
//! Configuration is stored at `~/.config/authkeep/config.json` and can be
//! overridden from the environment (`AUTHKEEP_*`), which the CLI populates
//! from a `.env` file when present.

use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::api::client::DEFAULT_REQUEST_TIMEOUT_SECS;

/// Application name used for config/data directory paths and the keychain service
pub const APP_NAME: &str = "authkeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_API_BASE_URL: &str = "http://localhost:8000";

/// Backend access tokens live for 30 minutes.
const DEFAULT_ACCESS_TOKEN_TTL_MINUTES: i64 = 30;

/// Renew this many minutes before the access token would expire.
const DEFAULT_REFRESH_BUFFER_MINUTES: i64 = 5;

pub const ENV_API_URL: &str = "AUTHKEEP_API_URL";
pub const ENV_STORAGE: &str = "AUTHKEEP_STORAGE";
pub const ENV_TIMEOUT: &str = "AUTHKEEP_TIMEOUT_SECS";

/// Where the session record is kept between runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" | "keychain" => Ok(Self::Keyring),
            "memory" | "none" => Ok(Self::Memory),
            other => Err(anyhow::anyhow!("Unknown storage backend: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub request_timeout_secs: u64,
    pub storage: StorageBackend,
    /// Seal the file backend with a key held in the OS keychain.
    pub encrypt_at_rest: bool,
    pub access_token_ttl_minutes: i64,
    pub refresh_buffer_minutes: i64,
    pub last_username: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            storage: StorageBackend::default(),
            encrypt_at_rest: false,
            access_token_ttl_minutes: DEFAULT_ACCESS_TOKEN_TTL_MINUTES,
            refresh_buffer_minutes: DEFAULT_REFRESH_BUFFER_MINUTES,
            last_username: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        if path.exists() {
            let contents = std::fs::read_to_string(&path).context("Failed to read config file")?;
            Ok(serde_json::from_str(&contents).context("Failed to parse config file")?)
        } else {
            Ok(Self::default())
        }
    }

    /// Load from disk, falling back to defaults, then apply the environment.
    pub fn load_or_default() -> Self {
        let mut config = match Self::load() {
            Ok(c) => c,
            Err(e) => {
                warn!(error = %e, "Failed to load config, using defaults");
                Self::default()
            }
        };
        config.apply_env(|key| std::env::var(key).ok());
        config
    }

    /// Apply `AUTHKEEP_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|u| !u.trim().is_empty()) {
            self.api_base_url = url.trim().to_string();
        }
        if let Some(raw) = lookup(ENV_STORAGE) {
            match raw.parse::<StorageBackend>() {
                Ok(backend) => self.storage = backend,
                Err(e) => warn!(error = %e, "Ignoring storage override, keeping {:?}", self.storage),
            }
        }
        if let Some(raw) = lookup(ENV_TIMEOUT) {
            match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => self.request_timeout_secs = secs,
                _ => warn!(value = %raw, "Invalid request timeout, ignoring"),
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the session record and logs.
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    pub fn access_token_ttl(&self) -> Duration {
        minutes_or_default(self.access_token_ttl_minutes, DEFAULT_ACCESS_TOKEN_TTL_MINUTES)
    }

    pub fn refresh_buffer(&self) -> Duration {
        minutes_or_default(self.refresh_buffer_minutes, DEFAULT_REFRESH_BUFFER_MINUTES)
    }
}

/// Negative or out-of-range values fall back to `default`.
fn minutes_or_default(minutes: i64, default: i64) -> Duration {
    match Duration::try_minutes(minutes) {
        Some(duration) if minutes >= 0 => duration,
        _ => {
            warn!(minutes, default, "Token lifetime setting out of range, using default");
            Duration::minutes(default)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout_secs, 30);
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.access_token_ttl(), Duration::minutes(30));
        assert_eq!(config.refresh_buffer(), Duration::minutes(5));
    }

    #[test]
    fn test_partial_config_file_fills_defaults() {
        let config: Config = serde_json::from_str(r#"{"storage": "keyring"}"#).unwrap();
        assert_eq!(config.storage, StorageBackend::Keyring);
        assert_eq!(config.api_base_url, "http://localhost:8000");
    }

    #[test]
    fn test_apply_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            (ENV_API_URL, "https://auth.example.com "),
            (ENV_STORAGE, "memory"),
            (ENV_TIMEOUT, "10"),
        ]));
        assert_eq!(config.api_base_url, "https://auth.example.com");
        assert_eq!(config.storage, StorageBackend::Memory);
        assert_eq!(config.request_timeout_secs, 10);
    }

    #[test]
    fn test_apply_env_ignores_bad_values() {
        let mut config = Config::default();
        config.apply_env(env(&[(ENV_API_URL, ""), (ENV_STORAGE, "floppy"), (ENV_TIMEOUT, "0")]));
        assert_eq!(config.api_base_url, "http://localhost:8000");
        assert_eq!(config.storage, StorageBackend::File);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_out_of_range_lifetimes_fall_back_to_defaults() {
        let config: Config = serde_json::from_str(
            r#"{"access_token_ttl_minutes": 9223372036854775807, "refresh_buffer_minutes": -5}"#,
        )
        .unwrap();
        assert_eq!(config.access_token_ttl(), Duration::minutes(30));
        assert_eq!(config.refresh_buffer(), Duration::minutes(5));

        let config = Config {
            access_token_ttl_minutes: 60,
            refresh_buffer_minutes: 0,
            ..Config::default()
        };
        assert_eq!(config.access_token_ttl(), Duration::minutes(60));
        assert_eq!(config.refresh_buffer(), Duration::zero());
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("File".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("keychain".parse::<StorageBackend>().unwrap(), StorageBackend::Keyring);
        assert_eq!(" none ".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("s3".parse::<StorageBackend>().is_err());
    }
}
