//! HTTP implementation of [`AuthApi`].
//!
//! All endpoints live under `/auth` on the configured base URL and speak
//! JSON. Authenticated endpoints take the access token as a bearer
//! credential.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{header, Client};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::json;
use tracing::debug;

use crate::config::Config;
use crate::models::{RegisterData, User};

use super::{ApiError, AuthApi, LoginResponse, RefreshResponse};

// ============================================================================
// Constants
// ============================================================================

/// Default HTTP request timeout in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

const LOGIN_PATH: &str = "/auth/login";
const LOGOUT_PATH: &str = "/auth/logout";
const REGISTER_PATH: &str = "/auth/register";
const REFRESH_PATH: &str = "/auth/refresh";
const ME_PATH: &str = "/auth/me";
const CHANGE_PASSWORD_PATH: &str = "/auth/change-password";

/// Auth service client.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    /// Create a client for the service rooted at `base_url`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(
            &config.api_base_url,
            Duration::from_secs(config.request_timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check if response is successful, returning an error with body if not.
    async fn check_response(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        if response.status().is_success() {
            Ok(response)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "Auth service rejected request");
            Err(ApiError::from_status(status, &body))
        }
    }

    async fn parse_json<T: DeserializeOwned>(response: reqwest::Response, what: &str) -> Result<T, ApiError> {
        let text = response.text().await?;
        serde_json::from_str(&text)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse {} response: {}", what, e)))
    }

    async fn post_json<B: Serialize + ?Sized>(
        &self,
        path: &str,
        bearer: Option<&str>,
        body: &B,
    ) -> Result<reqwest::Response, ApiError> {
        let mut request = self
            .client
            .post(self.url(path))
            .header(header::ACCEPT, "application/json")
            .json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        Self::check_response(response).await
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = json!({ "username": username, "password": password });
        let response = self.post_json(LOGIN_PATH, None, &body).await?;
        let tokens: LoginResponse = Self::parse_json(response, "login").await?;
        if tokens.access_token.is_empty() || tokens.refresh_token.is_empty() {
            return Err(ApiError::InvalidResponse("Login response held an empty token".to_string()));
        }
        Ok(tokens)
    }

    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), ApiError> {
        let body = json!({ "refresh_token": refresh_token });
        self.post_json(LOGOUT_PATH, Some(access_token), &body).await?;
        Ok(())
    }

    async fn register(&self, data: &RegisterData) -> Result<User, ApiError> {
        let response = self.post_json(REGISTER_PATH, None, data).await?;
        Self::parse_json(response, "register").await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError> {
        let body = json!({ "refresh_token": refresh_token });
        let response = self.post_json(REFRESH_PATH, None, &body).await?;
        let renewed: RefreshResponse = Self::parse_json(response, "refresh").await?;
        if renewed.access_token.is_empty() {
            return Err(ApiError::InvalidResponse("Refresh response held an empty token".to_string()));
        }
        Ok(renewed)
    }

    async fn current_user(&self, access_token: &str) -> Result<User, ApiError> {
        let response = self
            .client
            .get(self.url(ME_PATH))
            .header(header::ACCEPT, "application/json")
            .bearer_auth(access_token)
            .send()
            .await?;
        let response = Self::check_response(response).await?;
        Self::parse_json(response, "current user").await
    }

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError> {
        let body = json!({
            "current_password": current_password,
            "new_password": new_password,
        });
        self.post_json(CHANGE_PASSWORD_PATH, Some(access_token), &body).await?;
        Ok(())
    }
}
