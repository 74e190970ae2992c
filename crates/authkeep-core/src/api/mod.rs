//! Client side of the remote authentication service.
//!
//! `AuthApi` is the seam the session manager talks through; `HttpAuthApi`
//! implements it over HTTP with bearer-token authentication. Tests swap in
//! scripted implementations.

pub mod client;
pub mod error;

use async_trait::async_trait;
use serde::Deserialize;

use crate::models::{RegisterData, User};

pub use client::HttpAuthApi;
pub use error::ApiError;

/// Tokens minted by a successful login.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// New access token minted from a refresh token.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Remote operations of the authentication service.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError>;

    /// Revoke `refresh_token`, authenticating with `access_token`.
    async fn logout(&self, access_token: &str, refresh_token: &str) -> Result<(), ApiError>;

    async fn register(&self, data: &RegisterData) -> Result<User, ApiError>;

    async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ApiError>;

    async fn current_user(&self, access_token: &str) -> Result<User, ApiError>;

    async fn change_password(
        &self,
        access_token: &str,
        current_password: &str,
        new_password: &str,
    ) -> Result<(), ApiError>;
}
