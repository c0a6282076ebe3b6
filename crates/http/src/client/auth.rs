//! Authentication API client methods

use super::{ApiClient, ClientError, REFRESH_PATH};
use crate::types::{
    AuthResponse, LoginRequest, RefreshRequest, RefreshResponse, RegisterRequest, User,
};
use reqwest::Method;

impl ApiClient {
    /// Create an account
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ClientError> {
        self.post("/auth/register", request).await
    }

    /// Sign in with email and password
    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ClientError> {
        self.post("/auth/login", request).await
    }

    /// Exchange a refresh token for a new pair.
    ///
    /// Goes through [`ApiClient::request`], so a 401 here ends the session
    /// instead of scheduling another refresh.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshResponse, ClientError> {
        let request = RefreshRequest {
            refresh_token: refresh_token.to_string(),
        };
        self.post(REFRESH_PATH, &request).await
    }

    /// Invalidate the session on the backend
    pub async fn logout(&self) -> Result<(), ClientError> {
        let _: serde_json::Value = self.request(Method::POST, "/auth/logout", None).await?;
        Ok(())
    }

    /// Profile of the signed-in user
    pub async fn profile(&self) -> Result<User, ClientError> {
        self.get("/auth/profile").await
    }
}
