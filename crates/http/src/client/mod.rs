//! Storefront API client
//!
//! [`ApiClient`] attaches the stored access token to each request. When the
//! backend answers 401 it refreshes the credential once, shared across every
//! request that failed in the meantime, and replays them with the new token.

pub mod auth;
pub mod error;
pub mod refresh;

use crate::credentials::CredentialStore;
use crate::types::{RefreshRequest, RefreshResponse};
pub use error::{ClientError, RefreshError};
use refresh::{RefreshCoordinator, RefreshTicket};
use reqwest::{Client, ClientBuilder, Method, StatusCode, header};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

/// Path of the credential refresh endpoint
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Endpoints whose 401 means "wrong credentials" rather than "expired session"
const CREDENTIAL_PATHS: &[&str] = &["/auth/login", "/auth/register"];

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_USER_AGENT: &str = concat!("storefront-client/", env!("CARGO_PKG_VERSION"));

/// Callback invoked when the session ends and the user must sign in again
pub type SessionExpiredHook = Arc<dyn Fn() + Send + Sync>;

/// Storefront API client
///
/// Clones share the credential store and the refresh state.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: CredentialStore,
    refresh: Arc<RefreshCoordinator>,
    on_session_expired: Option<SessionExpiredHook>,
}

impl ApiClient {
    /// Create a new client with in-memory credentials and default settings
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        Self::builder().base_url(base_url).build()
    }

    /// Create a new client builder
    pub fn builder() -> ApiClientBuilder {
        ApiClientBuilder::default()
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The credential store shared by this client
    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    /// Whether a credential refresh is in flight
    pub fn is_refreshing(&self) -> bool {
        self.refresh.is_refreshing()
    }

    /// Issue a request and decode the JSON response.
    ///
    /// The stored access token is attached as a bearer credential. A 401 is
    /// recovered once through the shared refresh; any other status, or a second
    /// 401 after the replay, is returned to the caller.
    ///
    /// # Errors
    ///
    /// Returns transport errors, non-success statuses mapped through
    /// [`ClientError::from_status`], refresh failures, and decode errors.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<Value>,
    ) -> Result<T, ClientError> {
        let token = self.credentials.access_token();
        let response = self
            .send(method.clone(), path, body.as_ref(), token.as_deref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return Self::decode(response).await;
        }

        if is_refresh_path(path) {
            warn!(path, "refresh endpoint rejected the credential");
            self.end_session();
            return Err(Self::into_error(response).await);
        }

        if is_credential_path(path) {
            return Err(Self::into_error(response).await);
        }

        info!(%method, path, "received 401, recovering credential");
        let fresh = self.recover(token.as_deref()).await?;

        debug!(%method, path, "replaying request with refreshed credential");
        let replay = self.send(method, path, body.as_ref(), Some(&fresh)).await?;
        if replay.status() == StatusCode::UNAUTHORIZED {
            warn!(path, "replayed request rejected again, ending session");
            self.end_session();
            return Err(Self::into_error(replay).await);
        }

        Self::decode(replay).await
    }

    /// `GET` a path
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::GET, path, None).await
    }

    /// `POST` a JSON body
    pub async fn post<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::POST, path, Some(body)).await
    }

    /// `PATCH` a JSON body
    pub async fn patch<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let body = serde_json::to_value(body)?;
        self.request(Method::PATCH, path, Some(body)).await
    }

    /// `DELETE` a path
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        self.request(Method::DELETE, path, None).await
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = self.client.request(method, self.url(path));
        if let Some(token) = token {
            request = request.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Obtain a usable access token after a 401 on a request that carried
    /// `sent`, refreshing if no other request already is.
    async fn recover(&self, sent: Option<&str>) -> Result<String, ClientError> {
        match self.refresh.begin(sent, || self.credentials.access_token()) {
            RefreshTicket::Replay(token) => Ok(token),
            RefreshTicket::Wait(rx) => match rx.await {
                Ok(outcome) => outcome.map_err(ClientError::from),
                Err(_) => Err(RefreshError::Abandoned.into()),
            },
            RefreshTicket::Lead(lease) => {
                let outcome = self.refresh_credentials().await;
                match &outcome {
                    Ok(_) => lease.settle(&outcome),
                    Err(e) if e.is_terminal() => {
                        self.clear_credentials();
                        lease.settle(&outcome);
                        self.signal_session_expired();
                    }
                    Err(_) => lease.settle(&outcome),
                }
                outcome.map_err(ClientError::from)
            }
        }
    }

    /// Exchange the stored refresh token for a new pair and persist it.
    async fn refresh_credentials(&self) -> Result<String, RefreshError> {
        let Some(refresh_token) = self.credentials.refresh_token() else {
            warn!("no refresh token stored, cannot refresh");
            return Err(RefreshError::MissingRefreshToken);
        };

        info!("attempting to refresh access token");
        let response = self
            .client
            .post(self.url(REFRESH_PATH))
            .json(&RefreshRequest { refresh_token })
            .send()
            .await
            .map_err(|e| {
                error!(error = %e, "token refresh request failed");
                RefreshError::Transport(e.to_string())
            })?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            warn!(status = status.as_u16(), "refresh token rejected");
            return Err(RefreshError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            error!(status = status.as_u16(), "token refresh failed");
            return Err(RefreshError::Failed {
                status: status.as_u16(),
            });
        }

        let tokens = response
            .json::<RefreshResponse>()
            .await
            .ok()
            .and_then(RefreshResponse::into_pair)
            .ok_or_else(|| {
                warn!("refresh response did not contain both tokens");
                RefreshError::InvalidResponse
            })?;

        self.credentials.store_tokens(&tokens).map_err(|e| {
            error!(error = %e, "could not store refreshed tokens");
            RefreshError::Storage(e.to_string())
        })?;

        info!("token refresh successful");
        Ok(tokens.access_token)
    }

    fn clear_credentials(&self) {
        if let Err(e) = self.credentials.clear_session() {
            error!(error = %e, "failed to clear stored credentials");
        }
    }

    fn signal_session_expired(&self) {
        info!("session expired, redirecting to login");
        if let Some(hook) = &self.on_session_expired {
            hook();
        }
    }

    fn end_session(&self) {
        self.clear_credentials();
        self.signal_session_expired();
    }

    async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if !status.is_success() {
            return Err(Self::into_error(response).await);
        }

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            Ok(serde_json::from_slice(b"null")?)
        } else {
            Ok(serde_json::from_slice(&bytes)?)
        }
    }

    async fn into_error(response: reqwest::Response) -> ClientError {
        let status = response.status();
        let message = response.text().await.unwrap_or_else(|_| status.to_string());
        ClientError::from_status(status, message)
    }
}

fn path_only(path: &str) -> &str {
    path.split(['?', '#']).next().unwrap_or(path)
}

fn is_refresh_path(path: &str) -> bool {
    path_only(path) == REFRESH_PATH
}

fn is_credential_path(path: &str) -> bool {
    CREDENTIAL_PATHS.contains(&path_only(path))
}

/// Builder for ApiClient
#[derive(Default)]
pub struct ApiClientBuilder {
    base_url: Option<String>,
    timeout: Option<Duration>,
    user_agent: Option<String>,
    credentials: Option<CredentialStore>,
    on_session_expired: Option<SessionExpiredHook>,
}

impl ApiClientBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Use the given credential store instead of an in-memory one
    pub fn credentials(mut self, credentials: CredentialStore) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Called when the session ends: the refresh token was rejected or
    /// missing, or a replayed request was rejected again.
    pub fn on_session_expired(mut self, hook: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(hook));
        self
    }

    /// Build the client
    pub fn build(self) -> Result<ApiClient, ClientError> {
        let base_url = self
            .base_url
            .ok_or_else(|| ClientError::Configuration("base_url is required".into()))?;

        // Ensure base_url ends without a trailing slash
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::Configuration("base_url is empty".into()));
        }

        let client = ClientBuilder::new()
            .timeout(self.timeout.unwrap_or(DEFAULT_TIMEOUT))
            .user_agent(
                self.user_agent
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .build()?;

        Ok(ApiClient {
            client,
            base_url,
            credentials: self.credentials.unwrap_or_else(CredentialStore::in_memory),
            refresh: Arc::new(RefreshCoordinator::new()),
            on_session_expired: self.on_session_expired,
        })
    }
}
