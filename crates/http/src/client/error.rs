//! Client error types

use storefront_core::CoreError;
use thiserror::Error;

/// Client error types
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or request error
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Server returned an error status
    #[error("Server error {status}: {message}")]
    ServerError { status: u16, message: String },

    /// Authentication failed and cannot be recovered by a refresh
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Resource not found
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Bad request
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Forbidden
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// The credential refresh failed
    #[error("Token refresh failed: {0}")]
    Refresh(#[from] RefreshError),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential storage error
    #[error("Credential storage error: {0}")]
    Storage(#[from] CoreError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Configuration(String),
}

impl ClientError {
    /// Create error from HTTP status code
    pub fn from_status(status: reqwest::StatusCode, message: String) -> Self {
        match status.as_u16() {
            400 => Self::BadRequest(message),
            401 => Self::AuthenticationFailed(message),
            403 => Self::Forbidden(message),
            404 => Self::NotFound(message),
            _ => Self::ServerError {
                status: status.as_u16(),
                message,
            },
        }
    }

    /// Whether this error means the session is gone and the user must sign in
    pub fn is_auth_expired(&self) -> bool {
        match self {
            Self::AuthenticationFailed(_) => true,
            Self::Refresh(e) => e.is_terminal(),
            _ => false,
        }
    }
}

/// Failure of the credential refresh flow
///
/// Cloneable so a single failure can be delivered to every request queued
/// behind the refresh.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RefreshError {
    /// No refresh token is stored
    #[error("no refresh token available")]
    MissingRefreshToken,

    /// The backend rejected the refresh token
    #[error("refresh token rejected with status {status}")]
    Rejected { status: u16 },

    /// The refresh response lacked one of the tokens
    #[error("refresh response did not contain both tokens")]
    InvalidResponse,

    /// The refresh endpoint answered with a non-auth error status
    #[error("refresh endpoint returned status {status}")]
    Failed { status: u16 },

    /// The refresh request never got a response
    #[error("refresh request failed: {0}")]
    Transport(String),

    /// The new tokens could not be persisted
    #[error("could not store refreshed tokens: {0}")]
    Storage(String),

    /// The refreshing request was dropped before the refresh settled
    #[error("refresh abandoned before completion")]
    Abandoned,
}

impl RefreshError {
    /// Terminal failures end the session: credentials are cleared and the
    /// application is sent to the login entry point.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::MissingRefreshToken | Self::Rejected { .. } | Self::InvalidResponse
        )
    }
}
