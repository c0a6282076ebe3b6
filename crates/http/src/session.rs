//! Session lifecycle on top of the auth endpoints
//!
//! [`Session`] persists what the auth endpoints return: credentials go to both
//! storage layers and the user profile to the durable layer, so the next
//! request (or the next process) sees them.

use crate::client::{ApiClient, ClientError};
use crate::types::{AuthResponse, LoginRequest, RegisterRequest, User};

#[derive(Clone)]
pub struct Session {
    client: ApiClient,
}

impl Session {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }

    pub fn client(&self) -> &ApiClient {
        &self.client
    }

    /// Sign in and persist the issued credentials and profile.
    ///
    /// # Errors
    ///
    /// Returns the backend rejection or a storage failure.
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ClientError> {
        let request = LoginRequest {
            email: email.to_string(),
            password: password.to_string(),
        };
        let response = self.client.login(&request).await?;
        info!(user_id = %response.user.id, "signed in");
        self.persist(response)
    }

    /// Create an account and persist the issued credentials and profile.
    ///
    /// # Errors
    ///
    /// Returns the backend rejection or a storage failure.
    pub async fn register(&self, request: &RegisterRequest) -> Result<User, ClientError> {
        let response = self.client.register(request).await?;
        info!(user_id = %response.user.id, "registered");
        self.persist(response)
    }

    /// Sign out. Local credentials are cleared even if the backend call fails.
    ///
    /// # Errors
    ///
    /// Returns an error only if the local credentials could not be cleared.
    pub async fn logout(&self) -> Result<(), ClientError> {
        if let Err(e) = self.client.logout().await {
            warn!(error = %e, "backend logout failed, clearing local session anyway");
        }
        self.client.credentials().clear_session()?;
        info!("signed out");
        Ok(())
    }

    /// Confirm the stored session against the backend.
    ///
    /// Returns `None` without a network call when no access token or profile
    /// is stored, and `None` when the backend no longer accepts the session.
    ///
    /// # Errors
    ///
    /// Returns errors other than an expired session.
    pub async fn check(&self) -> Result<Option<User>, ClientError> {
        let credentials = self.client.credentials();
        if credentials.access_token().is_none() || credentials.user().is_none() {
            debug!("no stored session to check");
            return Ok(None);
        }

        match self.client.profile().await {
            Ok(user) => {
                credentials.store_user(&user)?;
                Ok(Some(user))
            }
            Err(e) if e.is_auth_expired() => {
                debug!(error = %e, "stored session is no longer valid");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Profile stored by the last sign-in or check
    pub fn current_user(&self) -> Option<User> {
        self.client.credentials().user()
    }

    fn persist(&self, response: AuthResponse) -> Result<User, ClientError> {
        let credentials = self.client.credentials();
        credentials.store_tokens(&response.tokens())?;
        credentials.store_user(&response.user)?;
        Ok(response.user)
    }
}
