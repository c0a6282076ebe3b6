//! Storefront HTTP client
//!
//! An API client for the storefront backend that attaches the stored bearer
//! credential to every request and recovers from expired credentials with a
//! single coordinated refresh. Also carries the credential store, the session
//! layer built on top of the auth endpoints, and route-level access control.

#[macro_use]
extern crate tracing;

pub mod access;
pub mod client;
pub mod credentials;
pub mod session;
pub mod types;

pub use access::{RouteClass, RouteDecision};
pub use client::{ApiClient, ApiClientBuilder, error::ClientError};
pub use credentials::CredentialStore;
pub use session::Session;
