//! External identity provider.
//!
//! The provider owns credentials and sessions; this service only creates
//! identities during registration and deletes them again when the local
//! insert fails.

pub mod clerk;

use std::time::Duration;

use async_trait::async_trait;
use bq_account_core::RemoteId;
use secrecy::SecretString;
use thiserror::Error;

pub use clerk::ClerkIdentityProvider;

/// Errors that can occur when calling the identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Provider returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The call did not finish within its time budget.
    #[error("identity provider call timed out after {0:?}")]
    Timeout(Duration),
}

/// Attributes of an identity to create.
#[derive(Debug, Clone)]
pub struct NewIdentity {
    pub email: String,
    pub username: String,
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
}

/// Identity Provider Port.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create a remote identity and return its provider-issued id.
    async fn create_identity(&self, identity: &NewIdentity) -> Result<RemoteId, IdentityError>;

    /// Delete a remote identity, giving up after `timeout`.
    async fn delete_identity(
        &self,
        remote_id: &RemoteId,
        timeout: Duration,
    ) -> Result<(), IdentityError>;
}
