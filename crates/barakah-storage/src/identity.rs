//! Identity provider abstraction (accounts, passwords, sessions).

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::UserId;

/// Errors surfaced by an identity provider.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("user not found")]
    NotFound,
    #[error("email already in use")]
    EmailInUse,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("identity backend error: {0}")]
    Backend(String),
}

/// Account as seen by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityUser {
    pub id: UserId,
    pub email: String,
    pub display_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Authenticated session handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
}

/// Account management operations the core needs from an identity provider.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Create an account with email + password.
    async fn create_user(&self, email: &str, password: &str)
        -> Result<IdentityUser, IdentityError>;

    /// Check email + password without opening a session.
    async fn verify_credentials(
        &self,
        email: &str,
        password: &str,
    ) -> Result<IdentityUser, IdentityError>;

    /// Open a session for an account whose sign-in has fully completed.
    async fn open_session(&self, user_id: &UserId) -> Result<Session, IdentityError>;

    /// Close a session (no-op if already closed).
    async fn sign_out(&self, session_token: &str) -> Result<(), IdentityError>;

    /// Look an account up by email.
    async fn get_user_by_email(&self, email: &str) -> Result<IdentityUser, IdentityError>;

    /// Set the account's display name.
    async fn update_display_name(&self, user_id: &UserId, name: &str)
        -> Result<(), IdentityError>;

    /// Privileged password update that does not require the old password.
    async fn admin_update_password(
        &self,
        user_id: &UserId,
        new_password: &str,
    ) -> Result<(), IdentityError>;

    /// Delete an account and all of its sessions.
    async fn delete_user(&self, user_id: &UserId) -> Result<(), IdentityError>;
}
