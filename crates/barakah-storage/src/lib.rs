//! Storage abstraction for barakah.
//!
//! Backend crates (e.g., barakah-store-sqlite) implement [`Store`] and
//! [`IdentityProvider`] so `barakah-core` doesn't depend on any specific
//! database engine or identity vendor.

mod identity;
mod store;
pub mod types;

pub use identity::*;
pub use store::*;
pub use types::*;

use thiserror::Error;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}

/// Normalise an email address into the key used by the OTP and reset collections.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}
