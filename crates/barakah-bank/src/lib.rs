//! Client for the bank-account aggregation API.
//!
//! The API is OAuth-shaped: the user authorises at a hosted connect page, the
//! returned code is exchanged for tokens with client credentials, and the
//! access token is then used as a bearer token for account and transaction
//! listing.

mod client;
mod types;

pub use client::{BankConfig, HttpBankClient};
pub use types::*;

use async_trait::async_trait;
use thiserror::Error;

/// Errors returned by the bank API client.
#[derive(Debug, Error)]
pub enum BankError {
    #[error("bank request failed: {0}")]
    Http(String),

    #[error("bank API returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("unexpected bank response: {0}")]
    Decode(String),

    #[error("invalid bank configuration: {0}")]
    InvalidConfig(String),
}

/// Operations the core needs from the aggregation API.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait BankClient: Send + Sync {
    /// URL of the hosted page where the user authorises access. `state` is echoed back.
    fn connect_url(&self, state: &str) -> Result<String, BankError>;

    /// Exchange an authorization code for an access/refresh token pair.
    async fn exchange_code(&self, code: &str) -> Result<TokenPair, BankError>;

    /// List the accounts the token grants access to.
    async fn list_accounts(&self, access_token: &str) -> Result<Vec<BankAccount>, BankError>;

    /// List transactions, optionally narrowed by account and date range.
    async fn list_transactions(
        &self,
        access_token: &str,
        filter: &TransactionFilter,
    ) -> Result<Vec<BankTransaction>, BankError>;
}
