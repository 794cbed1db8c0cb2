//! The Store trait that backends implement.

use chrono::{DateTime, Utc};

use crate::types::*;
use crate::StoreError;

/// The document store `barakah-core` depends on.
///
/// OTP records and reset tokens are keyed by the lowercased email address;
/// callers normalise before calling in.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────────── Users ──────────────────────────────────────────

    /// Create the profile document for a freshly created identity.
    async fn create_profile(&self, params: &CreateProfileParams)
        -> Result<UserProfile, StoreError>;

    /// Get profile by user ID.
    async fn get_profile(&self, user_id: &UserId) -> Result<UserProfile, StoreError>;

    /// Get profile by email.
    async fn get_profile_by_email(&self, email: &str) -> Result<UserProfile, StoreError>;

    /// Mark the profile's email as verified (email ownership confirmed).
    async fn mark_email_verified(&self, user_id: &UserId) -> Result<(), StoreError>;

    // ───────────────────────────────────── OTP Verifications ──────────────────────────────

    /// Create or overwrite the OTP for `params.email`.
    async fn upsert_otp(&self, params: &UpsertOtpParams) -> Result<OtpRecord, StoreError>;

    /// Get the OTP for an email address.
    async fn get_otp(&self, email: &str) -> Result<OtpRecord, StoreError>;

    /// Flip `verified` to true, in one write that also requires the record to
    /// still hold `code`, be unverified, be unexpired at `now` and have fewer
    /// than `max_attempts` failures. Fails with `Conflict` when any of those
    /// no longer holds.
    async fn mark_otp_verified(
        &self,
        email: &str,
        code: &str,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    /// Increment the failed attempts counter unless the record is verified or
    /// already at `max_attempts` (then `Conflict`).
    /// Returns the new attempts count.
    async fn increment_otp_attempts(&self, email: &str, max_attempts: u32)
        -> Result<u32, StoreError>;

    /// Delete the OTP for an email address (no-op if absent).
    async fn delete_otp(&self, email: &str) -> Result<(), StoreError>;

    /// One page of OTPs created strictly before `created_before`, ordered by email.
    /// `after` is the last email of the previous page.
    async fn list_otps_created_before(
        &self,
        created_before: DateTime<Utc>,
        after: Option<String>,
        limit: u32,
    ) -> Result<Vec<OtpRecord>, StoreError>;

    /// Batch delete OTPs by email.
    /// Returns the number of deleted records.
    async fn delete_otps(&self, emails: &[String]) -> Result<u64, StoreError>;

    // ───────────────────────────────────── Password Reset Tokens ──────────────────────────

    /// Create or overwrite the reset token for an email address.
    async fn upsert_reset_token(&self, token: &PasswordResetToken) -> Result<(), StoreError>;

    /// Get the reset token for an email address.
    async fn get_reset_token(&self, email: &str) -> Result<PasswordResetToken, StoreError>;

    /// Delete the reset token for an email address (no-op if absent).
    async fn delete_reset_token(&self, email: &str) -> Result<(), StoreError>;

    /// One page of tokens created strictly before `created_before`, ordered by email.
    async fn list_reset_tokens_created_before(
        &self,
        created_before: DateTime<Utc>,
        after: Option<String>,
        limit: u32,
    ) -> Result<Vec<PasswordResetToken>, StoreError>;

    /// Batch delete reset tokens by email.
    /// Returns the number of deleted records.
    async fn delete_reset_tokens(&self, emails: &[String]) -> Result<u64, StoreError>;

    // ───────────────────────────────────── Transactions ───────────────────────────────────

    /// Whether a transaction with this source id was already ingested for the user.
    async fn transaction_exists(
        &self,
        user_id: &UserId,
        source_transaction_id: &str,
    ) -> Result<bool, StoreError>;

    /// Insert a transaction. Fails with `AlreadyExists` on a duplicate dedup key.
    async fn insert_transaction(
        &self,
        params: &CreateTransactionParams,
    ) -> Result<TransactionRecord, StoreError>;

    /// List a user's transactions, newest first.
    async fn list_transactions(&self, user_id: &UserId)
        -> Result<Vec<TransactionRecord>, StoreError>;
}
