//! Password reset: verified ForgotPassword code -> reset token -> new password.

use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditLog, AuditResult};
use barakah_storage::{
    normalize_email, IdentityProvider, OtpPurpose, PasswordResetToken, Store, UserId,
};
use chrono::Duration;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::clock::Clock;
use crate::code::generate_reset_token;
use crate::otp::{OtpEngine, VerificationOutcome};
use crate::upstream::{bounded, UpstreamError};
use crate::validate::{is_valid_email, is_valid_password, MIN_PASSWORD_LEN};

/// How long an issued reset token stays usable.
pub const RESET_TOKEN_TTL: Duration = Duration::minutes(15);

#[derive(Debug, Error)]
pub enum ResetError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },
    #[error("no reset token found; verify your code again")]
    TokenNotFound,
    #[error("reset token does not match")]
    TokenMismatch,
    #[error("reset token has expired; request a new code")]
    Expired,
    #[error("the reset code has not been verified")]
    NotVerified,
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Result of [`PasswordResetFlow::verify_reset_code`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResetCodeOutcome {
    TokenIssued(String),
    NotVerified(VerificationOutcome),
}

#[derive(Clone)]
pub struct PasswordResetFlow {
    store: Arc<dyn Store>,
    identity: Arc<dyn IdentityProvider>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    otp: OtpEngine,
    token_ttl: Duration,
}

impl PasswordResetFlow {
    pub fn new(
        store: Arc<dyn Store>,
        identity: Arc<dyn IdentityProvider>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        otp: OtpEngine,
    ) -> Self {
        Self {
            store,
            identity,
            audit,
            clock,
            otp,
            token_ttl: RESET_TOKEN_TTL,
        }
    }

    fn timeout(&self) -> std::time::Duration {
        self.otp.policy().upstream_timeout
    }

    /// Issue a token for an address whose ForgotPassword code is verified.
    pub async fn issue_reset_token(&self, email: &str) -> Result<String, ResetError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ResetError::InvalidEmail);
        }

        let record = match self.otp.current_record(&email).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => return Err(ResetError::NotVerified),
            Err(e) => return Err(e.into()),
        };
        if record.purpose != OtpPurpose::ForgotPassword || !record.verified {
            return Err(ResetError::NotVerified);
        }

        let token = PasswordResetToken {
            email: email.clone(),
            token: generate_reset_token(),
            created_at: self.clock.now(),
        };
        bounded(
            self.timeout(),
            "store",
            self.store.upsert_reset_token(&token),
        )
        .await?;

        tracing::info!("password reset token issued");
        self.audit(
            &email,
            None,
            AuditAction::PasswordResetIssue,
            AuditResult::Success,
            None,
        )
        .await;
        Ok(token.token)
    }

    /// Verify a ForgotPassword code and, when it matches, issue the token.
    pub async fn verify_reset_code(
        &self,
        email: &str,
        code: &str,
    ) -> Result<ResetCodeOutcome, ResetError> {
        match self
            .otp
            .verify_code(email, code, OtpPurpose::ForgotPassword)
            .await
        {
            VerificationOutcome::Success => {
                Ok(ResetCodeOutcome::TokenIssued(self.issue_reset_token(email).await?))
            }
            other => Ok(ResetCodeOutcome::NotVerified(other)),
        }
    }

    /// Set a new password using a previously issued token. The token and the
    /// consumed code are removed on success.
    pub async fn reset_password(
        &self,
        email: &str,
        new_password: &str,
        token: &str,
    ) -> Result<(), ResetError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(ResetError::InvalidEmail);
        }
        if !is_valid_password(new_password) {
            return Err(ResetError::WeakPassword {
                min_len: MIN_PASSWORD_LEN,
            });
        }

        let stored = match bounded(self.timeout(), "store", self.store.get_reset_token(&email)).await
        {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => return Err(ResetError::TokenNotFound),
            Err(e) => return Err(self.upstream_failure(&email, e).await),
        };

        let matches: bool = stored.token.as_bytes().ct_eq(token.as_bytes()).into();
        if !matches {
            tracing::warn!("password reset attempted with mismatched token");
            self.audit(
                &email,
                None,
                AuditAction::PasswordResetComplete,
                AuditResult::InvalidRequest,
                Some("token mismatch".to_string()),
            )
            .await;
            return Err(ResetError::TokenMismatch);
        }

        if self.clock.now() - stored.created_at >= self.token_ttl {
            if let Err(e) = bounded(
                self.timeout(),
                "store",
                self.store.delete_reset_token(&email),
            )
            .await
            {
                tracing::warn!(error = %e, "failed to delete expired reset token");
            }
            self.audit(
                &email,
                None,
                AuditAction::PasswordResetComplete,
                AuditResult::Expired,
                None,
            )
            .await;
            return Err(ResetError::Expired);
        }

        let user = match bounded(
            self.timeout(),
            "identity",
            self.identity.get_user_by_email(&email),
        )
        .await
        {
            Ok(user) => user,
            Err(e) => return Err(self.upstream_failure(&email, e).await),
        };

        if let Err(e) = bounded(
            self.timeout(),
            "identity",
            self.identity.admin_update_password(&user.id, new_password),
        )
        .await
        {
            return Err(self.upstream_failure(&email, e).await);
        }

        // The password is already changed; leftovers are swept later.
        if let Err(e) = bounded(
            self.timeout(),
            "store",
            self.store.delete_reset_token(&email),
        )
        .await
        {
            tracing::warn!(error = %e, "failed to delete used reset token");
        }
        if let Err(e) = self.otp.discard(&email).await {
            tracing::warn!(error = %e, "failed to delete consumed otp");
        }

        tracing::info!(user_id = %user.id, "password reset completed");
        self.audit(
            &email,
            Some(&user.id),
            AuditAction::PasswordResetComplete,
            AuditResult::Success,
            None,
        )
        .await;
        Ok(())
    }

    async fn upstream_failure(&self, email: &str, e: UpstreamError) -> ResetError {
        tracing::error!(error = %e, "password reset failed upstream");
        self.audit(
            email,
            None,
            AuditAction::PasswordResetComplete,
            AuditResult::Error,
            Some(e.to_string()),
        )
        .await;
        ResetError::Upstream(e)
    }

    async fn audit(
        &self,
        email: &str,
        user_id: Option<&UserId>,
        action: AuditAction,
        result: AuditResult,
        reason: Option<String>,
    ) {
        let mut builder = AuditEvent::builder(email, action)
            .user_id(user_id)
            .resource("password_reset", email)
            .result(result);
        if let Some(reason) = reason {
            builder = builder.reason(reason);
        }
        record_best_effort(self.audit.as_ref(), builder.build()).await;
    }
}
