//! Account registration and two-step sign-in.

use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditLog, AuditResult};
use barakah_storage::{
    normalize_email, CreateProfileParams, IdentityError, IdentityProvider, OtpPurpose, Session,
    Store, UserId,
};
use std::sync::Arc;
use thiserror::Error;

use crate::otp::{OtpEngine, OtpError, SentCode, VerificationOutcome};
use crate::upstream::{bounded, UpstreamError};
use crate::validate::{is_valid_email, is_valid_password, MIN_PASSWORD_LEN};

#[derive(Debug, Error)]
pub enum RegistrationError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("full name is required")]
    MissingName,
    #[error("password must be at least {min_len} characters")]
    WeakPassword { min_len: usize },
    #[error("an account with this email already exists")]
    EmailInUse,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error(transparent)]
    Otp(#[from] OtpError),
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

#[derive(Clone, Debug)]
pub struct Registered {
    pub user_id: UserId,
    pub code: SentCode,
}

/// First step of sign-in: credentials accepted, Login code sent. No session
/// exists yet.
#[derive(Clone, Debug)]
pub struct SignInChallenge {
    pub user_id: UserId,
    pub code: SentCode,
}

/// Second step of sign-in. `session` is only set when the code was accepted.
#[derive(Clone, Debug)]
pub struct SignInConfirmation {
    pub outcome: VerificationOutcome,
    pub session: Option<Session>,
}

#[derive(Clone)]
pub struct Registration {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn Store>,
    otp: OtpEngine,
    audit: Arc<dyn AuditLog>,
}

impl Registration {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn Store>,
        otp: OtpEngine,
        audit: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            identity,
            store,
            otp,
            audit,
        }
    }

    fn timeout(&self) -> std::time::Duration {
        self.otp.policy().upstream_timeout
    }

    /// Create the account and profile, then send a SignUp code.
    ///
    /// If the profile cannot be written the identity account is deleted again.
    pub async fn register(
        &self,
        full_name: &str,
        email: &str,
        password: &str,
    ) -> Result<Registered, RegistrationError> {
        let email = normalize_email(email);
        let full_name = full_name.trim();
        if !is_valid_email(&email) {
            return Err(RegistrationError::InvalidEmail);
        }
        if full_name.is_empty() {
            return Err(RegistrationError::MissingName);
        }
        if !is_valid_password(password) {
            return Err(RegistrationError::WeakPassword {
                min_len: MIN_PASSWORD_LEN,
            });
        }

        let user = match bounded(
            self.timeout(),
            "identity",
            self.identity.create_user(&email, password),
        )
        .await
        {
            Ok(user) => user,
            Err(UpstreamError::Identity(IdentityError::EmailInUse)) => {
                return Err(RegistrationError::EmailInUse)
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.write_profile(&user.id, full_name, &email).await {
            self.roll_back(&user.id, &email, &e).await;
            return Err(e.into());
        }

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::builder(&email, AuditAction::UserRegister)
                .user_id(Some(&user.id))
                .resource("user", user.id.to_string())
                .build(),
        )
        .await;
        tracing::info!(user_id = %user.id, "user registered");

        let code = self.otp.send_code(&email, OtpPurpose::SignUp).await?;
        Ok(Registered {
            user_id: user.id,
            code,
        })
    }

    async fn write_profile(
        &self,
        user_id: &UserId,
        full_name: &str,
        email: &str,
    ) -> Result<(), UpstreamError> {
        bounded(
            self.timeout(),
            "identity",
            self.identity.update_display_name(user_id, full_name),
        )
        .await?;
        let params = CreateProfileParams {
            user_id: user_id.clone(),
            full_name: full_name.to_string(),
            email: email.to_string(),
        };
        bounded(self.timeout(), "store", self.store.create_profile(&params)).await?;
        Ok(())
    }

    async fn roll_back(&self, user_id: &UserId, email: &str, cause: &UpstreamError) {
        tracing::warn!(user_id = %user_id, error = %cause, "profile write failed, deleting identity");
        let deleted = bounded(
            self.timeout(),
            "identity",
            self.identity.delete_user(user_id),
        )
        .await;
        let result = match &deleted {
            Ok(()) => AuditResult::Success,
            Err(e) => {
                tracing::error!(user_id = %user_id, error = %e, "orphaned identity left behind");
                AuditResult::Error
            }
        };
        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::builder(email, AuditAction::UserRegisterRollback)
                .user_id(Some(user_id))
                .resource("user", user_id.to_string())
                .result(result)
                .reason(cause.to_string())
                .build(),
        )
        .await;
    }

    /// Verify the SignUp code and mark the profile's email as verified.
    pub async fn confirm_sign_up(
        &self,
        email: &str,
        code: &str,
    ) -> Result<VerificationOutcome, RegistrationError> {
        let outcome = self.otp.verify_code(email, code, OtpPurpose::SignUp).await;
        if outcome.is_success() {
            let email = normalize_email(email);
            let profile = bounded(
                self.timeout(),
                "store",
                self.store.get_profile_by_email(&email),
            )
            .await?;
            bounded(
                self.timeout(),
                "store",
                self.store.mark_email_verified(&profile.id),
            )
            .await?;
            tracing::info!(user_id = %profile.id, "email verified");
        }
        Ok(outcome)
    }

    /// Check credentials and send a Login code. The session is opened by
    /// [`Registration::confirm_sign_in`].
    pub async fn sign_in(
        &self,
        email: &str,
        password: &str,
    ) -> Result<SignInChallenge, RegistrationError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(RegistrationError::InvalidEmail);
        }

        let user = match bounded(
            self.timeout(),
            "identity",
            self.identity.verify_credentials(&email, password),
        )
        .await
        {
            Ok(user) => user,
            Err(UpstreamError::Identity(IdentityError::InvalidCredentials))
            | Err(UpstreamError::Identity(IdentityError::NotFound)) => {
                record_best_effort(
                    self.audit.as_ref(),
                    AuditEvent::builder(&email, AuditAction::UserSignIn)
                        .resource("user", &email)
                        .result(AuditResult::InvalidRequest)
                        .build(),
                )
                .await;
                return Err(RegistrationError::InvalidCredentials);
            }
            Err(e) => return Err(e.into()),
        };

        let code = self.otp.send_code(&email, OtpPurpose::Login).await?;
        Ok(SignInChallenge {
            user_id: user.id,
            code,
        })
    }

    /// Verify the Login code and, only if it is accepted, open the session.
    pub async fn confirm_sign_in(
        &self,
        email: &str,
        code: &str,
    ) -> Result<SignInConfirmation, RegistrationError> {
        let outcome = self.otp.verify_code(email, code, OtpPurpose::Login).await;
        if !outcome.is_success() {
            return Ok(SignInConfirmation {
                outcome,
                session: None,
            });
        }

        let email = normalize_email(email);
        let user = bounded(
            self.timeout(),
            "identity",
            self.identity.get_user_by_email(&email),
        )
        .await?;
        let session = bounded(
            self.timeout(),
            "identity",
            self.identity.open_session(&user.id),
        )
        .await?;

        record_best_effort(
            self.audit.as_ref(),
            AuditEvent::builder(&email, AuditAction::UserSignIn)
                .user_id(Some(&user.id))
                .resource("user", user.id.to_string())
                .build(),
        )
        .await;
        tracing::info!(user_id = %user.id, "sign-in completed");

        Ok(SignInConfirmation {
            outcome,
            session: Some(session),
        })
    }

    pub async fn sign_out(&self, session_token: &str) -> Result<(), RegistrationError> {
        bounded(
            self.timeout(),
            "identity",
            self.identity.sign_out(session_token),
        )
        .await?;
        Ok(())
    }
}
