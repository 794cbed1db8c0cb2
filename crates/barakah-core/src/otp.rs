//! One-time passcode issuance, verification and lockout.
//!
//! One record per (lowercased) email address. Lockout is not stored: an
//! address is locked while its record has used up every attempt and the
//! record is younger than [`OtpPolicy::lock_duration`].

use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditLog, AuditResult};
use barakah_email::Mailer;
use barakah_storage::{normalize_email, OtpPurpose, OtpRecord, Store, StoreError, UpsertOtpParams};
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::clock::Clock;
use crate::code::generate_otp_code;
use crate::upstream::{bounded, UpstreamError, DEFAULT_UPSTREAM_TIMEOUT};
use crate::validate::{is_valid_email, is_well_formed_code};

/// Tunables for code lifetime and lockout.
#[derive(Clone, Debug)]
pub struct OtpPolicy {
    /// How long a code stays verifiable after it is sent.
    pub code_ttl: Duration,
    /// Failed comparisons allowed before the address locks.
    pub max_attempts: u32,
    /// Lock length, measured from the record's `created_at`.
    pub lock_duration: Duration,
    /// Ceiling for each store/email call.
    pub upstream_timeout: std::time::Duration,
}

impl Default for OtpPolicy {
    fn default() -> Self {
        Self {
            code_ttl: Duration::minutes(5),
            max_attempts: 5,
            lock_duration: Duration::hours(8),
            upstream_timeout: DEFAULT_UPSTREAM_TIMEOUT,
        }
    }
}

impl OtpPolicy {
    /// Derive the lock state of `record` at `now`.
    pub fn lock_status(&self, record: &OtpRecord, now: DateTime<Utc>) -> LockStatus {
        let unlock_at = record.created_at + self.lock_duration;
        if record.attempt_count >= self.max_attempts && now < unlock_at {
            LockStatus {
                locked: true,
                unlock_at: Some(unlock_at),
            }
        } else {
            LockStatus::UNLOCKED
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockStatus {
    pub locked: bool,
    pub unlock_at: Option<DateTime<Utc>>,
}

impl LockStatus {
    pub const UNLOCKED: LockStatus = LockStatus {
        locked: false,
        unlock_at: None,
    };
}

/// Result of a successful [`OtpEngine::send_code`].
///
/// `code` is returned for tests and support tooling only; it must never be
/// shown to the end user.
#[derive(Clone, Debug)]
pub struct SentCode {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    /// False when the email could not be handed to the provider. The code stays valid.
    pub delivered: bool,
    pub message_id: Option<String>,
}

#[derive(Debug, Error)]
pub enum OtpError {
    #[error("invalid email address")]
    InvalidEmail,
    #[error("too many attempts; try again after {unlock_at}")]
    LockedOut { unlock_at: DateTime<Utc> },
    #[error(transparent)]
    Upstream(#[from] UpstreamError),
}

/// Why a verification could not be evaluated.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum VerificationError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("No pending verification found. Please request a new code.")]
    NotFound,
    #[error("This code was issued for a different action. Please request a new code.")]
    PurposeMismatch,
    #[error("This code has already been used. Please request a new code.")]
    AlreadyUsed,
    #[error("Verification is temporarily unavailable: {0}")]
    Upstream(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VerificationOutcome {
    Success,
    InvalidCode { attempts_remaining: u32 },
    Expired,
    TooManyAttempts,
    Error(VerificationError),
}

impl VerificationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, VerificationOutcome::Success)
    }

    /// The code can no longer succeed; a resend is the only way forward.
    pub fn ends_code(&self) -> bool {
        matches!(
            self,
            VerificationOutcome::Expired | VerificationOutcome::TooManyAttempts
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationOutcome::Success => "success",
            VerificationOutcome::InvalidCode { .. } => "invalid_code",
            VerificationOutcome::Expired => "expired",
            VerificationOutcome::TooManyAttempts => "too_many_attempts",
            VerificationOutcome::Error(_) => "error",
        }
    }

    /// Message suitable for showing to the user.
    pub fn message(&self) -> String {
        match self {
            VerificationOutcome::Success => "Code verified.".to_string(),
            VerificationOutcome::InvalidCode { attempts_remaining } => format!(
                "Invalid code. {} attempt(s) remaining.",
                attempts_remaining
            ),
            VerificationOutcome::Expired => {
                "Verification code has expired. Please request a new code.".to_string()
            }
            VerificationOutcome::TooManyAttempts => {
                "Too many failed attempts. Please try again later.".to_string()
            }
            VerificationOutcome::Error(e) => e.to_string(),
        }
    }
}

/// Issues, verifies and rate-limits one-time passcodes.
#[derive(Clone)]
pub struct OtpEngine {
    store: Arc<dyn Store>,
    mailer: Option<Mailer>,
    audit: Arc<dyn AuditLog>,
    clock: Arc<dyn Clock>,
    policy: OtpPolicy,
}

impl OtpEngine {
    /// `mailer` is `None` when no email provider is configured; codes are
    /// then stored but reported as undelivered.
    pub fn new(
        store: Arc<dyn Store>,
        mailer: Option<Mailer>,
        audit: Arc<dyn AuditLog>,
        clock: Arc<dyn Clock>,
        policy: OtpPolicy,
    ) -> Self {
        Self {
            store,
            mailer,
            audit,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &OtpPolicy {
        &self.policy
    }

    /// Generate, store and email a fresh code, replacing any previous one.
    pub async fn send_code(&self, email: &str, purpose: OtpPurpose) -> Result<SentCode, OtpError> {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return Err(OtpError::InvalidEmail);
        }

        let lock = self.is_locked(&email).await?;
        if let (true, Some(unlock_at)) = (lock.locked, lock.unlock_at) {
            tracing::info!(purpose = %purpose, %unlock_at, "otp send refused, address locked");
            self.audit_event(
                AuditEvent::builder(&email, AuditAction::OtpSend)
                    .resource("otp", &email)
                    .result(AuditResult::RateLimited)
                    .details(serde_json::json!({ "unlock_at": unlock_at.to_rfc3339() })),
            )
            .await;
            return Err(OtpError::LockedOut { unlock_at });
        }

        let now = self.clock.now();
        let params = UpsertOtpParams {
            email: email.clone(),
            code: generate_otp_code(),
            purpose,
            created_at: now,
            expires_at: now + self.policy.code_ttl,
        };
        let record = bounded(
            self.policy.upstream_timeout,
            "store",
            self.store.upsert_otp(&params),
        )
        .await?;

        // Delivery is best-effort: the stored code stays valid either way.
        let (delivered, message_id) = self.deliver(&record).await;

        self.audit_event(
            AuditEvent::builder(&email, AuditAction::OtpSend)
                .resource("otp", &email)
                .details(serde_json::json!({
                    "purpose": purpose.as_str(),
                    "delivered": delivered,
                })),
        )
        .await;
        tracing::info!(purpose = %purpose, delivered, "otp issued");

        Ok(SentCode {
            code: record.code,
            expires_at: record.expires_at,
            delivered,
            message_id,
        })
    }

    async fn deliver(&self, record: &OtpRecord) -> (bool, Option<String>) {
        let Some(mailer) = &self.mailer else {
            tracing::warn!("no email provider configured, otp not delivered");
            self.audit_event(
                AuditEvent::builder(&record.email, AuditAction::EmailSend)
                    .resource("email", &record.email)
                    .result(AuditResult::Error)
                    .reason("no email provider configured"),
            )
            .await;
            return (false, None);
        };

        let send = mailer.send_otp(
            &record.email,
            &record.code,
            record.purpose,
            self.policy.code_ttl.num_minutes(),
        );
        match bounded(self.policy.upstream_timeout, "email", send).await {
            Ok(delivery) => {
                self.audit_event(
                    AuditEvent::builder(&record.email, AuditAction::EmailSend)
                        .resource("email", &record.email)
                        .details(serde_json::json!({
                            "purpose": record.purpose.as_str(),
                            "message_id": delivery.message_id,
                        })),
                )
                .await;
                (true, delivery.message_id)
            }
            Err(e) => {
                tracing::warn!(error = %e, purpose = %record.purpose, "otp email delivery failed");
                self.audit_event(
                    AuditEvent::builder(&record.email, AuditAction::EmailSend)
                        .resource("email", &record.email)
                        .result(AuditResult::Error)
                        .reason(e.to_string())
                        .details(serde_json::json!({ "purpose": record.purpose.as_str() })),
                )
                .await;
                (false, None)
            }
        }
    }

    /// Check `entered_code` against the stored record.
    ///
    /// Performs at most one write to the record: either the verified flag or
    /// the attempt counter.
    pub async fn verify_code(
        &self,
        email: &str,
        entered_code: &str,
        purpose: OtpPurpose,
    ) -> VerificationOutcome {
        let email = normalize_email(email);
        if !is_valid_email(&email) {
            return VerificationOutcome::Error(VerificationError::InvalidInput(
                "Invalid email address.".to_string(),
            ));
        }
        if !is_well_formed_code(entered_code) {
            return VerificationOutcome::Error(VerificationError::InvalidInput(
                "Code must be 6 digits.".to_string(),
            ));
        }

        let timeout = self.policy.upstream_timeout;
        let record = match bounded(timeout, "store", self.store.get_otp(&email)).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return VerificationOutcome::Error(VerificationError::NotFound)
            }
            Err(e) => return upstream_outcome(e),
        };

        if record.purpose != purpose {
            return VerificationOutcome::Error(VerificationError::PurposeMismatch);
        }
        if record.verified {
            return VerificationOutcome::Error(VerificationError::AlreadyUsed);
        }
        let now = self.clock.now();
        if record.is_expired_at(now) {
            return VerificationOutcome::Expired;
        }
        if record.attempt_count >= self.policy.max_attempts {
            return VerificationOutcome::TooManyAttempts;
        }

        let matches: bool = record
            .code
            .as_bytes()
            .ct_eq(entered_code.as_bytes())
            .into();

        // Both writes re-check the record, so concurrent guesses cannot get
        // past the attempt cap between the read above and the write.
        let max_attempts = self.policy.max_attempts;
        let outcome = if matches {
            let write = self
                .store
                .mark_otp_verified(&email, &record.code, max_attempts, now);
            match bounded(timeout, "store", write).await {
                Ok(()) => VerificationOutcome::Success,
                Err(UpstreamError::Store(StoreError::Conflict)) => {
                    self.settle_refused_write(&email).await
                }
                Err(e) => return upstream_outcome(e),
            }
        } else {
            let write = self.store.increment_otp_attempts(&email, max_attempts);
            match bounded(timeout, "store", write).await {
                Ok(count) if count >= max_attempts => VerificationOutcome::TooManyAttempts,
                Ok(count) => VerificationOutcome::InvalidCode {
                    attempts_remaining: max_attempts - count,
                },
                Err(UpstreamError::Store(StoreError::Conflict)) => {
                    self.settle_refused_write(&email).await
                }
                Err(e) => return upstream_outcome(e),
            }
        };

        match &outcome {
            VerificationOutcome::Success => {
                self.audit_event(
                    AuditEvent::builder(&email, AuditAction::OtpVerify)
                        .resource("otp", &email)
                        .details(serde_json::json!({ "purpose": purpose.as_str() })),
                )
                .await;
            }
            VerificationOutcome::TooManyAttempts => {
                tracing::warn!(purpose = %purpose, "otp attempts exhausted, address locked");
                self.audit_event(
                    AuditEvent::builder(&email, AuditAction::OtpVerify)
                        .resource("otp", &email)
                        .result(AuditResult::RateLimited)
                        .details(serde_json::json!({ "purpose": purpose.as_str() })),
                )
                .await;
            }
            _ => {}
        }
        outcome
    }

    /// Whether sends to `email` are currently refused, and until when.
    pub async fn is_locked(&self, email: &str) -> Result<LockStatus, OtpError> {
        let email = normalize_email(email);
        match bounded(self.policy.upstream_timeout, "store", self.store.get_otp(&email)).await {
            Ok(record) => Ok(self.policy.lock_status(&record, self.clock.now())),
            Err(e) if e.is_not_found() => Ok(LockStatus::UNLOCKED),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove the record for `email` (after it has been consumed).
    pub(crate) async fn discard(&self, email: &str) -> Result<(), UpstreamError> {
        bounded(self.policy.upstream_timeout, "store", self.store.delete_otp(email)).await
    }

    pub(crate) async fn current_record(&self, email: &str) -> Result<OtpRecord, UpstreamError> {
        bounded(self.policy.upstream_timeout, "store", self.store.get_otp(email)).await
    }

    /// A conditional write was refused because the record changed after it
    /// was read. Report what the record says now; nothing is written.
    async fn settle_refused_write(&self, email: &str) -> VerificationOutcome {
        let record = match self.current_record(email).await {
            Ok(record) => record,
            Err(e) if e.is_not_found() => {
                return VerificationOutcome::Error(VerificationError::NotFound)
            }
            Err(e) => return upstream_outcome(e),
        };
        if record.verified {
            VerificationOutcome::Error(VerificationError::AlreadyUsed)
        } else if record.is_expired_at(self.clock.now()) {
            VerificationOutcome::Expired
        } else if record.attempt_count >= self.policy.max_attempts {
            VerificationOutcome::TooManyAttempts
        } else {
            // A resend replaced the code that was compared.
            VerificationOutcome::InvalidCode {
                attempts_remaining: self.policy.max_attempts - record.attempt_count,
            }
        }
    }

    async fn audit_event(&self, builder: barakah_audit::AuditEventBuilder) {
        record_best_effort(self.audit.as_ref(), builder.build()).await;
    }
}

fn upstream_outcome(e: UpstreamError) -> VerificationOutcome {
    tracing::error!(error = %e, "otp verification failed upstream");
    VerificationOutcome::Error(VerificationError::Upstream(e.to_string()))
}
