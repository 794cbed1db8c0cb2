//! Audit logging abstraction for barakah.
//!
//! This crate defines the `AuditLog` trait for persisting audit events and the
//! types representing auditable actions. Email delivery logs and password
//! reset logs are both audit events, told apart by [`AuditAction`].

use async_trait::async_trait;
use barakah_storage::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Actor recorded for jobs that run without a user (sweeps, post-link sync).
pub const SYSTEM_ACTOR: &str = "system";

/// Unique identifier for an audit log entry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AuditLogId(pub Uuid);

impl AuditLogId {
    /// Generate a new audit log ID using UUID v7 (time-ordered)
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for AuditLogId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AuditLogId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AuditLogId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Categories of auditable actions
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    // Accounts
    UserRegister,
    UserRegisterRollback,
    UserSignIn,

    // One-time passcodes
    OtpSend,
    OtpVerify,

    // Outbound email (email_logs)
    EmailSend,

    // Password reset (password_reset_logs)
    PasswordResetIssue,
    PasswordResetComplete,

    // Bank
    BankLink,
    BankUnlink,
    TransactionSync,

    // Scheduled cleanup
    SweepOtps,
    SweepResetTokens,
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditAction::UserRegister => "user.register",
            AuditAction::UserRegisterRollback => "user.register_rollback",
            AuditAction::UserSignIn => "user.sign_in",
            AuditAction::OtpSend => "otp.send",
            AuditAction::OtpVerify => "otp.verify",
            AuditAction::EmailSend => "email.send",
            AuditAction::PasswordResetIssue => "password_reset.issue",
            AuditAction::PasswordResetComplete => "password_reset.complete",
            AuditAction::BankLink => "bank.link",
            AuditAction::BankUnlink => "bank.unlink",
            AuditAction::TransactionSync => "transaction.sync",
            AuditAction::SweepOtps => "sweep.otps",
            AuditAction::SweepResetTokens => "sweep.reset_tokens",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user.register" => Ok(AuditAction::UserRegister),
            "user.register_rollback" => Ok(AuditAction::UserRegisterRollback),
            "user.sign_in" => Ok(AuditAction::UserSignIn),
            "otp.send" => Ok(AuditAction::OtpSend),
            "otp.verify" => Ok(AuditAction::OtpVerify),
            "email.send" => Ok(AuditAction::EmailSend),
            "password_reset.issue" => Ok(AuditAction::PasswordResetIssue),
            "password_reset.complete" => Ok(AuditAction::PasswordResetComplete),
            "bank.link" => Ok(AuditAction::BankLink),
            "bank.unlink" => Ok(AuditAction::BankUnlink),
            "transaction.sync" => Ok(AuditAction::TransactionSync),
            "sweep.otps" => Ok(AuditAction::SweepOtps),
            "sweep.reset_tokens" => Ok(AuditAction::SweepResetTokens),
            _ => Err(format!("Unknown audit action: {}", s)),
        }
    }
}

/// Result of an audited operation
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditResult {
    Success,
    InvalidRequest,
    NotFound,
    Expired,
    RateLimited,
    Error,
}

impl std::fmt::Display for AuditResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AuditResult::Success => "success",
            AuditResult::InvalidRequest => "invalid_request",
            AuditResult::NotFound => "not_found",
            AuditResult::Expired => "expired",
            AuditResult::RateLimited => "rate_limited",
            AuditResult::Error => "error",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditResult::Success),
            "invalid_request" => Ok(AuditResult::InvalidRequest),
            "not_found" => Ok(AuditResult::NotFound),
            "expired" => Ok(AuditResult::Expired),
            "rate_limited" => Ok(AuditResult::RateLimited),
            "error" => Ok(AuditResult::Error),
            _ => Err(format!("Unknown audit result: {}", s)),
        }
    }
}

/// An audit log entry representing a single auditable action.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Unique identifier for this audit entry
    pub id: AuditLogId,
    /// When the action occurred
    pub timestamp: DateTime<Utc>,
    /// Who triggered the action: an email address, a user id, or [`SYSTEM_ACTOR`]
    pub actor: String,
    /// User ID once the actor is known to the identity provider
    pub user_id: Option<Uuid>,
    /// The action that was performed
    pub action: AuditAction,
    /// Type of resource affected (e.g., "otp", "reset_token", "bank_link")
    pub resource_type: String,
    /// Identifier of the affected resource
    pub resource_id: String,
    /// Result of the operation
    pub result: AuditResult,
    /// Error message or additional context
    pub reason: Option<String>,
    /// Additional details as JSON (e.g., provider message id, counts)
    pub details: Option<serde_json::Value>,
    /// Client IP address (if available)
    pub client_ip: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event builder
    pub fn builder(actor: impl Into<String>, action: AuditAction) -> AuditEventBuilder {
        AuditEventBuilder::new(actor, action)
    }

    pub fn get_user_id(&self) -> Option<UserId> {
        self.user_id.map(UserId)
    }
}

/// Builder for constructing audit events
pub struct AuditEventBuilder {
    actor: String,
    action: AuditAction,
    user_id: Option<Uuid>,
    resource_type: String,
    resource_id: String,
    result: AuditResult,
    reason: Option<String>,
    details: Option<serde_json::Value>,
    client_ip: Option<String>,
}

impl AuditEventBuilder {
    pub fn new(actor: impl Into<String>, action: AuditAction) -> Self {
        Self {
            actor: actor.into(),
            action,
            user_id: None,
            resource_type: String::new(),
            resource_id: String::new(),
            result: AuditResult::Success,
            reason: None,
            details: None,
            client_ip: None,
        }
    }

    pub fn user_id(mut self, user_id: Option<&UserId>) -> Self {
        self.user_id = user_id.map(|u| u.0);
        self
    }

    pub fn resource(
        mut self,
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = resource_id.into();
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = result;
        self
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn client_ip(mut self, client_ip: impl Into<String>) -> Self {
        self.client_ip = Some(client_ip.into());
        self
    }

    pub fn build(self) -> AuditEvent {
        AuditEvent {
            id: AuditLogId::new(),
            timestamp: Utc::now(),
            actor: self.actor,
            user_id: self.user_id,
            action: self.action,
            resource_type: self.resource_type,
            resource_id: self.resource_id,
            result: self.result,
            reason: self.reason,
            details: self.details,
            client_ip: self.client_ip,
        }
    }
}

/// Filter for querying audit logs
#[derive(Clone, Debug, Default)]
pub struct AuditLogFilter {
    /// Filter by actor
    pub actor: Option<String>,
    /// Filter by user ID
    pub user_id: Option<UserId>,
    /// Filter by action
    pub action: Option<AuditAction>,
    /// Filter by result
    pub result: Option<AuditResult>,
    /// Filter by start timestamp (inclusive)
    pub from: Option<DateTime<Utc>>,
    /// Filter by end timestamp (exclusive)
    pub to: Option<DateTime<Utc>>,
    /// Maximum number of results to return
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
}

impl AuditLogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn user_id(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn action(mut self, action: AuditAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn result(mut self, result: AuditResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn from(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn to(mut self, to: DateTime<Utc>) -> Self {
        self.to = Some(to);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Error type for audit log operations
#[derive(Debug, Error)]
pub enum AuditLogError {
    #[error("database error: {0}")]
    Database(String),

    #[error("audit log not found: {0}")]
    NotFound(AuditLogId),

    #[error("invalid filter: {0}")]
    InvalidFilter(String),
}

/// Trait for audit log persistence.
///
/// Implementations store audit events and provide query capabilities
/// for support and security monitoring.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Record an audit event.
    ///
    /// Failures to record audit events should be logged but should not
    /// fail the main operation; see [`record_best_effort`].
    async fn record(&self, event: AuditEvent) -> Result<(), AuditLogError>;

    /// Query audit logs with optional filters.
    ///
    /// Returns events matching the filter criteria, ordered by timestamp descending.
    async fn query(&self, filter: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError>;

    /// Get a specific audit log entry by ID.
    async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError>;

    /// Count audit logs matching the filter criteria.
    async fn count(&self, filter: AuditLogFilter) -> Result<u64, AuditLogError>;
}

/// Record `event`, logging instead of propagating a failure.
pub async fn record_best_effort(log: &dyn AuditLog, event: AuditEvent) {
    let action = event.action.clone();
    if let Err(e) = log.record(event).await {
        tracing::warn!(action = %action, error = %e, "failed to record audit event");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_action_display() {
        assert_eq!(AuditAction::OtpSend.to_string(), "otp.send");
        assert_eq!(
            AuditAction::PasswordResetComplete.to_string(),
            "password_reset.complete"
        );
    }

    #[test]
    fn test_audit_action_all_variants_roundtrip() {
        let actions = vec![
            AuditAction::UserRegister,
            AuditAction::UserRegisterRollback,
            AuditAction::UserSignIn,
            AuditAction::OtpSend,
            AuditAction::OtpVerify,
            AuditAction::EmailSend,
            AuditAction::PasswordResetIssue,
            AuditAction::PasswordResetComplete,
            AuditAction::BankLink,
            AuditAction::BankUnlink,
            AuditAction::TransactionSync,
            AuditAction::SweepOtps,
            AuditAction::SweepResetTokens,
        ];

        for action in actions {
            let display = action.to_string();
            let parsed: AuditAction = display.parse().unwrap();
            assert_eq!(action, parsed, "Roundtrip failed for {:?}", action);
        }
        assert!("invalid.action".parse::<AuditAction>().is_err());
    }

    #[test]
    fn test_audit_result_parse_error() {
        let result = "unknown_result".parse::<AuditResult>();
        assert!(result.unwrap_err().contains("Unknown audit result"));
        assert_eq!("rate_limited".parse::<AuditResult>().unwrap(), AuditResult::RateLimited);
    }

    #[test]
    fn test_audit_event_builder_with_all_fields() {
        let user_id = UserId(Uuid::new_v4());
        let event = AuditEvent::builder("a@b.com", AuditAction::EmailSend)
            .user_id(Some(&user_id))
            .resource("email", "a@b.com")
            .result(AuditResult::Error)
            .reason("smtp timeout")
            .details(serde_json::json!({"purpose": "sign_up"}))
            .client_ip("10.0.0.1")
            .build();

        assert_eq!(event.actor, "a@b.com");
        assert_eq!(event.get_user_id(), Some(user_id));
        assert_eq!(event.resource_type, "email");
        assert_eq!(event.result, AuditResult::Error);
        assert_eq!(event.reason.as_deref(), Some("smtp timeout"));
        assert_eq!(event.details.unwrap()["purpose"], "sign_up");
        assert_eq!(event.client_ip.as_deref(), Some("10.0.0.1"));
    }

    #[test]
    fn test_audit_event_builder_defaults() {
        let event = AuditEvent::builder(SYSTEM_ACTOR, AuditAction::SweepOtps).build();
        assert_eq!(event.result, AuditResult::Success);
        assert!(event.user_id.is_none());
        assert!(event.reason.is_none());
        assert!(event.resource_id.is_empty());
    }

    #[test]
    fn test_audit_log_filter_builder() {
        let from = Utc::now() - chrono::Duration::hours(1);
        let filter = AuditLogFilter::new()
            .actor("a@b.com")
            .action(AuditAction::PasswordResetComplete)
            .result(AuditResult::Success)
            .from(from)
            .limit(10)
            .offset(5);

        assert_eq!(filter.actor.as_deref(), Some("a@b.com"));
        assert_eq!(filter.action, Some(AuditAction::PasswordResetComplete));
        assert_eq!(filter.from, Some(from));
        assert!(filter.to.is_none());
        assert_eq!(filter.limit, Some(10));
        assert_eq!(filter.offset, Some(5));
    }

    #[test]
    fn test_audit_event_serialization() {
        let event = AuditEvent::builder("a@b.com", AuditAction::OtpVerify)
            .resource("otp", "a@b.com")
            .result(AuditResult::RateLimited)
            .build();

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"otp_verify\""));
        let deserialized: AuditEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.action, AuditAction::OtpVerify);
        assert_eq!(deserialized.result, AuditResult::RateLimited);
    }

    #[test]
    fn test_audit_log_id_is_v7() {
        let id = AuditLogId::new();
        assert_eq!(id.0.get_version_num(), 7);
    }

    struct FailingLog;

    #[async_trait]
    impl AuditLog for FailingLog {
        async fn record(&self, _event: AuditEvent) -> Result<(), AuditLogError> {
            Err(AuditLogError::Database("read-only".into()))
        }
        async fn query(&self, _f: AuditLogFilter) -> Result<Vec<AuditEvent>, AuditLogError> {
            Ok(vec![])
        }
        async fn get(&self, id: AuditLogId) -> Result<AuditEvent, AuditLogError> {
            Err(AuditLogError::NotFound(id))
        }
        async fn count(&self, _f: AuditLogFilter) -> Result<u64, AuditLogError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn test_record_best_effort_swallows_errors() {
        let event = AuditEvent::builder("a@b.com", AuditAction::OtpSend).build();
        record_best_effort(&FailingLog, event).await;
    }
}
