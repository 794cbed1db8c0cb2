//! `POST /v1/email/otp`: deliver a caller-supplied code by email.

use axum::extract::State;
use axum::Json;
use barakah_audit::{record_best_effort, AuditAction, AuditEvent, AuditResult};
use barakah_core::upstream::bounded;
use barakah_core::validate::{is_valid_email, is_well_formed_code};
use barakah_storage::normalize_email;
use serde::{Deserialize, Serialize};

use super::{parse_purpose, required, ApiError, ApiResult};
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpEmailRequest {
    pub email: Option<String>,
    pub otp: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOtpEmailResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

pub async fn send_otp_email(
    State(state): State<AppState>,
    Json(req): Json<SendOtpEmailRequest>,
) -> ApiResult<Json<SendOtpEmailResponse>> {
    let (email, otp) = match (required(&req.email, "email"), required(&req.otp, "otp")) {
        (Ok(email), Ok(otp)) => (normalize_email(email), otp.to_string()),
        _ => return Err(ApiError::BadRequest("Email and OTP are required".to_string())),
    };
    if !is_valid_email(&email) {
        return Err(ApiError::BadRequest("Invalid email address".to_string()));
    }
    if !is_well_formed_code(&otp) {
        return Err(ApiError::BadRequest("OTP must be 6 digits".to_string()));
    }
    let purpose = parse_purpose(req.purpose.as_deref())?;

    let Some(mailer) = state.mailer.as_ref() else {
        return Err(ApiError::Unavailable(
            "Email service is not configured".to_string(),
        ));
    };

    let policy = state.otp.policy();
    let valid_minutes = policy.code_ttl.num_minutes();
    let send = mailer.send_otp(&email, &otp, purpose, valid_minutes);
    match bounded(policy.upstream_timeout, "email", send).await {
        Ok(delivery) => {
            record_best_effort(
                state.audit.as_ref(),
                AuditEvent::builder(&email, AuditAction::EmailSend)
                    .resource("email", &email)
                    .details(serde_json::json!({
                        "purpose": purpose.as_str(),
                        "message_id": delivery.message_id,
                    }))
                    .build(),
            )
            .await;
            Ok(Json(SendOtpEmailResponse {
                success: true,
                message: "OTP email sent".to_string(),
                message_id: delivery.message_id,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "failed to send otp email");
            record_best_effort(
                state.audit.as_ref(),
                AuditEvent::builder(&email, AuditAction::EmailSend)
                    .resource("email", &email)
                    .result(AuditResult::Error)
                    .reason(e.to_string())
                    .build(),
            )
            .await;
            Err(ApiError::Internal("Failed to send OTP email".to_string()))
        }
    }
}
