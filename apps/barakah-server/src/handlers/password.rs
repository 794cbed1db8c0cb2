//! Password reset callables.

use axum::extract::State;
use axum::Json;
use barakah_core::{ResetCodeOutcome, ResetError, VerificationError, VerificationOutcome};
use serde::{Deserialize, Serialize};

use super::{required, ApiError, ApiResult};
use crate::metrics;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResetCodeRequest {
    pub email: Option<String>,
    pub code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResetCodeResponse {
    pub success: bool,
    pub outcome: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp_verification_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

pub async fn verify_reset_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyResetCodeRequest>,
) -> ApiResult<Json<VerifyResetCodeResponse>> {
    let email = required(&req.email, "email")?;
    let code = required(&req.code, "code")?;

    let response = match state.reset.verify_reset_code(email, code).await? {
        ResetCodeOutcome::TokenIssued(token) => {
            metrics::record_otp_verify(VerificationOutcome::Success.as_str());
            VerifyResetCodeResponse {
                success: true,
                outcome: VerificationOutcome::Success.as_str(),
                message: "Code verified.".to_string(),
                otp_verification_token: Some(token),
                attempts_remaining: None,
            }
        }
        ResetCodeOutcome::NotVerified(outcome) => {
            metrics::record_otp_verify(outcome.as_str());
            let attempts_remaining = match &outcome {
                VerificationOutcome::InvalidCode { attempts_remaining } => {
                    Some(*attempts_remaining)
                }
                VerificationOutcome::Error(VerificationError::InvalidInput(msg)) => {
                    return Err(ApiError::BadRequest(msg.clone()))
                }
                _ => None,
            };
            VerifyResetCodeResponse {
                success: false,
                outcome: outcome.as_str(),
                message: outcome.message(),
                otp_verification_token: None,
                attempts_remaining,
            }
        }
    };
    Ok(Json(response))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: Option<String>,
    pub new_password: Option<String>,
    pub otp_verification_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ResetPasswordResponse {
    pub success: bool,
    pub message: String,
}

pub async fn reset_password(
    State(state): State<AppState>,
    Json(req): Json<ResetPasswordRequest>,
) -> ApiResult<Json<ResetPasswordResponse>> {
    let email = required(&req.email, "email")?;
    let token = required(&req.otp_verification_token, "otpVerificationToken")?;
    // Not trimmed: whitespace is part of a password
    let new_password = req
        .new_password
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("newPassword is required".to_string()))?;

    match state.reset.reset_password(email, new_password, token).await {
        Ok(()) => {
            metrics::record_password_reset("success");
            Ok(Json(ResetPasswordResponse {
                success: true,
                message: "Password updated successfully".to_string(),
            }))
        }
        Err(e) => {
            metrics::record_password_reset(match &e {
                ResetError::Expired => "expired",
                ResetError::Upstream(_) => "error",
                _ => "rejected",
            });
            Err(e.into())
        }
    }
}
