//! Code issuance, verification and lock lookup.

use axum::extract::{Query, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{parse_purpose, required, ApiError, ApiResult};
use crate::metrics;
use crate::server::AppState;
use barakah_core::{VerificationError, VerificationOutcome};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeRequest {
    pub email: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendCodeResponse {
    pub success: bool,
    pub expires_at: DateTime<Utc>,
    pub delivered: bool,
}

pub async fn send_code(
    State(state): State<AppState>,
    Json(req): Json<SendCodeRequest>,
) -> ApiResult<Json<SendCodeResponse>> {
    let email = required(&req.email, "email")?;
    let purpose = parse_purpose(req.purpose.as_deref())?;

    let sent = state.otp.send_code(email, purpose).await?;
    metrics::record_otp_sent(purpose.as_str(), sent.delivered);

    Ok(Json(SendCodeResponse {
        success: true,
        expires_at: sent.expires_at,
        delivered: sent.delivered,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeRequest {
    pub email: Option<String>,
    pub code: Option<String>,
    pub purpose: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyCodeResponse {
    pub success: bool,
    pub outcome: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempts_remaining: Option<u32>,
}

impl From<&VerificationOutcome> for VerifyCodeResponse {
    fn from(outcome: &VerificationOutcome) -> Self {
        let attempts_remaining = match outcome {
            VerificationOutcome::InvalidCode { attempts_remaining } => Some(*attempts_remaining),
            _ => None,
        };
        Self {
            success: outcome.is_success(),
            outcome: outcome.as_str(),
            message: outcome.message(),
            attempts_remaining,
        }
    }
}

/// Outcomes other than malformed input are reported with 200 and a
/// machine-readable `outcome`.
pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> ApiResult<Json<VerifyCodeResponse>> {
    let email = required(&req.email, "email")?;
    let code = required(&req.code, "code")?;
    let purpose = parse_purpose(req.purpose.as_deref())?;

    let outcome = state.otp.verify_code(email, code, purpose).await;
    metrics::record_otp_verify(outcome.as_str());
    if let VerificationOutcome::Error(VerificationError::InvalidInput(msg)) = &outcome {
        return Err(ApiError::BadRequest(msg.clone()));
    }
    Ok(Json(VerifyCodeResponse::from(&outcome)))
}

#[derive(Debug, Deserialize)]
pub struct LockQuery {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LockResponse {
    pub locked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unlock_at: Option<DateTime<Utc>>,
}

pub async fn lock_status(
    State(state): State<AppState>,
    Query(query): Query<LockQuery>,
) -> ApiResult<Json<LockResponse>> {
    let email = required(&query.email, "email")?;
    let status = state.otp.is_locked(email).await?;
    Ok(Json(LockResponse {
        locked: status.locked,
        unlock_at: status.unlock_at,
    }))
}
