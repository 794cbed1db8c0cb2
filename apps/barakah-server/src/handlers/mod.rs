//! JSON handlers for the `/v1` callables.

pub mod email;
pub mod otp;
pub mod password;
pub mod transactions;
pub mod users;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use barakah_core::{OtpError, RegistrationError, ResetError, SyncError};
use barakah_storage::OtpPurpose;
use chrono::{DateTime, Utc};
use serde_json::json;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Forbidden(String),
    NotFound(String),
    Conflict(String),
    Gone(String),
    TooManyRequests { message: String, unlock_at: DateTime<Utc> },
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, unlock_at) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, None),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg, None),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg, None),
            ApiError::Gone(msg) => (StatusCode::GONE, msg, None),
            ApiError::TooManyRequests { message, unlock_at } => {
                (StatusCode::TOO_MANY_REQUESTS, message, Some(unlock_at))
            }
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg, None),
        };

        let mut body = json!({
            "success": false,
            "error": message,
        });
        if let Some(unlock_at) = unlock_at {
            body["unlockAt"] = json!(unlock_at.to_rfc3339());
        }
        (status, Json(body)).into_response()
    }
}

impl From<OtpError> for ApiError {
    fn from(err: OtpError) -> Self {
        match err {
            OtpError::InvalidEmail => ApiError::BadRequest(err.to_string()),
            OtpError::LockedOut { unlock_at } => ApiError::TooManyRequests {
                message: "Too many failed attempts. Please try again later.".to_string(),
                unlock_at,
            },
            OtpError::Upstream(e) => {
                tracing::error!(error = %e, "otp request failed");
                ApiError::Internal("Could not send a code. Please try again.".to_string())
            }
        }
    }
}

impl From<ResetError> for ApiError {
    fn from(err: ResetError) -> Self {
        match err {
            ResetError::InvalidEmail | ResetError::WeakPassword { .. } => {
                ApiError::BadRequest(err.to_string())
            }
            ResetError::TokenNotFound => ApiError::NotFound(err.to_string()),
            ResetError::TokenMismatch | ResetError::NotVerified => {
                ApiError::Forbidden(err.to_string())
            }
            ResetError::Expired => ApiError::Gone(err.to_string()),
            ResetError::Upstream(_) => {
                ApiError::Internal("Password reset failed. Please try again.".to_string())
            }
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::InvalidEmail
            | RegistrationError::MissingName
            | RegistrationError::WeakPassword { .. } => ApiError::BadRequest(err.to_string()),
            RegistrationError::EmailInUse => ApiError::Conflict(err.to_string()),
            RegistrationError::InvalidCredentials => ApiError::Forbidden(err.to_string()),
            RegistrationError::Otp(e) => e.into(),
            RegistrationError::Upstream(e) => {
                tracing::error!(error = %e, "registration failed");
                ApiError::Internal("Registration failed. Please try again.".to_string())
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        ApiError::Internal(format!("Transaction sync failed: {}", err))
    }
}

/// Parse an optional purpose field, defaulting to sign-up.
pub(crate) fn parse_purpose(raw: Option<&str>) -> ApiResult<OtpPurpose> {
    match raw {
        None => Ok(OtpPurpose::SignUp),
        Some(s) => s
            .parse()
            .map_err(|e: barakah_storage::ParseOtpPurposeError| ApiError::BadRequest(e.to_string())),
    }
}

/// Trimmed value of a required string field.
pub(crate) fn required<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::BadRequest(format!("{} is required", name))),
    }
}
