//! `POST /v1/users/register`.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use super::{required, ApiError, ApiResult};
use crate::metrics;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterResponse {
    pub success: bool,
    pub user_id: String,
    pub code_delivered: bool,
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> ApiResult<Json<RegisterResponse>> {
    let full_name = required(&req.full_name, "fullName")?;
    let email = required(&req.email, "email")?;
    let password = req
        .password
        .as_deref()
        .ok_or_else(|| ApiError::BadRequest("password is required".to_string()))?;

    let registered = state
        .registration
        .register(full_name, email, password)
        .await?;
    metrics::record_otp_sent("sign_up", registered.code.delivered);

    Ok(Json(RegisterResponse {
        success: true,
        user_id: registered.user_id.to_string(),
        code_delivered: registered.code.delivered,
    }))
}
