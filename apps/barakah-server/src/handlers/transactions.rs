//! `POST /v1/transactions/sync`.

use axum::extract::State;
use axum::Json;
use barakah_storage::UserId;
use serde::{Deserialize, Serialize};

use super::{required, ApiError, ApiResult};
use crate::metrics;
use crate::server::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncRequest {
    pub user_id: Option<String>,
    pub access_token: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub inserted: usize,
}

pub async fn sync(
    State(state): State<AppState>,
    Json(req): Json<SyncRequest>,
) -> ApiResult<Json<SyncResponse>> {
    let user_id: UserId = required(&req.user_id, "userId")?
        .parse()
        .map_err(|_| ApiError::BadRequest("userId must be a UUID".to_string()))?;
    let access_token = required(&req.access_token, "accessToken")?;

    let Some(sync) = state.sync.as_ref() else {
        return Err(ApiError::Unavailable(
            "Bank integration is not configured".to_string(),
        ));
    };

    let inserted = sync.sync_transactions(&user_id, access_token).await?;
    metrics::record_transactions_synced(inserted);
    Ok(Json(SyncResponse {
        success: true,
        inserted,
    }))
}
