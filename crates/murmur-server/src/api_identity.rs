//! Session identity handlers.

use crate::api::ApiError;
use crate::AppState;
use axum::{extract::Extension, Json};
use murmur_types::Identity;
use serde::Deserialize;
use std::sync::Arc;

/// Maximum nickname length, in characters.
const MAX_NICKNAME_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct SetNicknameRequest {
    /// New nickname; blank clears it.
    pub nickname: String,
}

/// Handler for `GET /api/identity`.
pub async fn get_identity_handler(Extension(state): Extension<Arc<AppState>>) -> Json<Identity> {
    Json(state.session.whoami().await)
}

/// Handler for `PUT /api/identity/nickname`.
pub async fn set_nickname_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SetNicknameRequest>,
) -> Result<Json<Identity>, ApiError> {
    if payload.nickname.trim().chars().count() > MAX_NICKNAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "nickname must be at most {MAX_NICKNAME_LEN} characters"
        )));
    }

    let identity = state.session.identity().set_nickname(&payload.nickname).await?;
    tracing::info!(identity = %identity.id, display_name = %identity.display_name, "nickname updated");
    Ok(Json(identity))
}
