//! Access Token Handlers
//!
//! Introspection and revocation of the token presented with the request.
//!
//! # Endpoints
//! - `GET /api/v0/tokens/@current` - Describe the bearer token
//! - `DELETE /api/v0/tokens/@current` - Revoke the bearer token

use std::collections::BTreeSet;

use axum::{extract::State, http::StatusCode, Extension, Json};
use serde::Serialize;

use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Token introspection response. Ids are serialized as strings.
#[derive(Debug, Serialize)]
pub struct TokenInfoResponse {
    pub user_id: String,
    pub app_id: String,
    pub scope: BTreeSet<String>,
}

/// GET /api/v0/tokens/@current
pub async fn get_current_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<Json<TokenInfoResponse>, AppError> {
    let app_id = state.tokens.app_of(&auth.token).await?;
    let scope = state.tokens.scope_of(&auth.token).await?;

    Ok(Json(TokenInfoResponse {
        user_id: auth.user_id.to_string(),
        app_id: app_id.to_string(),
        scope,
    }))
}

/// DELETE /api/v0/tokens/@current
pub async fn revoke_current_token(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthUser>,
) -> Result<StatusCode, AppError> {
    state.tokens.revoke(&auth.token).await?;
    tracing::info!(user_id = auth.user_id, "Access token revoked");

    Ok(StatusCode::NO_CONTENT)
}
