//! Authentication Middleware
//!
//! Bearer access token validation for protected routes.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use crate::domain::AccessToken;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// Authenticated user extension
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: i64,
    /// The verified token, with its grant already cached
    pub token: Arc<AccessToken>,
}

/// Authentication middleware that validates `Authorization: Bearer <token>`
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Extract Authorization header
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("Missing authorization header".into()))?;

    // The token parser strips the "Bearer " prefix itself
    let token = state.tokens.authenticate(auth_header).await.map_err(|e| {
        tracing::debug!(error = %e, "Rejected bearer token");
        AppError::from(e)
    })?;

    let user_id = token.user_id();
    request.extensions_mut().insert(AuthUser {
        user_id,
        token: Arc::new(token),
    });

    // Continue to the next handler
    Ok(next.run(request).await)
}
