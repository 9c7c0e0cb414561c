// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Access-token authentication middleware.

use crate::error::AppError;
use crate::routes::users::ACCESS_COOKIE;
use crate::AppState;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;
use std::sync::Arc;

/// Authenticated user extracted from the access token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: String,
    pub username: String,
    pub email: String,
}

/// Middleware that requires a valid access token for a user that still exists.
pub async fn require_auth(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    // Try cookie first, then header
    let token = match jar.get(ACCESS_COOKIE) {
        Some(cookie) => Some(cookie.value().to_string()),
        None => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|h| h.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string()),
    };

    let user = state.sessions.authenticate(token.as_deref()).await?;

    request.extensions_mut().insert(AuthUser {
        user_id: user.id,
        username: user.username,
        email: user.email,
    });

    Ok(next.run(request).await)
}
