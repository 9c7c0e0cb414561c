// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! User account and session routes.
//!
//! Session tokens travel as HttpOnly cookies; login and refresh also return
//! them in the body for clients that cannot use cookies.

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Multipart, State},
    http::StatusCode,
    routing::{get, patch, post},
    Extension, Json, Router,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::middleware::AuthUser;
use crate::models::UserProfile;
use crate::response::ApiResponse;
use crate::routes::upload::UploadForm;
use crate::services::{LoginCredentials, Registration, RegistrationFiles, TokenPair};
use crate::AppState;

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Routes that need no prior authentication.
pub fn public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/refresh-token", post(refresh_token))
}

/// Routes behind the access-token guard.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/logout", post(logout))
        .route("/change-password", post(change_password))
        .route("/current-user", get(current_user))
        .route("/update-account", patch(update_account))
        .route("/avatar", patch(update_avatar))
        .route("/cover-image", patch(update_cover_image))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAccountRequest {
    pub full_name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub user: UserProfile,
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TokensResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

fn json_body<T>(body: std::result::Result<Json<T>, JsonRejection>) -> Result<T> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

fn session_cookie(name: &'static str, value: String, ttl: Duration, secure: bool) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(ttl.as_secs() as i64))
        .build()
}

/// Empty, already-expired cookie. Sent unconditionally: `CookieJar::remove`
/// only emits a removal for cookies that arrived with the request.
fn expired_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    session_cookie(name, String::new(), Duration::ZERO, secure)
}

fn set_session_cookies(jar: CookieJar, config: &Config, tokens: &TokenPair) -> CookieJar {
    jar.add(session_cookie(
        ACCESS_COOKIE,
        tokens.access_token.clone(),
        config.access_token_ttl,
        config.cookie_secure,
    ))
    .add(session_cookie(
        REFRESH_COOKIE,
        tokens.refresh_token.clone(),
        config.refresh_token_ttl,
        config.cookie_secure,
    ))
}

fn clear_session_cookies(jar: CookieJar, config: &Config) -> CookieJar {
    jar.add(expired_cookie(ACCESS_COOKIE, config.cookie_secure))
        .add(expired_cookie(REFRESH_COOKIE, config.cookie_secure))
}

/// Create an account from a multipart form with an avatar file.
async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    let mut form = UploadForm::read(multipart, &state.config.upload_dir).await?;

    let registration = Registration {
        full_name: form.text("fullName"),
        username: form.text("username"),
        email: form.text("email"),
        password: form.text("password"),
    };
    let files = RegistrationFiles {
        avatar: form.take_file("avatar"),
        cover_image: form.take_file("coverImage"),
    };

    let user = state.accounts.register(registration, files).await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        user,
        "User registered successfully",
    ))
}

async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: std::result::Result<Json<LoginRequest>, JsonRejection>,
) -> Result<(CookieJar, ApiResponse<LoginResponse>)> {
    let req = json_body(body)?;

    let outcome = state
        .sessions
        .login(LoginCredentials {
            username: req.username,
            email: req.email,
            password: req.password,
        })
        .await?;

    let jar = set_session_cookies(jar, &state.config, &outcome.tokens);
    Ok((
        jar,
        ApiResponse::ok(
            LoginResponse {
                user: outcome.user,
                access_token: outcome.tokens.access_token,
                refresh_token: outcome.tokens.refresh_token,
            },
            "User logged in successfully",
        ),
    ))
}

async fn logout(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    jar: CookieJar,
) -> Result<(CookieJar, ApiResponse<Option<Empty>>)> {
    state.sessions.logout(&auth.user_id).await?;
    Ok((
        clear_session_cookies(jar, &state.config),
        ApiResponse::ok(None, "User logged out successfully"),
    ))
}

/// Pick the presented refresh token. A non-empty cookie wins over the body.
fn presented_refresh_token(jar: &CookieJar, body: &[u8]) -> Option<String> {
    let from_cookie = jar
        .get(REFRESH_COOKIE)
        .map(|cookie| cookie.value())
        .filter(|value| !value.is_empty())
        .map(str::to_string);
    if from_cookie.is_some() || body.is_empty() {
        return from_cookie;
    }
    serde_json::from_slice::<RefreshRequest>(body)
        .ok()
        .and_then(|req| req.refresh_token)
}

async fn refresh_token(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, ApiResponse<TokensResponse>)> {
    let presented = presented_refresh_token(&jar, &body);

    let tokens = state.sessions.refresh(presented.as_deref()).await?;

    let jar = set_session_cookies(jar, &state.config, &tokens);
    Ok((
        jar,
        ApiResponse::ok(
            TokensResponse {
                access_token: tokens.access_token,
                refresh_token: tokens.refresh_token,
            },
            "Access token refreshed",
        ),
    ))
}

async fn change_password(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    body: std::result::Result<Json<ChangePasswordRequest>, JsonRejection>,
) -> Result<ApiResponse<Empty>> {
    let req = json_body(body)?;
    state
        .sessions
        .change_password(&auth.user_id, &req.old_password, &req.new_password)
        .await?;
    Ok(ApiResponse::ok(Empty {}, "Password changed successfully"))
}

async fn current_user(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
) -> Result<ApiResponse<UserProfile>> {
    let user = state.accounts.current_user(&auth.user_id).await?;
    Ok(ApiResponse::ok(user, "Current user fetched successfully"))
}

async fn update_account(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    body: std::result::Result<Json<UpdateAccountRequest>, JsonRejection>,
) -> Result<ApiResponse<UserProfile>> {
    let req = json_body(body)?;
    let user = state
        .accounts
        .update_details(&auth.user_id, req.full_name, req.email)
        .await?;
    Ok(ApiResponse::ok(user, "Account details updated successfully"))
}

async fn update_avatar(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    let mut form = UploadForm::read(multipart, &state.config.upload_dir).await?;
    let user = state
        .accounts
        .update_avatar(&auth.user_id, form.take_file("avatar"))
        .await?;
    Ok(ApiResponse::ok(user, "Avatar image updated successfully"))
}

async fn update_cover_image(
    State(state): State<Arc<AppState>>,
    Extension(auth): Extension<AuthUser>,
    multipart: Multipart,
) -> Result<ApiResponse<UserProfile>> {
    let mut form = UploadForm::read(multipart, &state.config.upload_dir).await?;
    let user = state
        .accounts
        .update_cover_image(&auth.user_id, form.take_file("coverImage"))
        .await?;
    Ok(ApiResponse::ok(user, "Cover image updated successfully"))
}
