// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Session lifecycle: login, refresh rotation, logout and password change.
//!
//! A user has at most one live refresh token, stored on the user record.
//! Rotation overwrites it with a compare-and-set, so a superseded token can
//! never be exchanged again, even by two racing requests.

use crate::db::refresh_token_matches;
use crate::error::AppError;
use crate::models::{User, UserProfile};
use crate::services::credentials::CredentialStore;
use crate::services::tokens::{TokenPair, TokenService};

const REFRESH_REUSED: &str = "Refresh token is expired or used";

/// Login identifiers as submitted; at least one of username or email is needed.
#[derive(Debug, Clone, Default)]
pub struct LoginCredentials {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

/// Result of a successful login.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: UserProfile,
    pub tokens: TokenPair,
}

#[derive(Clone)]
pub struct SessionService {
    credentials: CredentialStore,
    tokens: TokenService,
}

impl SessionService {
    pub fn new(credentials: CredentialStore, tokens: TokenService) -> Self {
        Self {
            credentials,
            tokens,
        }
    }

    /// Verify credentials and start a new session lineage.
    ///
    /// Any previously issued refresh token for the user stops working.
    pub async fn login(&self, creds: LoginCredentials) -> Result<LoginOutcome, AppError> {
        let username = normalize(creds.username);
        let email = normalize(creds.email);
        if username.is_none() && email.is_none() {
            return Err(AppError::bad_request("Username or Email is required"));
        }
        if creds.password.is_empty() {
            return Err(AppError::bad_request("Password is required"));
        }

        let user = self
            .credentials
            .find_for_login(username.as_deref(), email.as_deref())
            .await?
            .ok_or_else(|| AppError::NotFound("User does not exist".to_string()))?;

        if !self
            .credentials
            .verify_password(&user, &creds.password)
            .await?
        {
            tracing::info!(user_id = %user.id, "Login rejected: bad password");
            return Err(AppError::Unauthorized("Invalid password".to_string()));
        }

        let tokens = self.tokens.issue_pair(&user)?;
        if !self
            .credentials
            .set_refresh_token(&user.id, Some(tokens.refresh_token.clone()))
            .await?
        {
            return Err(AppError::NotFound("User does not exist".to_string()));
        }

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(LoginOutcome {
            user: UserProfile::from(&user),
            tokens,
        })
    }

    /// Exchange the live refresh token for a new pair.
    pub async fn refresh(&self, presented: Option<&str>) -> Result<TokenPair, AppError> {
        let presented = presented
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?;

        let claims = self.tokens.verify_refresh(presented).map_err(|e| {
            tracing::debug!(error = %e, "Refresh token rejected");
            AppError::from(e)
        })?;

        let user = self
            .credentials
            .get(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid refresh token".to_string()))?;

        if !refresh_token_matches(user.refresh_token.as_deref(), presented) {
            tracing::warn!(user_id = %user.id, "Superseded refresh token presented");
            return Err(AppError::Unauthorized(REFRESH_REUSED.to_string()));
        }

        let tokens = self.tokens.issue_pair(&user)?;
        let rotated = self
            .credentials
            .rotate_refresh_token(&user.id, presented, &tokens.refresh_token)
            .await?;
        if !rotated {
            // Lost the race to a concurrent refresh with the same token.
            tracing::warn!(user_id = %user.id, "Refresh token rotated concurrently");
            return Err(AppError::Unauthorized(REFRESH_REUSED.to_string()));
        }

        tracing::debug!(user_id = %user.id, "Refresh token rotated");
        Ok(tokens)
    }

    /// Revoke the session lineage. Safe to call repeatedly.
    pub async fn logout(&self, user_id: &str) -> Result<(), AppError> {
        let existed = self.credentials.set_refresh_token(user_id, None).await?;
        tracing::info!(user_id = %user_id, existed, "User logged out");
        Ok(())
    }

    /// Replace the password after checking the old one.
    ///
    /// The stored refresh token is left alone, so existing sessions survive.
    pub async fn change_password(
        &self,
        user_id: &str,
        old_password: &str,
        new_password: &str,
    ) -> Result<(), AppError> {
        let user = self
            .credentials
            .get(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        if !self.credentials.verify_password(&user, old_password).await? {
            return Err(AppError::Unauthorized("Invalid old password".to_string()));
        }
        if old_password == new_password {
            return Err(AppError::bad_request(
                "New password must be different from old password",
            ));
        }

        self.credentials
            .set_password(user_id, new_password)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id = %user_id, "Password changed");
        Ok(())
    }

    /// Resolve an access token to the user it was issued for.
    pub async fn authenticate(&self, access_token: Option<&str>) -> Result<User, AppError> {
        let token = access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized request".to_string()))?;

        let claims = self.tokens.verify_access(token)?;

        self.credentials
            .get(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Invalid access token".to_string()))
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
}
