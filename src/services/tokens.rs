// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! JWT issuance and verification for access and refresh tokens.
//!
//! The two token classes are signed with different secrets, so a token of one
//! class never verifies as the other.

use crate::config::Config;
use crate::error::AppError;
use crate::models::User;
use jsonwebtoken::{decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Which signing secret a token belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenClass {
    Access,
    Refresh,
}

impl fmt::Display for TokenClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenClass::Access => f.write_str("access"),
            TokenClass::Refresh => f.write_str("refresh"),
        }
    }
}

/// Verification failures. Deliberately carries no decoder detail.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("Invalid {0} token")]
    Invalid(TokenClass),

    #[error("Expired {0} token")]
    Expired(TokenClass),
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        AppError::Unauthorized(err.to_string())
    }
}

/// Access token claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Subject (user ID)
    pub sub: String,
    pub email: String,
    pub username: String,
    pub full_name: String,
    /// Unique token ID
    pub jti: String,
    /// Issued at (Unix timestamp)
    pub iat: usize,
    /// Expiration time (Unix timestamp)
    pub exp: usize,
}

/// Refresh token claims: only the user ID, to limit what a leaked token reveals.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RefreshClaims {
    pub sub: String,
    pub jti: String,
    pub iat: usize,
    pub exp: usize,
}

#[derive(Clone)]
struct SigningKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl SigningKeys {
    fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }
}

/// A freshly issued access/refresh pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Stateless signer/verifier for both token classes.
#[derive(Clone)]
pub struct TokenService {
    access: SigningKeys,
    refresh: SigningKeys,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenService {
    pub fn new(config: &Config) -> Self {
        Self {
            access: SigningKeys::from_secret(&config.access_token_secret),
            refresh: SigningKeys::from_secret(&config.refresh_token_secret),
            access_ttl: config.access_token_ttl,
            refresh_ttl: config.refresh_token_ttl,
        }
    }

    pub fn issue_access_token(&self, user: &User) -> Result<String, AppError> {
        let (iat, exp) = window(self.access_ttl);
        let claims = AccessClaims {
            sub: user.id.clone(),
            email: user.email.clone(),
            username: user.username.clone(),
            full_name: user.full_name.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat,
            exp,
        };
        self.sign(&claims, TokenClass::Access)
    }

    pub fn issue_refresh_token(&self, user: &User) -> Result<String, AppError> {
        let (iat, exp) = window(self.refresh_ttl);
        let claims = RefreshClaims {
            sub: user.id.clone(),
            jti: uuid::Uuid::new_v4().to_string(),
            iat,
            exp,
        };
        self.sign(&claims, TokenClass::Refresh)
    }

    pub fn issue_pair(&self, user: &User) -> Result<TokenPair, AppError> {
        Ok(TokenPair {
            access_token: self.issue_access_token(user)?,
            refresh_token: self.issue_refresh_token(user)?,
        })
    }

    /// Decode and validate a token of the given class.
    pub fn verify<C: DeserializeOwned>(&self, token: &str, class: TokenClass) -> Result<C, TokenError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        decode::<C>(token, &self.keys(class).decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => TokenError::Expired(class),
                _ => TokenError::Invalid(class),
            })
    }

    pub fn verify_access(&self, token: &str) -> Result<AccessClaims, TokenError> {
        self.verify(token, TokenClass::Access)
    }

    pub fn verify_refresh(&self, token: &str) -> Result<RefreshClaims, TokenError> {
        self.verify(token, TokenClass::Refresh)
    }

    fn keys(&self, class: TokenClass) -> &SigningKeys {
        match class {
            TokenClass::Access => &self.access,
            TokenClass::Refresh => &self.refresh,
        }
    }

    fn sign<C: Serialize>(&self, claims: &C, class: TokenClass) -> Result<String, AppError> {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &self.keys(class).encoding,
        )
        .map_err(|e| AppError::Internal(anyhow::anyhow!("JWT creation failed: {}", e)))
    }
}

/// `(iat, exp)` for a token issued now.
fn window(ttl: Duration) -> (usize, usize) {
    let now = chrono::Utc::now().timestamp().max(0) as usize;
    (now, now + ttl.as_secs() as usize)
}
