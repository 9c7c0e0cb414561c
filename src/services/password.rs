//! bcrypt password hashing.
//!
//! Hashing and verification are CPU-bound, so both run on the blocking pool to
//! keep request tasks responsive.

use crate::error::AppError;

/// bcrypt only looks at the first 72 bytes; longer passwords are rejected so
/// two different passwords can never verify against the same hash.
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Reject passwords bcrypt cannot represent faithfully.
pub fn check_password_policy(password: &str) -> Result<(), AppError> {
    if password.is_empty() {
        return Err(AppError::bad_request("Password is required"));
    }
    if password.len() > MAX_PASSWORD_BYTES {
        return Err(AppError::bad_request(format!(
            "Password must be at most {} bytes",
            MAX_PASSWORD_BYTES
        )));
    }
    Ok(())
}

/// Hash a password with a fresh random salt.
pub async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Hashing task failed: {}", e)))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password hashing failed: {}", e)))
}

/// Check a candidate password against a stored hash.
pub async fn verify_password(candidate: String, hash: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || bcrypt::verify(candidate, &hash))
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Verification task failed: {}", e)))?
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Password verification failed: {}", e)))
}
