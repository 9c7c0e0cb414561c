//! Database layer.
//!
//! `UserStore` is the persistence seam of the credential store. Production uses
//! Firestore; `MemoryUserStore` backs local development and tests.

pub mod firestore;
pub mod memory;

pub use self::firestore::FirestoreDb;
pub use memory::MemoryUserStore;

use crate::error::AppError;
use crate::models::{MediaField, User};
use async_trait::async_trait;
use subtle::ConstantTimeEq;

/// Collection names as constants.
pub mod collections {
    pub const USERS: &str = "users";
    /// Username reservations (keyed by encoded username) backing uniqueness
    pub const USERNAMES: &str = "usernames";
    /// Email reservations (keyed by encoded email) backing uniqueness
    pub const EMAILS: &str = "emails";
}

/// Message used for every uniqueness violation.
pub const DUPLICATE_USER: &str = "User with this email or username already exists";

/// A single-document mutation of a user record.
///
/// Each variant touches only its own fields, so a password is re-hashed only
/// when a `PasswordHash` update is issued.
#[derive(Debug, Clone)]
pub enum UserUpdate {
    Details {
        full_name: Option<String>,
        email: Option<String>,
    },
    PasswordHash(String),
    Media {
        field: MediaField,
        url: String,
    },
    RefreshToken(Option<String>),
}

impl UserUpdate {
    /// Email this update wants to claim, if it differs from `current`.
    pub fn claimed_email(&self, current: &str) -> Option<&str> {
        match self {
            UserUpdate::Details {
                email: Some(email), ..
            } if email != current => Some(email.as_str()),
            _ => None,
        }
    }

    /// Apply the mutation in place and bump `updated_at`.
    pub fn apply(self, user: &mut User, now: &str) {
        match self {
            UserUpdate::Details { full_name, email } => {
                if let Some(full_name) = full_name {
                    user.full_name = full_name;
                }
                if let Some(email) = email {
                    user.email = email;
                }
            }
            UserUpdate::PasswordHash(hash) => user.password_hash = hash,
            UserUpdate::Media { field, url } => match field {
                MediaField::Avatar => user.avatar = url,
                MediaField::CoverImage => user.cover_image = Some(url),
            },
            UserUpdate::RefreshToken(token) => user.refresh_token = token,
        }
        user.updated_at = now.to_string();
    }
}

/// Persistence operations the credential store relies on.
///
/// Implementations must make `update_user` and `rotate_refresh_token` atomic
/// per document, and must reject duplicate usernames/emails themselves rather
/// than relying only on a prior existence check.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert a new user; `Conflict` if the username or email is taken.
    async fn insert_user(&self, user: &User) -> Result<(), AppError>;

    async fn get_user(&self, id: &str) -> Result<Option<User>, AppError>;

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    /// Apply `update` and return the new record, or `None` if the user is gone.
    async fn update_user(&self, id: &str, update: UserUpdate) -> Result<Option<User>, AppError>;

    /// Replace the stored refresh token with `next` only if it currently equals
    /// `presented`. Returns whether the swap happened.
    async fn rotate_refresh_token(
        &self,
        id: &str,
        presented: &str,
        next: &str,
    ) -> Result<bool, AppError>;
}

/// Constant-time comparison of a presented refresh token with the stored one.
pub fn refresh_token_matches(stored: Option<&str>, presented: &str) -> bool {
    match stored {
        Some(stored) => stored.as_bytes().ct_eq(presented.as_bytes()).into(),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refresh_token_matches() {
        assert!(refresh_token_matches(Some("abc"), "abc"));
        assert!(!refresh_token_matches(Some("abc"), "abd"));
        assert!(!refresh_token_matches(Some("abc"), "abcd"));
        assert!(!refresh_token_matches(None, "abc"));
    }

    #[test]
    fn test_claimed_email_ignores_unchanged() {
        let update = UserUpdate::Details {
            full_name: None,
            email: Some("ada@x.com".to_string()),
        };
        assert_eq!(update.claimed_email("ada@x.com"), None);
        assert_eq!(update.claimed_email("old@x.com"), Some("ada@x.com"));
        assert_eq!(
            UserUpdate::RefreshToken(None).claimed_email("ada@x.com"),
            None
        );
    }
}
