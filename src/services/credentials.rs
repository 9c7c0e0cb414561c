//! Credential store: user records plus the password rules that guard them.
//!
//! This is the only place a plaintext password is turned into a hash, and the
//! only writer of the stored refresh token.

use crate::db::{UserStore, UserUpdate, DUPLICATE_USER};
use crate::error::AppError;
use crate::models::{MediaField, NewUser, User};
use crate::services::password::{check_password_policy, hash_password, verify_password};
use crate::time_utils::now_rfc3339;
use std::sync::Arc;

#[derive(Clone)]
pub struct CredentialStore {
    store: Arc<dyn UserStore>,
    bcrypt_cost: u32,
}

impl CredentialStore {
    pub fn new(store: Arc<dyn UserStore>, bcrypt_cost: u32) -> Self {
        Self { store, bcrypt_cost }
    }

    /// Create a user, hashing the password on the way in.
    ///
    /// The existence check gives a clean `Conflict` in the common case; the
    /// store's own reservation check closes the race with a concurrent insert.
    pub async fn create(&self, new_user: NewUser) -> Result<User, AppError> {
        if self.exists(&new_user.username, &new_user.email).await? {
            return Err(AppError::Conflict(DUPLICATE_USER.to_string()));
        }
        check_password_policy(&new_user.password)?;

        let password_hash = hash_password(new_user.password, self.bcrypt_cost).await?;
        let now = now_rfc3339();
        let user = User {
            id: uuid::Uuid::new_v4().to_string(),
            username: new_user.username,
            email: new_user.email,
            full_name: new_user.full_name,
            password_hash,
            avatar: new_user.avatar,
            cover_image: new_user.cover_image,
            refresh_token: None,
            created_at: now.clone(),
            updated_at: now,
        };

        self.store.insert_user(&user).await?;
        tracing::info!(user_id = %user.id, username = %user.username, "User created");
        Ok(user)
    }

    /// Whether either the username or the email is already registered.
    pub async fn exists(&self, username: &str, email: &str) -> Result<bool, AppError> {
        Ok(self.store.find_by_username(username).await?.is_some()
            || self.store.find_by_email(email).await?.is_some())
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>, AppError> {
        self.store.get_user(id).await
    }

    /// Look a user up by username first, then by email.
    pub async fn find_for_login(
        &self,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<Option<User>, AppError> {
        if let Some(username) = username {
            if let Some(user) = self.store.find_by_username(username).await? {
                return Ok(Some(user));
            }
        }
        match email {
            Some(email) => self.store.find_by_email(email).await,
            None => Ok(None),
        }
    }

    pub async fn verify_password(&self, user: &User, candidate: &str) -> Result<bool, AppError> {
        verify_password(candidate.to_string(), user.password_hash.clone()).await
    }

    /// Hash and store a new password.
    pub async fn set_password(&self, id: &str, password: &str) -> Result<Option<User>, AppError> {
        check_password_policy(password)?;
        let hash = hash_password(password.to_string(), self.bcrypt_cost).await?;
        self.store
            .update_user(id, UserUpdate::PasswordHash(hash))
            .await
    }

    pub async fn update_details(
        &self,
        id: &str,
        full_name: Option<String>,
        email: Option<String>,
    ) -> Result<Option<User>, AppError> {
        self.store
            .update_user(id, UserUpdate::Details { full_name, email })
            .await
    }

    pub async fn set_media(
        &self,
        id: &str,
        field: MediaField,
        url: String,
    ) -> Result<Option<User>, AppError> {
        self.store
            .update_user(id, UserUpdate::Media { field, url })
            .await
    }

    /// Overwrite the stored refresh token; `None` revokes the session lineage.
    /// Returns false if the user no longer exists.
    pub async fn set_refresh_token(&self, id: &str, token: Option<String>) -> Result<bool, AppError> {
        Ok(self
            .store
            .update_user(id, UserUpdate::RefreshToken(token))
            .await?
            .is_some())
    }

    /// Swap `presented` for `next` only if `presented` is still the live token.
    pub async fn rotate_refresh_token(
        &self,
        id: &str,
        presented: &str,
        next: &str,
    ) -> Result<bool, AppError> {
        self.store.rotate_refresh_token(id, presented, next).await
    }
}
