//! Account mutations: registration and profile updates.

use crate::error::AppError;
use crate::models::{MediaField, NewUser, UserProfile};
use crate::services::credentials::CredentialStore;
use crate::services::media::{MediaService, TempUpload};
use crate::services::password::check_password_policy;
use validator::{Validate, ValidateEmail};

/// Registration form fields as submitted.
#[derive(Debug, Clone, Default, Validate)]
pub struct Registration {
    pub full_name: String,
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    pub password: String,
}

/// Files that may accompany a registration. Each is either present as a
/// local temporary file or absent.
#[derive(Debug, Default)]
pub struct RegistrationFiles {
    pub avatar: Option<TempUpload>,
    pub cover_image: Option<TempUpload>,
}

#[derive(Clone)]
pub struct AccountService {
    credentials: CredentialStore,
    media: MediaService,
}

impl AccountService {
    pub fn new(credentials: CredentialStore, media: MediaService) -> Self {
        Self { credentials, media }
    }

    /// Create an account. The user record is only written once the avatar is
    /// hosted, and uploaded assets are discarded if the record is not written.
    pub async fn register(
        &self,
        form: Registration,
        files: RegistrationFiles,
    ) -> Result<UserProfile, AppError> {
        if [&form.full_name, &form.username, &form.email, &form.password]
            .iter()
            .any(|f| f.trim().is_empty())
        {
            return Err(AppError::bad_request("All fields are required"));
        }

        let form = Registration {
            full_name: form.full_name.trim().to_string(),
            username: form.username.trim().to_lowercase(),
            email: form.email.trim().to_lowercase(),
            password: form.password,
        };
        if let Err(e) = form.validate() {
            return Err(AppError::BadRequest {
                message: "Invalid email format".to_string(),
                errors: vec![e.to_string()],
            });
        }
        check_password_policy(&form.password)?;

        if self.credentials.exists(&form.username, &form.email).await? {
            return Err(AppError::Conflict(crate::db::DUPLICATE_USER.to_string()));
        }

        let RegistrationFiles {
            avatar,
            cover_image,
        } = files;
        let avatar = avatar.ok_or_else(|| AppError::bad_request("Avatar is required"))?;

        let avatar = self
            .media
            .upload(avatar)
            .await
            .ok_or_else(|| AppError::UploadFailed("Failed to upload avatar".to_string()))?;

        let cover = match cover_image {
            Some(file) => {
                let uploaded = self.media.upload(file).await;
                if uploaded.is_none() {
                    tracing::warn!(username = %form.username, "Cover image upload failed, continuing without it");
                }
                uploaded
            }
            None => None,
        };

        let created = self
            .credentials
            .create(NewUser {
                username: form.username,
                email: form.email,
                full_name: form.full_name,
                password: form.password,
                avatar: avatar.secure_url.clone(),
                cover_image: cover.as_ref().map(|c| c.secure_url.clone()),
            })
            .await;

        match created {
            Ok(user) => {
                tracing::info!(user_id = %user.id, "User registered");
                Ok(UserProfile::from(user))
            }
            Err(e) => {
                self.media.discard(&avatar).await;
                if let Some(cover) = &cover {
                    self.media.discard(cover).await;
                }
                Err(e)
            }
        }
    }

    pub async fn current_user(&self, user_id: &str) -> Result<UserProfile, AppError> {
        self.credentials
            .get(user_id)
            .await?
            .map(UserProfile::from)
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))
    }

    /// Change full name and/or email.
    pub async fn update_details(
        &self,
        user_id: &str,
        full_name: Option<String>,
        email: Option<String>,
    ) -> Result<UserProfile, AppError> {
        let full_name = full_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let email = email
            .map(|e| e.trim().to_lowercase())
            .filter(|e| !e.is_empty());

        if full_name.is_none() && email.is_none() {
            return Err(AppError::bad_request("Full name or email is required"));
        }
        if let Some(email) = &email {
            if !email.validate_email() {
                return Err(AppError::BadRequest {
                    message: "Invalid email format".to_string(),
                    errors: vec![format!("email: {}", email)],
                });
            }
        }

        let user = self
            .credentials
            .update_details(user_id, full_name, email)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        tracing::info!(user_id = %user_id, "Account details updated");
        Ok(UserProfile::from(user))
    }

    pub async fn update_avatar(
        &self,
        user_id: &str,
        file: Option<TempUpload>,
    ) -> Result<UserProfile, AppError> {
        let user = self.media.replace(user_id, MediaField::Avatar, file).await?;
        Ok(UserProfile::from(user))
    }

    pub async fn update_cover_image(
        &self,
        user_id: &str,
        file: Option<TempUpload>,
    ) -> Result<UserProfile, AppError> {
        let user = self
            .media
            .replace(user_id, MediaField::CoverImage, file)
            .await?;
        Ok(UserProfile::from(user))
    }
}
