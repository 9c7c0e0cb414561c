// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Media upload coordination.
//!
//! Binary fields on the user record (avatar, cover image) point at assets on a
//! remote media host. Replacing one follows a fixed order: upload the new
//! asset, persist its URL, then destroy the old asset. A crash part-way leaves
//! at most an unreferenced remote asset, never a user pointing at a deleted
//! one.

use crate::error::AppError;
use crate::models::{MediaField, User};
use crate::services::credentials::CredentialStore;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Remote object storage for user media.
#[async_trait]
pub trait MediaHost: Send + Sync {
    /// Upload a local file and return where it is now hosted.
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, AppError>;

    /// Delete a hosted asset by its public ID. Deleting an asset that no
    /// longer exists is not an error.
    async fn destroy(&self, public_id: &str) -> Result<(), AppError>;
}

/// A successfully hosted asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedAsset {
    pub secure_url: String,
}

impl UploadedAsset {
    pub fn public_id(&self) -> Option<String> {
        public_id_from_url(&self.secure_url)
    }
}

/// Derive the host's public ID from an asset URL: the last path segment with
/// its extension removed.
pub fn public_id_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next().unwrap_or(path);
    let id = match segment.rsplit_once('.') {
        Some((stem, _)) => stem,
        None => segment,
    };
    (!id.is_empty()).then(|| id.to_string())
}

/// A local temporary file received with a request.
///
/// The file is deleted exactly once: by [`TempUpload::remove`] when the upload
/// step finishes, or by `Drop` on any path that never gets that far.
#[derive(Debug)]
pub struct TempUpload {
    path: PathBuf,
    removed: bool,
}

impl TempUpload {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            removed: false,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now.
    pub async fn remove(mut self) {
        self.removed = true;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.path.display(), error = %e, "Failed to remove temporary upload");
            }
        }
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if !self.removed {
            let _ = std::fs::remove_file(&self.path);
        }
    }
}

/// Uploads media and keeps user media fields consistent with the host.
#[derive(Clone)]
pub struct MediaService {
    host: Arc<dyn MediaHost>,
    credentials: CredentialStore,
}

impl MediaService {
    pub fn new(host: Arc<dyn MediaHost>, credentials: CredentialStore) -> Self {
        Self { host, credentials }
    }

    /// Upload a temporary file, consuming it.
    ///
    /// Any host failure yields `None`. The local file is gone afterwards
    /// either way.
    pub async fn upload(&self, file: TempUpload) -> Option<UploadedAsset> {
        let result = self.host.upload(file.path()).await;
        file.remove().await;

        match result {
            Ok(asset) => Some(asset),
            Err(e) => {
                tracing::warn!(error = %e, "Media upload failed");
                None
            }
        }
    }

    /// Best-effort removal of an asset nothing references.
    pub async fn discard(&self, asset: &UploadedAsset) {
        let Some(public_id) = asset.public_id() else {
            return;
        };
        if let Err(e) = self.host.destroy(&public_id).await {
            tracing::warn!(public_id = %public_id, error = %e, "Failed to discard orphaned asset");
        }
    }

    /// Replace a user's media field with a newly uploaded file.
    pub async fn replace(
        &self,
        user_id: &str,
        field: MediaField,
        file: Option<TempUpload>,
    ) -> Result<User, AppError> {
        let file = file.ok_or_else(|| AppError::bad_request(missing_file_message(field)))?;
        let label = field.label();

        let asset = self
            .upload(file)
            .await
            .ok_or_else(|| AppError::UploadFailed(format!("Failed to upload {}", label)))?;

        // Capture the old asset before the record changes.
        let current = match self.credentials.get(user_id).await {
            Ok(Some(user)) => user,
            Ok(None) => {
                self.discard(&asset).await;
                return Err(AppError::NotFound("User not found".to_string()));
            }
            Err(e) => {
                self.discard(&asset).await;
                return Err(e);
            }
        };
        let old_public_id = current.media_url(field).and_then(public_id_from_url);

        // A store error here is ambiguous (the write may have landed), so the
        // new asset is kept.
        let Some(updated) = self
            .credentials
            .set_media(user_id, field, asset.secure_url.clone())
            .await?
        else {
            self.discard(&asset).await;
            return Err(AppError::NotFound("User not found".to_string()));
        };

        if let Some(old) = old_public_id.filter(|old| Some(old) != asset.public_id().as_ref()) {
            self.host.destroy(&old).await.map_err(|e| {
                tracing::error!(user_id = %user_id, public_id = %old, error = %e, "Old asset not deleted");
                AppError::CleanupFailed(format!("Failed to delete old {}", label))
            })?;
        }

        tracing::info!(user_id = %user_id, field = label, "Media replaced");
        Ok(updated)
    }
}

fn missing_file_message(field: MediaField) -> &'static str {
    match field {
        MediaField::Avatar => "Avatar file is missing",
        MediaField::CoverImage => "Cover image file is missing",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryUserStore;
    use crate::models::NewUser;
    use crate::services::media_memory::MemoryMediaHost;

    #[test]
    fn test_public_id_from_url() {
        assert_eq!(
            public_id_from_url("https://res.cloudinary.com/demo/image/upload/v1/abc123.png"),
            Some("abc123".to_string())
        );
        assert_eq!(
            public_id_from_url("https://media.local/abc?x=1"),
            Some("abc".to_string())
        );
        assert_eq!(public_id_from_url("https://media.local/"), None);
        assert_eq!(public_id_from_url(""), None);
    }

    fn scratch_file(dir: &tempfile::TempDir, name: &str) -> TempUpload {
        let path = dir.path().join(name);
        std::fs::write(&path, b"bytes").unwrap();
        TempUpload::new(path)
    }

    #[tokio::test]
    async fn test_temp_upload_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let file = scratch_file(&dir, "a.png");
        let path = file.path().to_path_buf();
        drop(file);
        assert!(!path.exists());
    }

    async fn setup() -> (MediaService, Arc<MemoryMediaHost>, CredentialStore, User) {
        let host = Arc::new(MemoryMediaHost::new());
        let credentials = CredentialStore::new(Arc::new(MemoryUserStore::new()), 4);
        let user = credentials
            .create(NewUser {
                username: "ada".to_string(),
                email: "ada@x.com".to_string(),
                full_name: "Ada Lovelace".to_string(),
                password: "s3cret".to_string(),
                avatar: "https://media.local/old-avatar.png".to_string(),
                cover_image: None,
            })
            .await
            .unwrap();
        let media = MediaService::new(host.clone(), credentials.clone());
        (media, host, credentials, user)
    }

    #[tokio::test]
    async fn test_upload_removes_local_file_on_failure() {
        let (media, host, _, _) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        host.set_fail_uploads(true);

        let file = scratch_file(&dir, "a.png");
        let path = file.path().to_path_buf();
        assert!(media.upload(file).await.is_none());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_replace_destroys_old_asset() {
        let (media, host, _, user) = setup().await;
        let dir = tempfile::tempdir().unwrap();

        let updated = media
            .replace(&user.id, MediaField::Avatar, Some(scratch_file(&dir, "new.png")))
            .await
            .unwrap();

        assert_ne!(updated.avatar, user.avatar);
        assert!(host.was_destroyed("old-avatar"));
    }

    #[tokio::test]
    async fn test_replace_upload_failure_keeps_field() {
        let (media, host, credentials, user) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        host.set_fail_uploads(true);

        let err = media
            .replace(&user.id, MediaField::Avatar, Some(scratch_file(&dir, "new.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UploadFailed(ref m) if m == "Failed to upload avatar"));

        let reloaded = credentials.get(&user.id).await.unwrap().unwrap();
        assert_eq!(reloaded.avatar, user.avatar);
        assert!(host.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_replace_cleanup_failure_keeps_new_url() {
        let (media, host, credentials, user) = setup().await;
        let dir = tempfile::tempdir().unwrap();
        host.set_fail_destroys(true);

        let err = media
            .replace(&user.id, MediaField::Avatar, Some(scratch_file(&dir, "new.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::CleanupFailed(_)));

        let reloaded = credentials.get(&user.id).await.unwrap().unwrap();
        assert_ne!(reloaded.avatar, user.avatar);
    }

    #[tokio::test]
    async fn test_replace_cover_without_previous_asset() {
        let (media, host, _, user) = setup().await;
        let dir = tempfile::tempdir().unwrap();

        let updated = media
            .replace(
                &user.id,
                MediaField::CoverImage,
                Some(scratch_file(&dir, "cover.jpg")),
            )
            .await
            .unwrap();
        assert!(updated.cover_image.is_some());
        assert!(host.destroyed().is_empty());
    }

    #[tokio::test]
    async fn test_replace_requires_file() {
        let (media, _, _, user) = setup().await;
        let err = media
            .replace(&user.id, MediaField::CoverImage, None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest { ref message, .. } if message == "Cover image file is missing"));
    }

    #[tokio::test]
    async fn test_replace_unknown_user_discards_upload() {
        let (media, host, _, _) = setup().await;
        let dir = tempfile::tempdir().unwrap();

        let err = media
            .replace("nobody", MediaField::Avatar, Some(scratch_file(&dir, "new.png")))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(host.asset_count(), 0);
        assert_eq!(host.destroyed().len(), 1);
    }
}
