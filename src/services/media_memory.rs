//! In-process media host for local development and tests.

use crate::error::AppError;
use crate::services::media::{MediaHost, UploadedAsset};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

const BASE_URL: &str = "https://media.local";

/// Keeps uploaded assets in memory, keyed by public ID.
#[derive(Debug, Default)]
pub struct MemoryMediaHost {
    assets: DashMap<String, String>,
    destroyed: DashSet<String>,
    fail_uploads: AtomicBool,
    fail_destroys: AtomicBool,
}

impl MemoryMediaHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent upload fail.
    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent destroy fail.
    pub fn set_fail_destroys(&self, fail: bool) {
        self.fail_destroys.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, public_id: &str) -> bool {
        self.assets.contains_key(public_id)
    }

    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    pub fn was_destroyed(&self, public_id: &str) -> bool {
        self.destroyed.contains(public_id)
    }

    pub fn destroyed(&self) -> Vec<String> {
        self.destroyed.iter().map(|id| id.key().clone()).collect()
    }
}

#[async_trait]
impl MediaHost for MemoryMediaHost {
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, AppError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::UploadFailed("media host unavailable".to_string()));
        }
        tokio::fs::metadata(path)
            .await
            .map_err(|e| AppError::UploadFailed(format!("{}: {}", path.display(), e)))?;

        let public_id = uuid::Uuid::new_v4().simple().to_string();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let secure_url = format!("{}/{}.{}", BASE_URL, public_id, ext);
        self.assets.insert(public_id, secure_url.clone());

        Ok(UploadedAsset { secure_url })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), AppError> {
        if self.fail_destroys.load(Ordering::SeqCst) {
            return Err(AppError::CleanupFailed("media host unavailable".to_string()));
        }
        self.assets.remove(public_id);
        self.destroyed.insert(public_id.to_string());
        Ok(())
    }
}
