//! Multipart form handling for routes that accept image files.
//!
//! File parts are streamed to the upload directory and handed out as
//! [`TempUpload`]s, so any file nobody claims is deleted when the form drops.

use crate::error::AppError;
use crate::services::TempUpload;
use axum::extract::multipart::{Field, Multipart};
use std::collections::HashMap;
use std::path::Path;
use tokio::io::AsyncWriteExt;

/// Text fields and spooled files of a multipart request.
#[derive(Debug, Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    files: HashMap<String, TempUpload>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart, upload_dir: &Path) -> Result<Self, AppError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await.map_err(multipart_err)? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };

            if field.file_name().is_some() {
                let file = spool(field, upload_dir).await?;
                // First file wins; extras are dropped (and deleted).
                form.files.entry(name).or_insert(file);
            } else {
                let value = field.text().await.map_err(multipart_err)?;
                form.fields.entry(name).or_insert(value);
            }
        }

        Ok(form)
    }

    /// Text value of a field, empty string if absent.
    pub fn text(&mut self, name: &str) -> String {
        self.fields.remove(name).unwrap_or_default()
    }

    pub fn take_file(&mut self, name: &str) -> Option<TempUpload> {
        self.files.remove(name)
    }
}

fn multipart_err(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::bad_request(format!("Invalid multipart body: {}", e.body_text()))
}

/// Write one file part to `{upload_dir}/{uuid}.{ext}`.
async fn spool(mut field: Field<'_>, upload_dir: &Path) -> Result<TempUpload, AppError> {
    tokio::fs::create_dir_all(upload_dir)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Creating upload dir: {}", e)))?;

    let ext = field
        .file_name()
        .and_then(|n| Path::new(n).extension())
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()))
        .unwrap_or_else(|| "bin".to_string());
    let path = upload_dir.join(format!("{}.{}", uuid::Uuid::new_v4(), ext));

    let mut out = tokio::fs::File::create(&path)
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Creating upload file: {}", e)))?;
    // Owned from here on, so an error below still removes the partial file.
    let upload = TempUpload::new(path);

    while let Some(chunk) = field.chunk().await.map_err(multipart_err)? {
        out.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Writing upload file: {}", e)))?;
    }
    out.flush()
        .await
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Writing upload file: {}", e)))?;

    tracing::debug!(path = %upload.path().display(), "Upload spooled");
    Ok(upload)
}
