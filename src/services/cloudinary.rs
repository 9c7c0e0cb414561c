// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Cloudinary media host client.
//!
//! Uses the signed upload API: request parameters (minus `file` and
//! `api_key`) are sorted, joined as `k=v&k=v`, suffixed with the API secret
//! and hashed with SHA-256.

use crate::config::CloudinaryConfig;
use crate::error::AppError;
use crate::services::media::{MediaHost, UploadedAsset};
use async_trait::async_trait;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct DestroyResponse {
    result: String,
}

/// Cloudinary API client.
#[derive(Clone)]
pub struct CloudinaryClient {
    http: reqwest::Client,
    base_url: String,
    cloud_name: String,
    api_key: String,
    api_secret: String,
}

impl CloudinaryClient {
    pub fn new(config: &CloudinaryConfig) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            cloud_name: config.cloud_name.clone(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        })
    }

    fn endpoint(&self, resource_type: &str, action: &str) -> String {
        format!(
            "{}/v1_1/{}/{}/{}",
            self.base_url, self.cloud_name, resource_type, action
        )
    }

    /// Sign a set of request parameters.
    fn sign(&self, params: &[(&str, &str)]) -> String {
        let mut sorted = params.to_vec();
        sorted.sort_by(|a, b| a.0.cmp(b.0));
        let joined = sorted
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("&");

        let mut hasher = Sha256::new();
        hasher.update(joined.as_bytes());
        hasher.update(self.api_secret.as_bytes());
        hex::encode(hasher.finalize())
    }
}

fn timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

#[async_trait]
impl MediaHost for CloudinaryClient {
    async fn upload(&self, path: &Path) -> Result<UploadedAsset, AppError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::UploadFailed(format!("Reading {}: {}", path.display(), e)))?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload")
            .to_string();

        let timestamp = timestamp();
        let signature = self.sign(&[("timestamp", timestamp.as_str())]);

        let form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(file_name),
            )
            .text("api_key", self.api_key.clone())
            .text("timestamp", timestamp)
            .text("signature", signature)
            .text("signature_algorithm", "sha256");

        let response = self
            .http
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::UploadFailed(format!("Upload request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::UploadFailed(format!("HTTP {}: {}", status, body)));
        }

        let parsed: UploadResponse = response
            .json()
            .await
            .map_err(|e| AppError::UploadFailed(format!("JSON parse error: {}", e)))?;

        tracing::debug!(url = %parsed.secure_url, "Asset uploaded");
        Ok(UploadedAsset {
            secure_url: parsed.secure_url,
        })
    }

    async fn destroy(&self, public_id: &str) -> Result<(), AppError> {
        let timestamp = timestamp();
        let signature = self.sign(&[("public_id", public_id), ("timestamp", timestamp.as_str())]);

        let response = self
            .http
            .post(self.endpoint("image", "destroy"))
            .form(&[
                ("public_id", public_id),
                ("api_key", self.api_key.as_str()),
                ("timestamp", timestamp.as_str()),
                ("signature", signature.as_str()),
                ("signature_algorithm", "sha256"),
            ])
            .send()
            .await
            .map_err(|e| AppError::CleanupFailed(format!("Destroy request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::CleanupFailed(format!("HTTP {}: {}", status, body)));
        }

        let parsed: DestroyResponse = response
            .json()
            .await
            .map_err(|e| AppError::CleanupFailed(format!("JSON parse error: {}", e)))?;

        match parsed.result.as_str() {
            "ok" | "not found" => {
                tracing::debug!(public_id = %public_id, result = %parsed.result, "Asset destroyed");
                Ok(())
            }
            other => Err(AppError::CleanupFailed(format!(
                "Unexpected destroy result: {}",
                other
            ))),
        }
    }
}
