//! Cloudinary media uploader
//!
//! Uploads reels with a signed multipart request to
//! `{api_url}/{cloud_name}/video/upload`, asking Cloudinary to re-encode the
//! video to 1080x1920 mp4 so the URL it returns is accepted by Instagram.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;

use crate::backends::{
    network_error, BackendResult, MediaUploader, UploadedMedia, MAX_CALL_DURATION,
};
use crate::config::CloudinaryConfig;
use crate::error::{PublishError, Result};

const REEL_TRANSFORMATION: &str = "w_1080,h_1920,c_fill/q_auto:good";
const REEL_FORMAT: &str = "mp4";
const UPLOAD_TIMEOUT: Duration = MAX_CALL_DURATION;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    secure_url: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

pub struct CloudinaryUploader {
    client: reqwest::Client,
    upload_url: String,
    api_key: String,
    api_secret: SecretString,
    folder: String,
}

impl CloudinaryUploader {
    pub fn new(config: &CloudinaryConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(UPLOAD_TIMEOUT)
            .build()
            .map_err(|e| network_error("Failed to build HTTP client", e))?;

        Ok(Self {
            client,
            upload_url: format!(
                "{}/{}/video/upload",
                config.api_url.trim_end_matches('/'),
                config.cloud_name
            ),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret()?,
            folder: config.folder.clone(),
        })
    }

    /// Parameters covered by the signature, sorted by name
    fn signed_params(&self, timestamp: i64) -> Vec<(&'static str, String)> {
        vec![
            ("folder", self.folder.clone()),
            ("format", REEL_FORMAT.to_string()),
            ("timestamp", timestamp.to_string()),
            ("transformation", REEL_TRANSFORMATION.to_string()),
        ]
    }
}

/// Cloudinary request signature: SHA-256 over `k1=v1&k2=v2...` + secret,
/// with parameters sorted by name
pub(crate) fn sign(params: &[(&str, String)], secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let joined = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let digest = Sha256::digest(format!("{}{}", joined, secret).as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl MediaUploader for CloudinaryUploader {
    async fn upload(&self, local_path: &Path) -> BackendResult<UploadedMedia> {
        let bytes = tokio::fs::read(local_path).await.map_err(|e| {
            PublishError::Upload(format!(
                "Could not read video file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let file_name = local_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "reel.mp4".to_string());

        tracing::debug!(
            path = %local_path.display(),
            bytes = bytes.len(),
            "Uploading video to Cloudinary"
        );

        let timestamp = chrono::Utc::now().timestamp();
        let params = self.signed_params(timestamp);
        let signature = sign(&params, self.api_secret.expose_secret());

        let file_part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("video/mp4")
            .map_err(|e| PublishError::Upload(format!("Invalid multipart body: {}", e)))?;

        let mut form = reqwest::multipart::Form::new()
            .part("file", file_part)
            .text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256");
        for (name, value) in params {
            form = form.text(name, value);
        }

        let response = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| network_error("Cloudinary upload request failed", e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(PublishError::Upload(format!(
                "Cloudinary returned {}: {}",
                status, message
            )));
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .map_err(|e| PublishError::Upload(format!("Invalid Cloudinary response: {}", e)))?;

        tracing::info!(public_url = %uploaded.secure_url, "Video uploaded to Cloudinary");

        Ok(UploadedMedia {
            public_url: uploaded.secure_url,
        })
    }

    fn name(&self) -> &str {
        "cloudinary"
    }
}
