use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;

use crate::config::UploadConfig;
use crate::plugins::traits::ImageUploader;
use crate::{AppError, Result};

/// Uploads screenshots with a plain HTTP `PUT` into an S3-compatible bucket.
pub struct ObjectStoreUploader {
    client: Client,
    endpoint: String,
    bucket: String,
    public_base_url: String,
    key_prefix: String,
    auth_token: Option<String>,
}

impl ObjectStoreUploader {
    pub fn new(config: &UploadConfig, timeout_secs: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            bucket: config.bucket.trim_matches('/').to_string(),
            public_base_url: config.public_base_url.trim_end_matches('/').to_string(),
            key_prefix: config.key_prefix.trim_start_matches('/').to_string(),
            auth_token: config.auth_token.clone(),
        })
    }

    fn object_key(&self) -> String {
        format!("{}{}.png", self.key_prefix, uuid::Uuid::new_v4().simple())
    }
}

#[async_trait]
impl ImageUploader for ObjectStoreUploader {
    async fn upload(&self, png: Vec<u8>) -> Result<String> {
        let key = self.object_key();
        let target = format!("{}/{}/{}", self.endpoint, self.bucket, key);
        let size = png.len();

        let mut request = self
            .client
            .put(&target)
            .header(CONTENT_TYPE, "image/png")
            .body(png);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upload(format!("{} returned {}: {}", target, status, body)));
        }

        let url = format!("{}/{}", self.public_base_url, key);
        tracing::debug!("Uploaded {} bytes to {}", size, url);
        Ok(url)
    }
}
