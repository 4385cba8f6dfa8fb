//! Storage object endpoints

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Method;
use serde::Deserialize;

use super::{error_for_response, SupabaseClient};
use crate::error::{Result, StudymateError};
use crate::storage::{ObjectStorage, UploadOptions};

#[derive(Debug, Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL", alias = "signedUrl")]
    signed_url: String,
}

/// Object storage adapter for the hosted storage service
#[derive(Debug, Clone)]
pub struct SupabaseStorage {
    client: SupabaseClient,
}

impl SupabaseStorage {
    /// Adapter over `client`
    pub fn new(client: SupabaseClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ObjectStorage for SupabaseStorage {
    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Bytes,
        options: &UploadOptions,
    ) -> Result<()> {
        let size = bytes.len();
        let response = self
            .client
            .request(Method::POST, &format!("/storage/v1/object/{}/{}", bucket, path))
            .header(reqwest::header::CONTENT_TYPE, &options.content_type)
            .header(
                reqwest::header::CACHE_CONTROL,
                format!("max-age={}", options.cache_control),
            )
            .header("x-upsert", options.upsert.to_string())
            .body(bytes)
            .send()
            .await
            .map_err(|e| StudymateError::Storage(format!("upload request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_for_response("Storage", response, StudymateError::Storage).await.into());
        }
        tracing::debug!(bucket, path, size, "Stored object");
        Ok(())
    }

    async fn create_signed_url(&self, bucket: &str, path: &str, ttl_seconds: u64) -> Result<String> {
        let response = self
            .client
            .request(
                Method::POST,
                &format!("/storage/v1/object/sign/{}/{}", bucket, path),
            )
            .json(&serde_json::json!({ "expiresIn": ttl_seconds }))
            .send()
            .await
            .map_err(|e| StudymateError::Storage(format!("signing request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(error_for_response("Storage", response, StudymateError::Storage).await.into());
        }

        let signed: SignedUrlResponse = response.json().await?;
        if signed.signed_url.starts_with("http") {
            return Ok(signed.signed_url);
        }
        Ok(format!(
            "{}/storage/v1/{}",
            self.client.base_url(),
            signed.signed_url.trim_start_matches('/')
        ))
    }
}
