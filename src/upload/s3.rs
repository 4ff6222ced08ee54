// serverbackup/src/upload/s3.rs
use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use serde_json::json;
use std::path::Path;

use super::{UploadResult, Uploader};
use crate::errors::{BackupError, Result};

const PROVIDER: &str = "s3";

/// S3-compatible object storage (AWS, DigitalOcean Spaces, MinIO, ...).
#[derive(Clone)]
pub struct S3Config {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub folder_prefix: Option<String>,
}

impl std::fmt::Debug for S3Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Config")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("bucket_name", &self.bucket_name)
            .field("folder_prefix", &self.folder_prefix)
            .finish_non_exhaustive()
    }
}

impl S3Config {
    /// Object key for `remote_path`, under the configured folder prefix.
    pub fn object_key(&self, remote_path: &str) -> String {
        let name = remote_path.trim_start_matches('/');
        match self.folder_prefix.as_deref().map(|p| p.trim_matches('/')) {
            Some(prefix) if !prefix.is_empty() => format!("{}/{}", prefix, name),
            _ => name.to_string(),
        }
    }
}

pub struct S3Uploader {
    config: S3Config,
}

impl S3Uploader {
    pub fn new(config: S3Config) -> Self {
        Self { config }
    }

    async fn client(&self) -> s3::Client {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&self.config.endpoint_url)
            .region(Region::new(self.config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &self.config.access_key_id,
                &self.config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ))
            .load()
            .await;
        s3::Client::new(&sdk_config)
    }

    async fn put_object(
        &self,
        key: &str,
        body: ByteStream,
    ) -> Result<s3::operation::put_object::PutObjectOutput> {
        self.client()
            .await
            .put_object()
            .bucket(&self.config.bucket_name)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(|e| {
                BackupError::Storage(format!(
                    "Failed to upload to S3 bucket {} with key {}: {}",
                    self.config.bucket_name,
                    key,
                    s3::error::DisplayErrorContext(&e)
                ))
            })
    }
}

#[async_trait]
impl Uploader for S3Uploader {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<UploadResult> {
        let key = self.config.object_key(remote_path);
        tracing::debug!(bucket = %self.config.bucket_name, %key, "uploading to S3");

        let body = ByteStream::from_path(local_path).await.map_err(|e| {
            BackupError::Storage(format!(
                "Failed to create ByteStream from file {}: {}",
                local_path.display(),
                e
            ))
        })?;

        let output = self.put_object(&key, body).await?;

        Ok(UploadResult {
            provider: PROVIDER,
            remote_path: remote_path.to_string(),
            provider_metadata: json!({
                "bucket": self.config.bucket_name,
                "key": key,
                "e_tag": output.e_tag(),
            }),
        })
    }
}
