pub(crate) mod dropbox;     // Single-step content POST
pub(crate) mod s3;          // S3-compatible object storage
pub(crate) mod yandex_disk; // Negotiate an upload URL, then PUT

use async_trait::async_trait;
use reqwest::Body;
use serde_json::Value;
use std::path::Path;
use tokio_util::io::ReaderStream;

use crate::backup::BackupPipeline;
use crate::config::UploadTarget;
use crate::errors::Result;

pub use dropbox::{DropboxConfig, DropboxUploader};
pub use s3::{S3Config, S3Uploader};
pub use yandex_disk::{YandexDiskConfig, YandexDiskUploader};

/// What a provider reported back for one successful upload.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResult {
    pub provider: &'static str,
    pub remote_path: String,
    pub provider_metadata: Value,
}

/// One remote storage provider. Each call is a single attempt: no retry, no
/// resumable transfer.
#[async_trait]
pub trait Uploader: Send + Sync {
    fn provider(&self) -> &'static str;

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<UploadResult>;
}

/// Streams a local file as a request body, with its length known up front.
pub(crate) async fn file_body(path: &Path) -> Result<(Body, u64)> {
    let file = tokio::fs::File::open(path).await?;
    let len = file.metadata().await?.len();
    Ok((Body::wrap_stream(ReaderStream::new(file)), len))
}

/// Uploads the pipeline's archive to each target in order. Every target is
/// attempted; the flow fails if any of them failed. The local archive is
/// removed only after the last target, and only when all uploads succeeded.
pub async fn run_upload_flow(
    pipeline: &mut BackupPipeline,
    targets: &[UploadTarget],
    remove_local_after_upload: bool,
) -> anyhow::Result<()> {
    let mut failed = Vec::new();
    for (index, target) in targets.iter().enumerate() {
        let uploader = target.uploader();
        let is_last = index + 1 == targets.len();
        let remove_local = remove_local_after_upload && is_last && failed.is_empty();

        match pipeline
            .upload(uploader.as_ref(), &target.remote_path, remove_local)
            .await
        {
            Ok(result) => println!(
                "✅ Uploaded to {} at {}",
                result.provider, result.remote_path
            ),
            Err(_) => failed.push(uploader.provider()),
        }
    }

    if !failed.is_empty() {
        anyhow::bail!("Upload failed for provider(s): {}", failed.join(", "));
    }
    Ok(())
}
