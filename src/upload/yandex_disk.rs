// serverbackup/src/upload/yandex_disk.rs
use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH};
use serde::Deserialize;
use serde_json::json;
use std::path::Path;

use super::{UploadResult, Uploader, file_body};
use crate::errors::{BackupError, Result};

pub const DEFAULT_API_BASE: &str = "https://cloud-api.yandex.net/v1/disk";
const PROVIDER: &str = "yandex_disk";

#[derive(Clone)]
pub struct YandexDiskConfig {
    pub token: String,
    pub api_base: String,
    pub overwrite: bool,
}

impl std::fmt::Debug for YandexDiskConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("YandexDiskConfig")
            .field("api_base", &self.api_base)
            .field("overwrite", &self.overwrite)
            .finish_non_exhaustive()
    }
}

impl YandexDiskConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            overwrite: true,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadLink {
    href: Option<String>,
    method: Option<String>,
}

pub struct YandexDiskUploader {
    config: YandexDiskConfig,
    client: reqwest::Client,
}

impl YandexDiskUploader {
    pub fn new(config: YandexDiskConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    /// Step 1: ask the API for a one-off upload URL.
    async fn request_upload_link(&self, remote_path: &str) -> Result<String> {
        let url = format!("{}/resources/upload", self.config.api_base.trim_end_matches('/'));
        let res = self
            .client
            .get(url)
            .header(AUTHORIZATION, format!("OAuth {}", self.config.token))
            .query(&[
                ("path", remote_path),
                ("overwrite", if self.config.overwrite { "true" } else { "false" }),
            ])
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;
        let negotiation_error = || BackupError::UploadNegotiation {
            provider: PROVIDER,
            status: status.as_u16(),
            body: body.clone(),
        };

        if !status.is_success() {
            return Err(negotiation_error());
        }
        let link: UploadLink = serde_json::from_str(&body).map_err(|_| negotiation_error())?;
        if let Some(method) = link.method.as_deref() {
            tracing::debug!(method, "upload link negotiated");
        }
        link.href.ok_or_else(negotiation_error)
    }
}

#[async_trait]
impl Uploader for YandexDiskUploader {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<UploadResult> {
        let href = self.request_upload_link(remote_path).await?;

        // Step 2: PUT the raw bytes to the negotiated URL.
        let (body, len) = file_body(local_path).await?;
        let res = self
            .client
            .put(&href)
            .header(CONTENT_LENGTH, len)
            .body(body)
            .send()
            .await?;

        let status = res.status();
        if status != StatusCode::CREATED && status != StatusCode::ACCEPTED {
            return Err(BackupError::UploadTransfer {
                provider: PROVIDER,
                status: status.as_u16(),
                body: res.text().await.unwrap_or_default(),
            });
        }

        Ok(UploadResult {
            provider: PROVIDER,
            remote_path: remote_path.to_string(),
            provider_metadata: json!({ "href": href, "status": status.as_u16(), "bytes": len }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn uploader(server: &MockServer) -> YandexDiskUploader {
        YandexDiskUploader::new(YandexDiskConfig {
            token: "tok".to_string(),
            api_base: server.uri(),
            overwrite: true,
        })
    }

    fn archive(temp: &TempDir) -> std::path::PathBuf {
        let path = temp.path().join("backup.tar.gz");
        std::fs::write(&path, "archive-bytes").unwrap();
        path
    }

    #[tokio::test]
    async fn test_two_step_upload() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/resources/upload"))
            .and(query_param("path", "disk:/backups/backup.tar.gz"))
            .and(query_param("overwrite", "true"))
            .and(header("Authorization", "OAuth tok"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "href": format!("{}/upload-target", server.uri()),
                "method": "PUT",
                "templated": false
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload-target"))
            .and(body_string("archive-bytes"))
            .respond_with(ResponseTemplate::new(201))
            .expect(1)
            .mount(&server)
            .await;

        let result = uploader(&server)
            .upload(&archive(&temp), "disk:/backups/backup.tar.gz")
            .await
            .unwrap();

        assert_eq!(result.provider, "yandex_disk");
        assert_eq!(result.provider_metadata["status"], 201);
        assert_eq!(result.provider_metadata["bytes"], 13);
    }

    #[tokio::test]
    async fn test_rejected_negotiation_carries_status_and_body() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/resources/upload"))
            .respond_with(ResponseTemplate::new(401).set_body_string("{\"error\":\"UnauthorizedError\"}"))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let err = uploader(&server)
            .upload(&archive(&temp), "/b.tar.gz")
            .await
            .unwrap_err();

        match err {
            BackupError::UploadNegotiation { status, body, .. } => {
                assert_eq!(status, 401);
                assert!(body.contains("UnauthorizedError"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_missing_href_is_a_negotiation_error() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/resources/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "method": "PUT" })))
            .mount(&server)
            .await;

        let err = uploader(&server)
            .upload(&archive(&temp), "/b.tar.gz")
            .await
            .unwrap_err();

        assert!(matches!(err, BackupError::UploadNegotiation { status: 200, .. }));
    }

    #[tokio::test]
    async fn test_failed_put_is_a_transfer_error() {
        let server = MockServer::start().await;
        let temp = TempDir::new().unwrap();
        Mock::given(method("GET"))
            .and(path("/resources/upload"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "href": format!("{}/upload-target", server.uri())
            })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/upload-target"))
            .respond_with(ResponseTemplate::new(507).set_body_string("insufficient storage"))
            .mount(&server)
            .await;

        let err = uploader(&server)
            .upload(&archive(&temp), "/b.tar.gz")
            .await
            .unwrap_err();

        match err {
            BackupError::UploadTransfer { status, body, .. } => {
                assert_eq!(status, 507);
                assert_eq!(body, "insufficient storage");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
