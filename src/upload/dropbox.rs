// serverbackup/src/upload/dropbox.rs
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_LENGTH, CONTENT_TYPE};
use serde_json::{Value, json};
use std::path::Path;

use super::{UploadResult, Uploader, file_body};
use crate::errors::{BackupError, Result};

pub const DEFAULT_CONTENT_BASE: &str = "https://content.dropboxapi.com/2";
const PROVIDER: &str = "dropbox";
const API_ARG_HEADER: &str = "Dropbox-API-Arg";

#[derive(Clone)]
pub struct DropboxConfig {
    pub token: String,
    pub content_base: String,
    /// `add` or `overwrite`.
    pub mode: String,
}

impl std::fmt::Debug for DropboxConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DropboxConfig")
            .field("content_base", &self.content_base)
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl DropboxConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            content_base: DEFAULT_CONTENT_BASE.to_string(),
            mode: "overwrite".to_string(),
        }
    }
}

pub struct DropboxUploader {
    config: DropboxConfig,
    client: reqwest::Client,
}

impl DropboxUploader {
    pub fn new(config: DropboxConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn api_arg(&self, remote_path: &str) -> String {
        let path = if remote_path.starts_with('/') {
            remote_path.to_string()
        } else {
            format!("/{}", remote_path)
        };
        header_safe_json(&json!({
            "path": path,
            "mode": self.config.mode,
            "autorename": false,
            "mute": false,
        }))
    }
}

/// HTTP headers must be ASCII, so every non-ASCII character is written as a
/// JSON `\uXXXX` escape.
fn header_safe_json(value: &Value) -> String {
    let mut out = String::new();
    for c in value.to_string().chars() {
        if c.is_ascii() {
            out.push(c);
        } else {
            let mut units = [0u16; 2];
            for unit in c.encode_utf16(&mut units) {
                out.push_str(&format!("\\u{:04x}", unit));
            }
        }
    }
    out
}

#[async_trait]
impl Uploader for DropboxUploader {
    fn provider(&self) -> &'static str {
        PROVIDER
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<UploadResult> {
        let url = format!("{}/files/upload", self.config.content_base.trim_end_matches('/'));
        let (body, len) = file_body(local_path).await?;

        let res = self
            .client
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", self.config.token))
            .header(CONTENT_TYPE, "application/octet-stream")
            .header(CONTENT_LENGTH, len)
            .header(API_ARG_HEADER, self.api_arg(remote_path))
            .body(body)
            .send()
            .await?;

        let status = res.status();
        let body = res.text().await?;

        // Success is judged by the returned metadata, not the status line.
        let metadata: Option<Value> = serde_json::from_str(&body).ok();
        match metadata {
            Some(metadata) if metadata.get("path_display").is_some() => Ok(UploadResult {
                provider: PROVIDER,
                remote_path: remote_path.to_string(),
                provider_metadata: metadata,
            }),
            _ => Err(BackupError::UploadTransfer {
                provider: PROVIDER,
                status: status.as_u16(),
                body,
            }),
        }
    }
}
