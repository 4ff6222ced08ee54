// serverbackup/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::registry::{ConnectionParams, DriverType};
use crate::upload::{
    DropboxConfig, DropboxUploader, S3Config, S3Uploader, Uploader, YandexDiskConfig,
    YandexDiskUploader,
};
use crate::upload::dropbox::DEFAULT_CONTENT_BASE;
use crate::upload::yandex_disk::DEFAULT_API_BASE;

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonPathEntry {
    pub path: PathBuf,
    pub relative: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonDatabaseEntry {
    #[serde(default)]
    pub driver: DriverType,
    pub host: String,
    pub port: Option<u16>,
    pub db_name: String,
    pub charset: Option<String>,
    pub user: String,
    pub password: Option<String>,
    pub password_env: Option<String>,
    #[serde(default)]
    pub tables: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "provider", rename_all = "snake_case")]
pub enum JsonUploadTarget {
    YandexDisk {
        token: Option<String>,
        token_env: Option<String>,
        remote_path: String,
        api_base: Option<String>,
        overwrite: Option<bool>,
    },
    Dropbox {
        token: Option<String>,
        token_env: Option<String>,
        remote_path: String,
        content_base: Option<String>,
        mode: Option<String>,
    },
    S3 {
        bucket_name: Option<String>,
        region: Option<String>,
        access_key_id: Option<String>,
        secret_access_key: Option<String>,
        endpoint_url: Option<String>,
        folder_prefix: Option<String>,
        remote_path: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub archive_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    #[serde(default)]
    pub paths: Vec<JsonPathEntry>,
    #[serde(default)]
    pub databases: Vec<JsonDatabaseEntry>,
    #[serde(default)]
    pub uploads: Vec<JsonUploadTarget>,
    #[serde(default)]
    pub remove_local_after_upload: bool,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub params: ConnectionParams,
    pub tables: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum ProviderConfig {
    YandexDisk(YandexDiskConfig),
    Dropbox(DropboxConfig),
    S3(S3Config),
}

#[derive(Debug, Clone)]
pub struct UploadTarget {
    pub provider: ProviderConfig,
    pub remote_path: String,
}

impl UploadTarget {
    pub fn uploader(&self) -> Box<dyn Uploader> {
        match &self.provider {
            ProviderConfig::YandexDisk(cfg) => Box::new(YandexDiskUploader::new(cfg.clone())),
            ProviderConfig::Dropbox(cfg) => Box::new(DropboxUploader::new(cfg.clone())),
            ProviderConfig::S3(cfg) => Box::new(S3Uploader::new(cfg.clone())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub archive_path: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub paths: Vec<JsonPathEntry>,
    pub databases: Vec<DatabaseConfig>,
    pub uploads: Vec<UploadTarget>,
    pub remove_local_after_upload: bool,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        Self::from_json_str(&config_content).with_context(|| {
            format!(
                "Failed to load configuration from {}",
                config_path.display()
            )
        })
    }

    pub fn from_json_str(config_content: &str) -> Result<Self> {
        let raw: RawJsonConfig =
            serde_json::from_str(config_content).context("Failed to parse JSON config")?;
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let databases = raw
            .databases
            .into_iter()
            .map(load_database_config)
            .collect::<Result<Vec<_>>>()?;
        let uploads = raw
            .uploads
            .into_iter()
            .map(load_upload_target)
            .collect::<Result<Vec<_>>>()?;

        if raw.paths.is_empty() && databases.is_empty() {
            println!("Warning: neither 'paths' nor 'databases' is configured. The archive will be empty.");
        }

        Ok(AppConfig {
            archive_path: raw.archive_path,
            temp_dir: raw.temp_dir,
            paths: raw.paths,
            databases,
            uploads,
            remove_local_after_upload: raw.remove_local_after_upload,
        })
    }
}

/// Resolves a secret given either inline or as the name of an environment
/// variable (`.env` is loaded before config parsing).
fn resolve_secret(inline: Option<String>, env_key: Option<String>, what: &str) -> Result<String> {
    match (inline.filter(|s| !s.is_empty()), env_key) {
        (Some(value), _) => Ok(value),
        (None, Some(key)) => {
            env::var(&key).with_context(|| format!("{} environment variable {} must be set", what, key))
        }
        (None, None) => Err(anyhow::anyhow!("{} or {}_env must be set in config.json", what, what)),
    }
}

fn load_database_config(raw: JsonDatabaseEntry) -> Result<DatabaseConfig> {
    if raw.host.trim().is_empty() || raw.db_name.trim().is_empty() || raw.user.trim().is_empty() {
        return Err(anyhow::anyhow!(
            "database entries need a non-empty host, db_name and user"
        ));
    }
    let password = match (&raw.password, &raw.password_env) {
        (None, None) => String::new(),
        _ => resolve_secret(raw.password, raw.password_env, "password")?,
    };

    let mut params = ConnectionParams::new(raw.driver, raw.host, raw.db_name, raw.user, password);
    if let Some(port) = raw.port {
        params = params.with_port(port);
    }
    if let Some(charset) = raw.charset.filter(|c| !c.is_empty()) {
        params.charset = charset;
    }

    Ok(DatabaseConfig {
        params,
        tables: raw.tables,
    })
}

fn load_upload_target(raw: JsonUploadTarget) -> Result<UploadTarget> {
    let target = match raw {
        JsonUploadTarget::YandexDisk {
            token,
            token_env,
            remote_path,
            api_base,
            overwrite,
        } => UploadTarget {
            provider: ProviderConfig::YandexDisk(YandexDiskConfig {
                token: resolve_secret(token, token_env, "token")?,
                api_base: api_base.unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
                overwrite: overwrite.unwrap_or(true),
            }),
            remote_path,
        },
        JsonUploadTarget::Dropbox {
            token,
            token_env,
            remote_path,
            content_base,
            mode,
        } => {
            let mode = mode.unwrap_or_else(|| "overwrite".to_string());
            if mode != "add" && mode != "overwrite" {
                return Err(anyhow::anyhow!(
                    "dropbox mode must be 'add' or 'overwrite', got '{}'",
                    mode
                ));
            }
            UploadTarget {
                provider: ProviderConfig::Dropbox(DropboxConfig {
                    token: resolve_secret(token, token_env, "token")?,
                    content_base: content_base.unwrap_or_else(|| DEFAULT_CONTENT_BASE.to_string()),
                    mode,
                }),
                remote_path,
            }
        }
        JsonUploadTarget::S3 {
            bucket_name,
            region,
            access_key_id,
            secret_access_key,
            endpoint_url,
            folder_prefix,
            remote_path,
        } => {
            if let (Some(bucket), Some(region), Some(key_id), Some(secret), Some(endpoint)) = (
                bucket_name.filter(|s| !s.is_empty()),
                region.filter(|s| !s.is_empty()),
                access_key_id.filter(|s| !s.is_empty()),
                secret_access_key.filter(|s| !s.is_empty()),
                endpoint_url.filter(|s| !s.is_empty()),
            ) {
                UploadTarget {
                    provider: ProviderConfig::S3(S3Config {
                        bucket_name: bucket,
                        region,
                        access_key_id: key_id,
                        secret_access_key: secret,
                        endpoint_url: endpoint,
                        folder_prefix: folder_prefix.filter(|s| !s.is_empty()),
                    }),
                    remote_path,
                }
            } else {
                return Err(anyhow::anyhow!(
                    "s3 upload target requires bucket_name, region, access_key_id, secret_access_key and endpoint_url"
                ));
            }
        }
    };

    if target.remote_path.trim().is_empty() {
        return Err(anyhow::anyhow!("remote_path cannot be empty in an upload target"));
    }
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_full_config() -> anyhow::Result<()> {
        let config = AppConfig::from_json_str(
            &json!({
                "archive_path": "backups/site.tar.gz",
                "paths": [
                    { "path": "/var/www", "relative": "www" },
                    { "path": "/etc/nginx" }
                ],
                "databases": [
                    { "host": "localhost", "db_name": "shop", "user": "root",
                      "password": "pw", "tables": ["users"] },
                    { "driver": "postgres", "host": "pg", "port": 6432, "db_name": "crm",
                      "user": "crm", "password": "pw2", "charset": "UTF8" }
                ],
                "uploads": [
                    { "provider": "yandex_disk", "token": "y", "remote_path": "disk:/b.tar.gz" },
                    { "provider": "dropbox", "token": "d", "remote_path": "/b.tar.gz", "mode": "add" }
                ],
                "remove_local_after_upload": true
            })
            .to_string(),
        )?;

        assert_eq!(config.archive_path, Some(PathBuf::from("backups/site.tar.gz")));
        assert_eq!(config.paths.len(), 2);
        assert_eq!(config.paths[0].relative.as_deref(), Some("www"));
        assert_eq!(config.paths[1].relative, None);

        let mysql = &config.databases[0].params;
        assert_eq!(mysql.driver, DriverType::Mysql);
        assert_eq!(mysql.port(), 3306);
        assert_eq!(mysql.charset, "utf8");
        assert_eq!(config.databases[0].tables, vec!["users"]);

        let pg = &config.databases[1].params;
        assert_eq!(pg.driver, DriverType::Postgres);
        assert_eq!(pg.port(), 6432);
        assert_eq!(pg.charset, "UTF8");

        assert_eq!(config.uploads.len(), 2);
        match &config.uploads[0].provider {
            ProviderConfig::YandexDisk(cfg) => {
                assert_eq!(cfg.token, "y");
                assert_eq!(cfg.api_base, DEFAULT_API_BASE);
                assert!(cfg.overwrite);
            }
            other => panic!("unexpected provider: {other:?}"),
        }
        match &config.uploads[1].provider {
            ProviderConfig::Dropbox(cfg) => assert_eq!(cfg.mode, "add"),
            other => panic!("unexpected provider: {other:?}"),
        }
        assert!(config.remove_local_after_upload);
        Ok(())
    }

    #[test]
    fn test_minimal_config_defaults() -> anyhow::Result<()> {
        let config = AppConfig::from_json_str(r#"{ "paths": [ { "path": "/srv" } ] }"#)?;
        assert!(config.archive_path.is_none());
        assert!(config.databases.is_empty());
        assert!(config.uploads.is_empty());
        assert!(!config.remove_local_after_upload);
        Ok(())
    }

    #[test]
    fn test_secret_from_environment() -> anyhow::Result<()> {
        // PATH is always present, which keeps this test free of env mutation.
        let path = env::var("PATH")?;
        let resolved = resolve_secret(None, Some("PATH".to_string()), "token")?;
        assert_eq!(resolved, path);

        let missing = resolve_secret(None, Some("SERVERBACKUP_SURELY_UNSET_VAR".to_string()), "token");
        assert!(missing.is_err());
        assert!(resolve_secret(None, None, "token").is_err());
        assert_eq!(resolve_secret(Some("inline".to_string()), None, "token")?, "inline");
        Ok(())
    }

    #[test]
    fn test_upload_without_token_is_rejected() {
        let result = AppConfig::from_json_str(
            r#"{ "uploads": [ { "provider": "dropbox", "remote_path": "/b.tar.gz" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_incomplete_s3_target_is_rejected() {
        let result = AppConfig::from_json_str(
            r#"{ "uploads": [ { "provider": "s3", "bucket_name": "b", "remote_path": "x" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_provider_is_rejected() {
        let result = AppConfig::from_json_str(
            r#"{ "uploads": [ { "provider": "ftp", "remote_path": "x" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_dropbox_mode() {
        let result = AppConfig::from_json_str(
            r#"{ "uploads": [ { "provider": "dropbox", "token": "t", "remote_path": "/x", "mode": "replace" } ] }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_database_without_password_connects_passwordless() -> anyhow::Result<()> {
        let config = AppConfig::from_json_str(
            r#"{ "databases": [ { "host": "h", "db_name": "d", "user": "u" } ] }"#,
        )?;
        assert_eq!(config.databases[0].params.password, "");
        Ok(())
    }
}
