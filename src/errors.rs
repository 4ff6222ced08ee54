use serde_json::{Value, json};
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackupError {
    #[error("Invalid path: {}", .path.display())]
    InvalidPath { path: PathBuf },

    #[error("Database connection error ({dsn}): {message}")]
    DatabaseConnection {
        dsn: String,
        /// Connection parameters without the password.
        params: Value,
        message: String,
    },

    #[error("Failed to list tables of {dsn}: {message}")]
    TableListing { dsn: String, message: String },

    #[error("Failed to export table {table} from {dsn}: {message}")]
    DumpExport {
        dsn: String,
        table: String,
        message: String,
    },

    #[error("Fail on creating archive file {}: {source}", .path.display())]
    ArchiveOpen {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to add {} to archive as {destination}: {source}", .path.display())]
    ArchiveAppend {
        path: PathBuf,
        destination: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to finalize archive {}: {source}", .path.display())]
    ArchiveClose {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No backup archive has been created yet")]
    NoArchive,

    #[error("{provider}: upload negotiation failed (HTTP {status}): {body}")]
    UploadNegotiation {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("{provider}: upload transfer failed (HTTP {status}): {body}")]
    UploadTransfer {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),
}

impl BackupError {
    /// Structured data handed to the error sink alongside the message.
    pub fn context(&self) -> Value {
        match self {
            BackupError::InvalidPath { path } => json!({ "path": path }),
            BackupError::DatabaseConnection { dsn, params, .. } => {
                json!({ "dsn": dsn, "params": params })
            }
            BackupError::TableListing { dsn, .. } => json!({ "dsn": dsn }),
            BackupError::DumpExport { dsn, table, .. } => json!({ "dsn": dsn, "table": table }),
            BackupError::ArchiveOpen { path, source } | BackupError::ArchiveClose { path, source } => {
                json!({ "filepath": path, "error": source.to_string() })
            }
            BackupError::ArchiveAppend {
                path,
                destination,
                source,
            } => json!({
                "path": path,
                "destination": destination,
                "error": source.to_string(),
            }),
            BackupError::UploadNegotiation {
                provider,
                status,
                body,
            }
            | BackupError::UploadTransfer {
                provider,
                status,
                body,
            } => json!({ "provider": provider, "status": status, "body": body }),
            _ => Value::Null,
        }
    }
}

pub type Result<T> = std::result::Result<T, BackupError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_carries_http_details() {
        let err = BackupError::UploadNegotiation {
            provider: "yandex_disk",
            status: 401,
            body: "{\"error\":\"UnauthorizedError\"}".to_string(),
        };
        let ctx = err.context();
        assert_eq!(ctx["status"], 401);
        assert_eq!(ctx["provider"], "yandex_disk");
        assert!(err.to_string().contains("HTTP 401"));
    }

    #[test]
    fn test_context_for_invalid_path() {
        let err = BackupError::InvalidPath {
            path: PathBuf::from("/no/such/dir"),
        };
        assert_eq!(err.context()["path"], "/no/such/dir");
        assert_eq!(err.to_string(), "Invalid path: /no/such/dir");
    }

    #[test]
    fn test_connection_context_carries_params() {
        let err = BackupError::DatabaseConnection {
            dsn: "mysql://app:***@db:3306/shop".to_string(),
            params: json!({ "host": "db", "port": 3306 }),
            message: "refused".to_string(),
        };
        let ctx = err.context();
        assert_eq!(ctx["dsn"], "mysql://app:***@db:3306/shop");
        assert_eq!(ctx["params"]["port"], 3306);
    }

    #[test]
    fn test_context_is_null_for_plain_errors() {
        assert_eq!(BackupError::NoArchive.context(), Value::Null);
    }
}
