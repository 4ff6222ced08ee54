// serverbackup/src/backup/db_dump.rs
use async_trait::async_trait;
use sqlx::{Connection, MySqlConnection, PgConnection, Row};
use std::path::Path;
use std::process::Command;

use crate::errors::{BackupError, Result};
use crate::registry::{ConnectionParams, DriverType};
use crate::utils::find_executable;

/// Turns one (connection, table) pair into a standalone dump file on disk.
#[async_trait]
pub trait DumpExporter: Send + Sync {
    /// Fails with `DatabaseConnection` when the database cannot be reached.
    async fn probe(&self, params: &ConnectionParams) -> Result<()>;

    /// Base tables of the database, in whatever order the server reports them.
    async fn list_tables(&self, params: &ConnectionParams) -> Result<Vec<String>>;

    async fn export_table(
        &self,
        params: &ConnectionParams,
        table: &str,
        destination: &Path,
    ) -> Result<()>;
}

/// Probes and enumerates through `sqlx`, dumps through the vendor tool
/// (`pg_dump` or `mysqldump`).
#[derive(Debug, Default, Clone, Copy)]
pub struct SqlDumpExporter;

const PG_TABLES_QUERY: &str = "SELECT table_name::text FROM information_schema.tables \
     WHERE table_schema = 'public' AND table_type = 'BASE TABLE'";
const MYSQL_TABLES_QUERY: &str = "SELECT CAST(table_name AS CHAR) FROM information_schema.tables \
     WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'";

fn connection_error(params: &ConnectionParams, err: impl std::fmt::Display) -> BackupError {
    BackupError::DatabaseConnection {
        dsn: params.redacted_dsn(),
        params: params.redacted_context(),
        message: err.to_string(),
    }
}

fn listing_error(params: &ConnectionParams, err: impl std::fmt::Display) -> BackupError {
    BackupError::TableListing {
        dsn: params.redacted_dsn(),
        message: err.to_string(),
    }
}

/// `pg_dump --table` takes a pattern: unquoted names are case-folded and
/// `*`, `?`, `.` are wildcards. Quote the name so it matches exactly.
fn pg_table_arg(table: &str) -> String {
    format!("--table=\"{}\"", table.replace('"', "\"\""))
}

#[async_trait]
impl DumpExporter for SqlDumpExporter {
    async fn probe(&self, params: &ConnectionParams) -> Result<()> {
        let url = params.url()?;
        match params.driver {
            DriverType::Postgres => {
                let conn = PgConnection::connect(url.as_str())
                    .await
                    .map_err(|e| connection_error(params, e))?;
                conn.close().await.map_err(|e| connection_error(params, e))?;
            }
            DriverType::Mysql => {
                let conn = MySqlConnection::connect(url.as_str())
                    .await
                    .map_err(|e| connection_error(params, e))?;
                conn.close().await.map_err(|e| connection_error(params, e))?;
            }
        }
        tracing::debug!(dsn = %params.redacted_dsn(), "database reachable");
        Ok(())
    }

    async fn list_tables(&self, params: &ConnectionParams) -> Result<Vec<String>> {
        let url = params.url()?;
        let tables = match params.driver {
            DriverType::Postgres => {
                let mut conn = PgConnection::connect(url.as_str())
                    .await
                    .map_err(|e| connection_error(params, e))?;
                let rows = sqlx::query(PG_TABLES_QUERY)
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| listing_error(params, e))?;
                rows.iter()
                    .map(|row| row.try_get::<String, _>(0))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| listing_error(params, e))?
            }
            DriverType::Mysql => {
                let mut conn = MySqlConnection::connect(url.as_str())
                    .await
                    .map_err(|e| connection_error(params, e))?;
                let rows = sqlx::query(MYSQL_TABLES_QUERY)
                    .fetch_all(&mut conn)
                    .await
                    .map_err(|e| listing_error(params, e))?;
                rows.iter()
                    .map(|row| row.try_get::<String, _>(0))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| listing_error(params, e))?
            }
        };
        Ok(tables)
    }

    async fn export_table(
        &self,
        params: &ConnectionParams,
        table: &str,
        destination: &Path,
    ) -> Result<()> {
        let export_error = |message: String| BackupError::DumpExport {
            dsn: params.redacted_dsn(),
            table: table.to_string(),
            message,
        };

        let mut command = match params.driver {
            DriverType::Postgres => {
                let pg_dump = find_executable("pg_dump").map_err(|e| export_error(e.to_string()))?;
                let mut url = params.url()?;
                let _ = url.set_password(None);
                let mut cmd = Command::new(pg_dump);
                cmd.env("PGPASSWORD", &params.password)
                    .arg(pg_table_arg(table))
                    .arg(format!("--encoding={}", params.charset))
                    .arg("-f")
                    .arg(destination)
                    .arg(url.as_str());
                cmd
            }
            DriverType::Mysql => {
                let mysqldump =
                    find_executable("mysqldump").map_err(|e| export_error(e.to_string()))?;
                let mut cmd = Command::new(mysqldump);
                cmd.env("MYSQL_PWD", &params.password)
                    .arg(format!("--host={}", params.host))
                    .arg(format!("--port={}", params.port()))
                    .arg(format!("--user={}", params.user))
                    .arg(format!("--default-character-set={}", params.charset))
                    .arg("--single-transaction")
                    .arg(format!("--result-file={}", destination.display()))
                    .arg(&params.db_name)
                    .arg(table);
                cmd
            }
        };

        let output = command
            .output()
            .map_err(|e| export_error(format!("failed to execute dump tool: {}", e)))?;

        if !output.status.success() {
            return Err(export_error(format!(
                "dump tool exited with status {}\nStdout: {}\nStderr: {}",
                output.status,
                String::from_utf8_lossy(&output.stdout),
                String::from_utf8_lossy(&output.stderr)
            )));
        }
        tracing::debug!(table, destination = %destination.display(), "table dumped");
        Ok(())
    }
}
