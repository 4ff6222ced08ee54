// serverbackup/src/registry/databases.rs
use serde::Deserialize;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use std::fmt;
use url::Url;

use crate::backup::db_dump::DumpExporter;
use crate::errors::{BackupError, Result};

pub const DEFAULT_CHARSET: &str = "utf8";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DriverType {
    #[default]
    Mysql,
    Postgres,
}

impl DriverType {
    pub fn scheme(self) -> &'static str {
        match self {
            DriverType::Mysql => "mysql",
            DriverType::Postgres => "postgres",
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            DriverType::Mysql => 3306,
            DriverType::Postgres => 5432,
        }
    }
}

/// Everything needed to reach one database. `Debug` never prints the password.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionParams {
    pub driver: DriverType,
    pub host: String,
    pub port: Option<u16>,
    pub db_name: String,
    pub charset: String,
    pub user: String,
    pub password: String,
}

impl ConnectionParams {
    pub fn new(
        driver: DriverType,
        host: impl Into<String>,
        db_name: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver,
            host: host.into(),
            port: None,
            db_name: db_name.into(),
            charset: DEFAULT_CHARSET.to_string(),
            user: user.into(),
            password: password.into(),
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.driver.default_port())
    }

    /// Connection URL including credentials. Only ever handed to the driver.
    pub fn url(&self) -> Result<Url> {
        let invalid = |what: &str| {
            BackupError::Config(format!("invalid {} for database {}", what, self.redacted_dsn()))
        };

        let mut url = Url::parse(&format!(
            "{}://{}:{}",
            self.driver.scheme(),
            self.host,
            self.port()
        ))
        .map_err(|_| invalid("host"))?;
        url.set_path(&format!("/{}", self.db_name));
        url.set_username(&self.user).map_err(|_| invalid("user"))?;
        if !self.password.is_empty() {
            url.set_password(Some(&self.password))
                .map_err(|_| invalid("password"))?;
        }
        if self.driver == DriverType::Mysql {
            url.query_pairs_mut().append_pair("charset", &self.charset);
        }
        Ok(url)
    }

    /// DSN-like identifier safe to log: the password is replaced with `***`.
    pub fn redacted_dsn(&self) -> String {
        let secret = if self.password.is_empty() { "" } else { ":***" };
        format!(
            "{}://{}{}@{}:{}/{}",
            self.driver.scheme(),
            self.user,
            secret,
            self.host,
            self.port(),
            self.db_name
        )
    }

    pub fn redacted_context(&self) -> Value {
        json!({
            "driver": self.driver.scheme(),
            "host": self.host,
            "port": self.port(),
            "db_name": self.db_name,
            "charset": self.charset,
            "user": self.user,
        })
    }

    /// Archive directory that receives this database's table dumps.
    pub fn archive_namespace(&self) -> String {
        format!(".databases/{}@{}", self.user, self.host)
    }
}

impl fmt::Debug for ConnectionParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionParams")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port())
            .field("db_name", &self.db_name)
            .field("charset", &self.charset)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseEntry {
    params: ConnectionParams,
    table_allow_list: BTreeSet<String>,
}

impl DatabaseEntry {
    pub fn params(&self) -> &ConnectionParams {
        &self.params
    }

    /// An empty allow-list selects every table.
    pub fn includes_table(&self, table: &str) -> bool {
        self.table_allow_list.is_empty() || self.table_allow_list.contains(table)
    }
}

#[derive(Debug, Default)]
pub struct DatabaseRegistry {
    entries: Vec<DatabaseEntry>,
}

impl DatabaseRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probes the connection and keeps the entry only if the probe succeeds.
    pub async fn register(
        &mut self,
        exporter: &dyn DumpExporter,
        params: ConnectionParams,
        tables: impl IntoIterator<Item = String>,
    ) -> Result<&DatabaseEntry> {
        exporter.probe(&params).await?;
        self.entries.push(DatabaseEntry {
            params,
            table_allow_list: tables.into_iter().collect(),
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    pub fn entries(&self) -> &[DatabaseEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
