//! Configuration handling.
//!
//! Connection settings can be built in code ([`DbConfig::mysql`],
//! [`DbConfig::sqlite`]) or parsed from CLI arguments and `SIMPLEDB_*`
//! environment variables through clap.

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use clap::Parser;
use std::path::Path;
use std::time::Duration;
use url::Url;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_LOG_LEVEL: &str = "warn";

/// Fixed MySQL session options: UTF-8 text and UTC datetimes.
pub(crate) const MYSQL_CHARSET: &str = "utf8mb4";
pub(crate) const MYSQL_TIMEZONE: &str = "+00:00";

/// Connection settings for a [`SimpleDb`](crate::SimpleDb).
#[derive(Clone, Parser)]
#[command(
    name = "simple-db",
    about = "Connection settings for the simple-db access layer"
)]
pub struct DbConfig {
    /// Database backend (mysql or sqlite)
    #[arg(long, value_enum, default_value = "mysql", env = "SIMPLEDB_BACKEND")]
    pub backend: DatabaseType,

    /// Database server host (MySQL only)
    #[arg(long, default_value = DEFAULT_HOST, env = "SIMPLEDB_HOST")]
    pub host: String,

    /// Database server port (MySQL only)
    #[arg(long, default_value_t = DEFAULT_MYSQL_PORT, env = "SIMPLEDB_PORT")]
    pub port: u16,

    /// Login user (MySQL only)
    #[arg(long, default_value = "", env = "SIMPLEDB_USERNAME")]
    pub username: String,

    /// Login password (MySQL only, never logged)
    #[arg(
        long,
        default_value = "",
        env = "SIMPLEDB_PASSWORD",
        hide_env_values = true
    )]
    pub password: String,

    /// Database name, or the database file path for SQLite
    #[arg(long, env = "SIMPLEDB_DATABASE")]
    pub database: String,

    /// Log every statement with its parameters
    #[arg(long, env = "SIMPLEDB_DEV_MODE")]
    pub dev_mode: bool,

    /// Per-statement timeout in seconds (unbounded when unset)
    #[arg(long = "query-timeout", value_name = "SECS", env = "SIMPLEDB_QUERY_TIMEOUT")]
    pub query_timeout_secs: Option<u64>,

    /// Connection open timeout in seconds (unbounded when unset)
    #[arg(
        long = "connect-timeout",
        value_name = "SECS",
        env = "SIMPLEDB_CONNECT_TIMEOUT"
    )]
    pub connect_timeout_secs: Option<u64>,
}

impl DbConfig {
    /// MySQL settings on the default port.
    pub fn mysql(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        database: impl Into<String>,
    ) -> Self {
        Self {
            backend: DatabaseType::MySQL,
            host: host.into(),
            port: DEFAULT_MYSQL_PORT,
            username: username.into(),
            password: password.into(),
            database: database.into(),
            dev_mode: false,
            query_timeout_secs: None,
            connect_timeout_secs: None,
        }
    }

    /// SQLite settings for a database file (created when missing).
    pub fn sqlite(path: impl AsRef<Path>) -> Self {
        Self {
            backend: DatabaseType::SQLite,
            host: String::new(),
            port: 0,
            username: String::new(),
            password: String::new(),
            database: path.as_ref().to_string_lossy().into_owned(),
            dev_mode: false,
            query_timeout_secs: None,
            connect_timeout_secs: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_dev_mode(mut self, dev_mode: bool) -> Self {
        self.dev_mode = dev_mode;
        self
    }

    /// Timeouts have whole-second resolution; a fractional second rounds up.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout_secs = Some(whole_secs_ceil(timeout));
        self
    }

    /// Rounded up to whole seconds like [`with_query_timeout`](Self::with_query_timeout).
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_secs = Some(whole_secs_ceil(timeout));
        self
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout(&self) -> Option<Duration> {
        self.query_timeout_secs.map(Duration::from_secs)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Option<Duration> {
        self.connect_timeout_secs.map(Duration::from_secs)
    }

    /// Check the settings before any connection is attempted.
    pub fn validate(&self) -> DbResult<()> {
        if self.database.trim().is_empty() {
            return Err(DbError::configuration(match self.backend {
                DatabaseType::MySQL => "database name must not be empty",
                DatabaseType::SQLite => "database file path must not be empty",
            }));
        }
        if self.backend == DatabaseType::MySQL {
            if self.host.trim().is_empty() {
                return Err(DbError::configuration("host must not be empty"));
            }
            if self.port == 0 {
                return Err(DbError::configuration("port must be greater than 0"));
            }
            if self.username.is_empty() {
                return Err(DbError::configuration("username must not be empty"));
            }
        }
        if self.query_timeout_secs == Some(0) {
            return Err(DbError::configuration(
                "query timeout must be greater than 0 seconds",
            ));
        }
        if self.connect_timeout_secs == Some(0) {
            return Err(DbError::configuration(
                "connect timeout must be greater than 0 seconds",
            ));
        }
        Ok(())
    }

    /// Connection URL including the fixed session options.
    ///
    /// Contains the password; use [`masked_connection_url`](Self::masked_connection_url)
    /// for anything that is logged or displayed.
    pub fn connection_url(&self) -> DbResult<String> {
        self.render_url(false)
    }

    /// Connection URL with the password replaced by `****`.
    pub fn masked_connection_url(&self) -> DbResult<String> {
        self.render_url(true)
    }

    fn render_url(&self, mask_password: bool) -> DbResult<String> {
        match self.backend {
            DatabaseType::SQLite => Ok(format!("sqlite:{}", self.database)),
            DatabaseType::MySQL => {
                let invalid = |what: &str| {
                    DbError::configuration(format!("cannot build connection URL: invalid {}", what))
                };

                let mut url = Url::parse(&format!("mysql://{}:{}", self.host, self.port))
                    .map_err(|_| invalid("host"))?;
                url.set_username(&self.username)
                    .map_err(|_| invalid("username"))?;
                if !self.password.is_empty() {
                    let password = if mask_password { "****" } else { &self.password };
                    url.set_password(Some(password))
                        .map_err(|_| invalid("password"))?;
                }
                url.set_path(&self.database);
                url.query_pairs_mut()
                    .append_pair("charset", MYSQL_CHARSET)
                    .append_pair("timezone", MYSQL_TIMEZONE);
                Ok(url.to_string())
            }
        }
    }
}

fn whole_secs_ceil(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("backend", &self.backend)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"****")
            .field("database", &self.database)
            .field("dev_mode", &self.dev_mode)
            .field("query_timeout_secs", &self.query_timeout_secs)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .finish()
    }
}

/// Settings for [`init_tracing`](crate::logging::init_tracing).
#[derive(Debug, Clone, Parser)]
pub struct LogConfig {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = DEFAULT_LOG_LEVEL, env = "SIMPLEDB_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SIMPLEDB_JSON_LOGS")]
    pub json_logs: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            json_logs: false,
        }
    }
}
