//! Connection manager.
//!
//! [`SimpleDb`] holds the immutable connection settings and the process-wide
//! counters. It hands out [`Session`]s; each session owns its own connection,
//! so nothing here is locked while statements run.

use crate::config::{DbConfig, MYSQL_CHARSET, MYSQL_TIMEZONE};
use crate::db::connection::{ConnectTarget, ConnectionHandle};
use crate::db::session::Session;
use crate::error::DbResult;
use crate::logging::{ParamList, SQL_LOG_TARGET};
use crate::models::{DatabaseType, Value};
use sqlx::ConnectOptions;
use sqlx::mysql::MySqlConnectOptions;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug)]
struct DbInner {
    config: DbConfig,
    target: ConnectTarget,
    dev_mode: AtomicBool,
    next_serial: AtomicU64,
    live: Arc<AtomicUsize>,
}

/// Process-wide database manager.
///
/// Cheap to clone; clones share configuration, dev-mode flag and counters.
#[derive(Debug, Clone)]
pub struct SimpleDb {
    inner: Arc<DbInner>,
}

impl SimpleDb {
    /// Validate `config` and verify the database is reachable.
    ///
    /// One connection is opened and closed immediately so misconfiguration
    /// fails here rather than on first use.
    pub async fn open(config: DbConfig) -> DbResult<Self> {
        config.validate()?;
        let target = connect_target(&config);

        info!(
            backend = %config.backend,
            url = %config.masked_connection_url()?,
            dev_mode = config.dev_mode,
            "Opening database"
        );

        let probe = target.connect(config.connect_timeout()).await?;
        probe.close().await?;

        let db = Self {
            inner: Arc::new(DbInner {
                dev_mode: AtomicBool::new(config.dev_mode),
                config,
                target,
                next_serial: AtomicU64::new(0),
                live: Arc::new(AtomicUsize::new(0)),
            }),
        };
        debug!("Database reachable");
        Ok(db)
    }

    /// Create a new session. Its connection is opened on first use.
    pub fn session(&self) -> Session {
        Session::new(self.clone())
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    pub fn database_type(&self) -> DatabaseType {
        self.inner.config.backend
    }

    /// Whether statements are logged with their parameters.
    pub fn is_dev_mode(&self) -> bool {
        self.inner.dev_mode.load(Ordering::Relaxed)
    }

    pub fn set_dev_mode(&self, dev_mode: bool) {
        self.inner.dev_mode.store(dev_mode, Ordering::Relaxed);
    }

    /// Number of connections currently open across all sessions.
    pub fn live_connections(&self) -> usize {
        self.inner.live.load(Ordering::Acquire)
    }

    pub(crate) fn query_timeout(&self) -> Option<Duration> {
        self.inner.config.query_timeout()
    }

    /// Open a fresh connection with the next serial number.
    pub(crate) async fn open_connection(&self) -> DbResult<ConnectionHandle> {
        let conn = self
            .inner
            .target
            .connect(self.inner.config.connect_timeout())
            .await?;
        let serial = self.inner.next_serial.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(serial, "Opened connection");
        Ok(ConnectionHandle::new(
            conn,
            serial,
            Arc::clone(&self.inner.live),
        ))
    }

    /// Log a statement before it runs.
    pub(crate) fn log_statement(&self, serial: u64, sql: &str, params: &[Value]) {
        if self.is_dev_mode() {
            if params.is_empty() {
                info!(target: SQL_LOG_TARGET, serial, "{}", sql);
            } else {
                info!(target: SQL_LOG_TARGET, serial, "{} {}", sql, ParamList(params));
            }
        } else {
            debug!(target: SQL_LOG_TARGET, serial, sql = %sql, params = params.len(), "Executing statement");
        }
    }

    /// Log a connection or transaction event in dev mode.
    pub(crate) fn log_event(&self, serial: u64, event: &str) {
        if self.is_dev_mode() {
            info!(target: SQL_LOG_TARGET, serial, "{}", event);
        } else {
            debug!(target: SQL_LOG_TARGET, serial, "{}", event);
        }
    }
}

/// Build backend connect options from validated settings.
fn connect_target(config: &DbConfig) -> ConnectTarget {
    match config.backend {
        DatabaseType::MySQL => {
            let mut options = MySqlConnectOptions::new()
                .host(&config.host)
                .port(config.port)
                .username(&config.username)
                .database(&config.database)
                .charset(MYSQL_CHARSET)
                .timezone(Some(MYSQL_TIMEZONE.to_string()));
            if !config.password.is_empty() {
                options = options.password(&config.password);
            }
            ConnectTarget::MySql(options.disable_statement_logging())
        }
        DatabaseType::SQLite => {
            let options = SqliteConnectOptions::new()
                .filename(&config.database)
                .create_if_missing(true)
                .journal_mode(SqliteJournalMode::Wal)
                .foreign_keys(true);
            ConnectTarget::SQLite(options.disable_statement_logging())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DbError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_open_sqlite_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("open.db");
        let db = SimpleDb::open(DbConfig::sqlite(&path)).await.unwrap();

        assert!(path.exists());
        assert_eq!(db.database_type(), DatabaseType::SQLite);
        assert_eq!(db.live_connections(), 0);
        assert!(!db.is_dev_mode());

        db.set_dev_mode(true);
        assert!(db.clone().is_dev_mode());
    }

    #[tokio::test]
    async fn test_open_rejects_invalid_config() {
        let err = SimpleDb::open(DbConfig::sqlite("")).await.unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_open_unreachable_sqlite_path_fails() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("nested").join("x.db");
        let err = SimpleDb::open(DbConfig::sqlite(&path)).await.unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_serials_are_unique() {
        let dir = TempDir::new().unwrap();
        let db = SimpleDb::open(DbConfig::sqlite(dir.path().join("s.db")))
            .await
            .unwrap();

        let a = db.open_connection().await.unwrap();
        let b = db.open_connection().await.unwrap();
        assert_ne!(a.serial(), b.serial());
        assert_eq!(db.live_connections(), 2);

        drop(a);
        b.close().await.unwrap();
        assert_eq!(db.live_connections(), 0);
    }

    #[test]
    fn test_mysql_options_match_connection_url() {
        let config = DbConfig::mysql("db.local", "app", "p@ss", "blog").with_port(3307);
        let url = url::Url::parse(&config.connection_url().unwrap()).unwrap();
        let ConnectTarget::MySql(options) = connect_target(&config) else {
            panic!("expected MySQL options");
        };

        assert_eq!(Some(options.get_host()), url.host_str());
        assert_eq!(Some(options.get_port()), url.port());
        assert_eq!(options.get_username(), url.username());
        assert_eq!(options.get_database(), Some(url.path().trim_start_matches('/')));

        let query: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query.get("charset").map(String::as_str), Some(options.get_charset()));
        assert_eq!(query.get("charset").map(String::as_str), Some(MYSQL_CHARSET));
        assert_eq!(query.get("timezone").map(String::as_str), Some(MYSQL_TIMEZONE));
    }
}
