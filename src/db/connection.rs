//! Physical connections.
//!
//! Connections are opened one at a time (no pool): each [`Session`] owns at
//! most one [`ConnectionHandle`] for its whole lifetime.
//!
//! [`Session`]: crate::db::session::Session

use crate::error::{DbError, DbResult};
use crate::models::DatabaseType;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;

/// Database-specific connection (avoids AnyConnection limitations).
#[derive(Debug)]
pub enum DbConnection {
    MySql(MySqlConnection),
    SQLite(SqliteConnection),
}

impl DbConnection {
    /// Get the database type for this connection.
    pub fn db_type(&self) -> DatabaseType {
        match self {
            DbConnection::MySql(_) => DatabaseType::MySQL,
            DbConnection::SQLite(_) => DatabaseType::SQLite,
        }
    }

    /// Close the connection gracefully.
    pub async fn close(self) -> DbResult<()> {
        impl_db_dispatch!(self, {
            MySql(c) => c.close().await,
            SQLite(c) => c.close().await,
        })
        .map_err(DbError::from)
    }
}

/// Backend-specific options for opening a connection.
#[derive(Debug, Clone)]
pub enum ConnectTarget {
    MySql(MySqlConnectOptions),
    SQLite(SqliteConnectOptions),
}

impl ConnectTarget {
    /// Open a new connection, bounded by `connect_timeout` when set.
    pub async fn connect(&self, connect_timeout: Option<Duration>) -> DbResult<DbConnection> {
        let connecting = async {
            match self {
                ConnectTarget::MySql(options) => options.connect().await.map(DbConnection::MySql),
                ConnectTarget::SQLite(options) => {
                    options.connect().await.map(DbConnection::SQLite)
                }
            }
        };

        let result = match connect_timeout {
            Some(limit) => timeout(limit, connecting)
                .await
                .map_err(|_| DbError::timeout("connect", limit.as_secs()))?,
            None => connecting.await,
        };
        result.map_err(DbError::connect_failed)
    }
}

/// Decrements the shared live-connection count when dropped.
#[derive(Debug)]
struct LiveGuard(Arc<AtomicUsize>);

impl LiveGuard {
    fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        Self(counter)
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

/// An open connection plus the state a session tracks for it.
#[derive(Debug)]
pub struct ConnectionHandle {
    inner: DbConnection,
    serial: u64,
    autocommit: bool,
    broken: bool,
    _live: LiveGuard,
}

impl ConnectionHandle {
    pub(crate) fn new(inner: DbConnection, serial: u64, live: Arc<AtomicUsize>) -> Self {
        Self {
            inner,
            serial,
            autocommit: true,
            broken: false,
            _live: LiveGuard::new(live),
        }
    }

    /// Unique number assigned when the connection was opened.
    pub fn serial(&self) -> u64 {
        self.serial
    }

    pub fn db_type(&self) -> DatabaseType {
        self.inner.db_type()
    }

    /// False while a transaction is open.
    pub fn is_autocommit(&self) -> bool {
        self.autocommit
    }

    pub(crate) fn set_autocommit(&mut self, autocommit: bool) {
        self.autocommit = autocommit;
    }

    /// True once the connection was lost or timed out and must not be reused.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    pub(crate) fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub(crate) fn connection_mut(&mut self) -> &mut DbConnection {
        &mut self.inner
    }

    /// Close the underlying connection gracefully.
    pub(crate) async fn close(self) -> DbResult<()> {
        self.inner.close().await
    }
}
