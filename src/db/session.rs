//! Per-context sessions.
//!
//! A [`Session`] confines one connection to the task that owns it. Every
//! builder created through [`Session::gen_sql`] borrows the session mutably,
//! so statements on one session run strictly one after another and all of
//! them see the same connection (and therefore the same open transaction).

use crate::db::connection::ConnectionHandle;
use crate::db::executor::{self, WriteOutcome};
use crate::db::manager::SimpleDb;
use crate::db::statement::Sql;
use crate::error::{DbError, DbResult};
use crate::models::{Row, Value};
use tracing::warn;

/// A task-scoped connection holder.
///
/// The connection is opened on first use and reopened transparently when the
/// previous one was closed or lost. Dropping the session drops the
/// connection; an open transaction is then discarded by the server.
#[derive(Debug)]
pub struct Session {
    db: SimpleDb,
    handle: Option<ConnectionHandle>,
}

impl Session {
    pub(crate) fn new(db: SimpleDb) -> Self {
        Self { db, handle: None }
    }

    /// The manager this session belongs to.
    pub fn db(&self) -> &SimpleDb {
        &self.db
    }

    /// Get this session's connection, opening a new one if there is none or
    /// the current one is no longer usable.
    pub async fn connection(&mut self) -> DbResult<&mut ConnectionHandle> {
        if let Some(stale) = self.handle.take_if(|h| h.is_broken()) {
            warn!(serial = stale.serial(), "Discarding broken connection");
        }
        if self.handle.is_none() {
            self.handle = Some(self.db.open_connection().await?);
        }
        self.handle
            .as_mut()
            .ok_or_else(|| DbError::internal("connection slot empty after open"))
    }

    /// Serial number of the current connection, if one is open.
    pub fn connection_serial(&self) -> Option<u64> {
        self.handle.as_ref().map(ConnectionHandle::serial)
    }

    /// True between [`begin_transaction`](Self::begin_transaction) and the
    /// matching commit or rollback.
    pub fn in_transaction(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_autocommit())
    }

    /// Execute a statement without parameters and return the affected row count.
    pub async fn run(&mut self, sql: &str) -> DbResult<u64> {
        self.run_with(sql, &[]).await
    }

    /// Execute a statement, binding `params` to its `?` placeholders in order.
    pub async fn run_with(&mut self, sql: &str, params: &[Value]) -> DbResult<u64> {
        Ok(self.execute(sql, params).await?.rows_affected)
    }

    /// Leave autocommit mode.
    ///
    /// Calling this while a transaction is already open does nothing; nested
    /// begins flatten into the outer transaction.
    pub async fn begin_transaction(&mut self) -> DbResult<()> {
        if self.in_transaction() {
            return Ok(());
        }
        let begin = self.db.database_type().begin_statement();
        let db = self.db.clone();
        let handle = self.connection().await?;
        db.log_event(handle.serial(), "Transaction started");
        let result = executor::execute(handle.connection_mut(), begin, &[], None).await;
        Self::settle(handle, result)?;
        handle.set_autocommit(false);
        Ok(())
    }

    /// Commit the open transaction and return to autocommit mode.
    ///
    /// No-op when no transaction is open.
    pub async fn commit(&mut self) -> DbResult<()> {
        self.finish_transaction("COMMIT", "Transaction committed")
            .await
    }

    /// Roll back the open transaction and return to autocommit mode.
    ///
    /// No-op when no transaction is open.
    pub async fn rollback(&mut self) -> DbResult<()> {
        self.finish_transaction("ROLLBACK", "Transaction rolled back")
            .await
    }

    async fn finish_transaction(&mut self, sql: &str, event: &str) -> DbResult<()> {
        let db = self.db.clone();
        let Some(handle) = self.handle.as_mut() else {
            return Ok(());
        };
        if handle.is_autocommit() {
            return Ok(());
        }
        db.log_event(handle.serial(), event);
        let result = executor::execute(handle.connection_mut(), sql, &[], None).await;
        // The transaction is over either way; a failed COMMIT leaves nothing to finish.
        handle.set_autocommit(true);
        Self::settle(handle, result)?;
        Ok(())
    }

    /// Close this session's connection. Idempotent.
    ///
    /// The next operation on the session opens a new connection.
    pub async fn close(&mut self) -> DbResult<()> {
        let Some(handle) = self.handle.take() else {
            return Ok(());
        };
        self.db.log_event(handle.serial(), "Connection closed");
        if handle.is_broken() {
            return Ok(());
        }
        handle.close().await
    }

    /// Start a new statement on this session.
    pub fn gen_sql(&mut self) -> Sql<'_> {
        Sql::new(self)
    }

    /// Log and execute one statement that returns no rows.
    pub(crate) async fn execute(&mut self, sql: &str, params: &[Value]) -> DbResult<WriteOutcome> {
        let db = self.db.clone();
        let handle = self.connection().await?;
        db.log_statement(handle.serial(), sql, params);
        let result =
            executor::execute(handle.connection_mut(), sql, params, db.query_timeout()).await;
        Self::settle(handle, result)
    }

    /// Log and execute one query, returning all of its rows.
    pub(crate) async fn fetch(&mut self, sql: &str, params: &[Value]) -> DbResult<Vec<Row>> {
        let db = self.db.clone();
        let handle = self.connection().await?;
        db.log_statement(handle.serial(), sql, params);
        let result =
            executor::fetch_rows(handle.connection_mut(), sql, params, db.query_timeout()).await;
        Self::settle(handle, result)
    }

    /// Mark the handle broken when `result` shows the connection cannot be trusted.
    fn settle<T>(handle: &mut ConnectionHandle, result: DbResult<T>) -> DbResult<T> {
        if let Err(e) = &result {
            if e.is_connection_lost() {
                warn!(serial = handle.serial(), error = %e, "Connection lost");
                handle.mark_broken();
            }
        }
        result
    }
}
