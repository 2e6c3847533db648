//! Statement execution engine.
//!
//! This module runs one statement on one connection with support for:
//! - Positional `?` parameters
//! - Optional per-statement timeouts
//! - Decoding result sets into [`Row`]s
//!
//! # Architecture
//!
//! The executor uses database-specific implementations organized in submodules:
//! - `mysql`: MySQL-specific execute and fetch operations
//! - `sqlite`: SQLite-specific execute and fetch operations
//!
//! Each submodule provides identical functionality adapted to the database's type system.

use crate::db::connection::DbConnection;
use crate::db::statement::placeholder_positions;
use crate::db::types::DecodeRow;
use crate::error::{DbError, DbResult};
use crate::models::{Row, Value};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;

/// What a data-changing statement reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    pub rows_affected: u64,
    /// Key generated by the statement, if the backend reported one.
    pub generated_key: Option<i64>,
}

/// Execute a statement that returns no rows.
pub async fn execute(
    conn: &mut DbConnection,
    sql: &str,
    params: &[Value],
    query_timeout: Option<Duration>,
) -> DbResult<WriteOutcome> {
    check_param_count(sql, params)?;
    impl_db_dispatch!(conn, {
        MySql(c) => mysql::execute(c, sql, params, query_timeout).await,
        SQLite(c) => sqlite::execute(c, sql, params, query_timeout).await,
    })
}

/// Execute a query and decode every row of its result.
pub async fn fetch_rows(
    conn: &mut DbConnection,
    sql: &str,
    params: &[Value],
    query_timeout: Option<Duration>,
) -> DbResult<Vec<Row>> {
    check_param_count(sql, params)?;
    impl_db_dispatch!(conn, {
        MySql(c) => mysql::fetch_rows(c, sql, params, query_timeout).await,
        SQLite(c) => sqlite::fetch_rows(c, sql, params, query_timeout).await,
    })
}

// =============================================================================
// Common Helper Functions
// =============================================================================

/// Reject a statement whose `?` placeholders and bound values differ in number.
///
/// SQLite binds NULL for missing values and ignores extra ones, so the
/// mismatch is caught here for every backend.
fn check_param_count(sql: &str, params: &[Value]) -> DbResult<()> {
    let placeholders = placeholder_positions(sql).len();
    if placeholders == params.len() {
        return Ok(());
    }
    Err(DbError::execution(
        format!(
            "statement has {} placeholder(s) but {} parameter(s) were bound",
            placeholders,
            params.len()
        ),
        None,
        "Check the bound parameter count",
    ))
}

async fn run_bounded<T, F>(operation: &str, limit: Option<Duration>, fut: F) -> DbResult<T>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match limit {
        Some(limit) => match timeout(limit, fut).await {
            Ok(result) => result.map_err(DbError::from),
            Err(_) => Err(timeout_error(operation, limit)),
        },
        None => fut.await.map_err(DbError::from),
    }
}

fn timeout_error(operation: &str, limit: Duration) -> DbError {
    DbError::timeout(operation, limit.as_secs())
}

fn decode_rows<R: DecodeRow>(rows: Vec<R>) -> DbResult<Vec<Row>> {
    rows.iter().map(DecodeRow::decode_row).collect()
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_value;
    use sqlx::MySqlConnection;

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Value],
        query_timeout: Option<Duration>,
    ) -> DbResult<WriteOutcome> {
        // When params is empty, execute raw SQL directly to avoid prepared statement issues
        // (some SQL like CREATE PROCEDURE doesn't support prepared statements)
        let result = if params.is_empty() {
            run_bounded(
                "write operation",
                query_timeout,
                sqlx::Executor::execute(&mut *conn, sql),
            )
            .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_value(query, param);
            }
            run_bounded("write operation", query_timeout, query.execute(&mut *conn)).await?
        };

        // MySQL reports 0 when no AUTO_INCREMENT value was generated
        let generated_key = match result.last_insert_id() {
            0 => None,
            id => Some(i64::try_from(id).map_err(|_| {
                DbError::mapping(format!("generated key {} does not fit in i64", id))
            })?),
        };

        Ok(WriteOutcome {
            rows_affected: result.rows_affected(),
            generated_key,
        })
    }

    pub async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[Value],
        query_timeout: Option<Duration>,
    ) -> DbResult<Vec<Row>> {
        let rows = if params.is_empty() {
            run_bounded(
                "query execution",
                query_timeout,
                sqlx::Executor::fetch_all(&mut *conn, sql),
            )
            .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_value(query, param);
            }
            run_bounded("query execution", query_timeout, query.fetch_all(&mut *conn)).await?
        };
        decode_rows(rows)
    }
}

mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_value;
    use sqlx::SqliteConnection;

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Value],
        query_timeout: Option<Duration>,
    ) -> DbResult<WriteOutcome> {
        let result = if params.is_empty() {
            run_bounded(
                "write operation",
                query_timeout,
                sqlx::Executor::execute(&mut *conn, sql),
            )
            .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_value(query, param);
            }
            run_bounded("write operation", query_timeout, query.execute(&mut *conn)).await?
        };

        // last_insert_rowid is per connection and survives later statements,
        // so it only counts when this statement changed rows
        let generated_key = (result.rows_affected() > 0 && result.last_insert_rowid() != 0)
            .then(|| result.last_insert_rowid());

        Ok(WriteOutcome {
            rows_affected: result.rows_affected(),
            generated_key,
        })
    }

    pub async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[Value],
        query_timeout: Option<Duration>,
    ) -> DbResult<Vec<Row>> {
        let rows = if params.is_empty() {
            run_bounded(
                "query execution",
                query_timeout,
                sqlx::Executor::fetch_all(&mut *conn, sql),
            )
            .await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_value(query, param);
            }
            run_bounded("query execution", query_timeout, query.fetch_all(&mut *conn)).await?
        };
        decode_rows(rows)
    }
}
