//! Backend dispatch and parameter macros.
//!
//! The dispatch macro generates the per-backend match arms over
//! [`DbConnection`](crate::db::connection::DbConnection) so each call site
//! stays linear while every backend keeps its concrete sqlx types.

/// Generate match arms over `DbConnection` variants.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::execute(c, sql, params).await,
///     SQLite(c) => sqlite::execute(c, sql, params).await,
/// });
/// ```
#[macro_export]
#[doc(hidden)]
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::connection::DbConnection::$variant($c) => $body,
            )+
        }
    };
}

/// Build a parameter list from heterogeneous values.
///
/// ```
/// use simple_db::{Value, params};
///
/// let params = params!["title 1", 3, None::<i64>];
/// assert_eq!(params, vec![Value::from("title 1"), Value::Int(3), Value::Null]);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::Value>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Value::from($value)),+]
    };
}

pub use impl_db_dispatch;
