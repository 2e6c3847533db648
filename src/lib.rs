//! Simple DB Library
//!
//! A minimal database access layer for MySQL and SQLite: per-session
//! connections with explicit transactions, a fluent SQL builder with
//! positional parameters, and mapping of result rows onto records.
//!
//! ```no_run
//! use simple_db::{DbConfig, SimpleDb, impl_record};
//!
//! #[derive(Debug, Default)]
//! struct Article {
//!     id: i64,
//!     title: String,
//!     is_blind: bool,
//! }
//!
//! impl_record!(Article { id, title, is_blind => "isBlind" });
//!
//! # async fn demo() -> simple_db::DbResult<()> {
//! let db = SimpleDb::open(DbConfig::mysql("localhost", "app", "secret", "blog")).await?;
//! let mut session = db.session();
//!
//! let id = session
//!     .gen_sql()
//!     .append("INSERT INTO article")
//!     .append_with("SET title = ?, isBlind = ?", simple_db::params!["title 1", false])
//!     .insert()
//!     .await?;
//!
//! let article: Option<Article> = session
//!     .gen_sql()
//!     .append_with("SELECT * FROM article WHERE id = ?", [id])
//!     .select_row_as()
//!     .await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod logging;
pub mod models;

pub use config::{DbConfig, LogConfig};
pub use db::{Session, SimpleDb, Sql, Statement};
pub use error::{DbError, DbResult};
pub use models::{DatabaseType, FromValue, Record, Row, Value};
