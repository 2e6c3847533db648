//! Database access layer.
//!
//! This module provides database access functionality:
//! - Backend dispatch macros (declared first so every submodule sees them)
//! - Connection management and per-context sessions
//! - Statement building and execution
//! - Row decoding and parameter binding

#[macro_use]
pub mod macros;
pub mod connection;
pub mod executor;
pub mod manager;
pub mod params;
pub mod session;
pub mod statement;
pub mod types;

pub use connection::{ConnectionHandle, DbConnection};
pub use executor::WriteOutcome;
pub use manager::SimpleDb;
pub use session::Session;
pub use statement::{Sql, Statement};
