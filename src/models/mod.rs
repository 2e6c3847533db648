//! Data models for the database access layer.
//!
//! This module re-exports all model types used throughout the crate.

pub mod connection;
pub mod record;
pub mod row;
pub mod value;

// Re-export commonly used types
pub use connection::DatabaseType;
pub use record::Record;
pub use row::Row;
pub use value::{FromValue, Value, parse_datetime};
