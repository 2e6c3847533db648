//! Logging setup and statement log formatting.
//!
//! The crate only emits `tracing` events; installing a subscriber is left to
//! the application. [`init_tracing`] is a ready-made one.

use crate::config::LogConfig;
use crate::models::Value;
use std::fmt;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt as fmt_layer, prelude::*};

/// Target of statement and transaction log events.
///
/// Filter on it to see executed SQL, e.g. `RUST_LOG=simple_db::sql=info`.
pub const SQL_LOG_TARGET: &str = "simple_db::sql";

/// Initialize a global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `config.log_level`. Fails when a global
/// subscriber is already installed.
pub fn init_tracing(config: &LogConfig) -> Result<(), TryInitError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt_layer::layer().json()).try_init()
    } else {
        subscriber
            .with(fmt_layer::layer().with_target(true).with_thread_ids(false))
            .try_init()
    }
}

/// Renders bound parameters as `[1, 'title', NULL]` for statement logs.
pub(crate) struct ParamList<'a>(pub &'a [Value]);

impl fmt::Display for ParamList<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", value)?;
        }
        f.write_str("]")
    }
}
