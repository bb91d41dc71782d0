//! Tracing subscriber setup
//!
//! Logs go to stderr so command output on stdout stays machine-readable.

use crate::config::LoggingConfig;
use crate::errors::{ExecError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber
///
/// * `default_filter` -- used when `RUST_LOG` is not set (e.g. `"cmdexec=info"`)
/// * `json` -- emit JSON lines instead of the human-readable format
pub fn init_tracing(default_filter: &str, json: bool) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| ExecError::ConfigError(format!("Invalid log filter: {}", e)))?;

    let installed = if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    installed.map_err(|e| ExecError::ConfigError(format!("Failed to install logger: {}", e)))
}

/// Install the subscriber described by `[logging]`
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_tracing(&config.filter, config.json)
}
