//! Logging initialization for the bridge service

use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::error::{BridgeError, Result};

/// Console log format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Compact,
    Json,
}

/// Initialize the global subscriber.
///
/// `RUST_LOG` takes precedence over `level` when set.
pub fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| BridgeError::config(format!("Invalid log level '{}': {}", level, e)))?,
    };

    let console_layer = match format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_names(true)
            .boxed(),
        LogFormat::Pretty => fmt::layer().with_target(true).boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()
        .map_err(|e| BridgeError::config(format!("Failed to initialize logging: {}", e)))
}
