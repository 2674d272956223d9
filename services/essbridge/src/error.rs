//! Error handling for the polling bridge

use ess_modbus::ModbusError;
use thiserror::Error;

/// Bridge service error type
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration loading or validation errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Device communication errors
    #[error(transparent)]
    ModbusError(#[from] ModbusError),

    /// HTTP server errors (bind, serve)
    #[error("Server error: {0}")]
    ServerError(String),
}

/// Result type alias for the bridge
pub type Result<T> = std::result::Result<T, BridgeError>;

impl BridgeError {
    pub fn config(msg: impl Into<String>) -> Self {
        BridgeError::ConfigError(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        BridgeError::ServerError(msg.into())
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::IoError(err.to_string())
    }
}

impl From<figment::Error> for BridgeError {
    fn from(err: figment::Error) -> Self {
        BridgeError::ConfigError(err.to_string())
    }
}
