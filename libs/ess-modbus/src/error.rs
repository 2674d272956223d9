//! Error types for Modbus framing, register encoding and exchanges

use thiserror::Error;

/// Result type for ess-modbus operations
pub type Result<T> = std::result::Result<T, ModbusError>;

/// Modbus error taxonomy
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ModbusError {
    /// Malformed or mismatched frame (short frame, bad protocol id,
    /// odd byte count, transaction id / function code / echo mismatch)
    #[error("Format error: {0}")]
    FormatError(String),

    /// Value outside the encodable domain
    #[error("Range error: {0}")]
    RangeError(String),

    /// Connection refused, timeout, stream closed mid-read
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Device answered with an exception PDU; the code is passed through as-is
    #[error("Modbus exception: function=0x{function_code:02X}, code=0x{code:02X}")]
    Exception { function_code: u8, code: u8 },

    /// Request function code the local server does not serve
    #[error("Unsupported function code: 0x{0:02X}")]
    Unsupported(u8),
}

impl ModbusError {
    pub fn format(msg: impl Into<String>) -> Self {
        ModbusError::FormatError(msg.into())
    }

    pub fn range(msg: impl Into<String>) -> Self {
        ModbusError::RangeError(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        ModbusError::TransportError(msg.into())
    }

    /// True for errors raised by the connection rather than by the peer's data
    pub fn is_transport(&self) -> bool {
        matches!(self, ModbusError::TransportError(_))
    }
}

impl From<std::io::Error> for ModbusError {
    fn from(err: std::io::Error) -> Self {
        ModbusError::TransportError(err.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for ModbusError {
    fn from(_: tokio::time::error::Elapsed) -> Self {
        ModbusError::TransportError("operation timed out".to_string())
    }
}
