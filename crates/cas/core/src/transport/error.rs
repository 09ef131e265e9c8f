//! Error types specific to card terminal transceivers

use thiserror::Error;

/// Transceiver error type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// The terminal device could not be opened
    #[error("Failed to connect to device")]
    Connection,

    /// The exchange with the terminal failed
    #[error("Failed to transmit data")]
    Transmission,

    /// No card is present in the terminal
    #[error("No card present")]
    NoCard,

    /// The terminal does not understand the command
    #[error("Unsupported terminal command: {0:02X?}")]
    Unsupported(Vec<u8>),

    /// Response did not fit the caller's buffer
    #[error("Buffer too small")]
    BufferTooSmall,

    /// Driver error (with code)
    #[error("Driver error code: {0}")]
    Driver(i32),

    /// Other error with message
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Create a new driver error
    pub const fn driver(code: i32) -> Self {
        Self::Driver(code)
    }

    /// Create a general other error
    pub fn other<S: Into<String>>(message: S) -> Self {
        Self::Other(message.into())
    }
}
