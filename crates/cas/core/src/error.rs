//! Core error type for buffer and policy handling
//!
//! Errors raised while shaping the byte buffers that flow between the card,
//! the broadcast side and the archive. Transceiver failures have their own
//! type in [`crate::transport::TransportError`].

/// Core error type
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum Error {
    /// ATR longer than the card can legally return
    #[error("ATR too long: {0} bytes (max {max})", max = crate::Atr::MAX_LEN)]
    AtrTooLong(usize),

    /// EMM payload does not fit the fixed packet area
    #[error("EMM too long: {0} bytes (max {max})", max = crate::EmmPacket::MAX_LEN)]
    EmmTooLong(usize),

    /// Binary EMM record has the wrong size or an inconsistent length field
    #[error("Invalid EMM record: {0}")]
    InvalidEmmRecord(&'static str),

    /// Nano selection could not be parsed
    #[error("Invalid nano selection: {0}")]
    InvalidNano(String),

    /// Hex decoding failed
    #[error("Hex decode error: {0}")]
    Hex(#[from] hex::FromHexError),
}

/// Result type for core operations
pub type Result<T> = core::result::Result<T, Error>;
