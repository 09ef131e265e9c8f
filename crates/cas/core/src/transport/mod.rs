//! Transceiver traits for communication with a card terminal
//!
//! A transceiver exchanges a command buffer for a response buffer with either
//! the terminal itself or the card inserted in it. Terminal commands follow the
//! CT-BCS basic command set described in [`ctbcs`].

pub mod ctbcs;
pub mod error;

use std::fmt;

pub use error::TransportError;
use tracing::{debug, trace};

/// Destination or source address of an exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
pub enum Address {
    /// The inserted card
    #[display("icc")]
    Icc,
    /// The terminal (reader interface)
    #[display("terminal")]
    Terminal,
    /// The host application
    #[display("host")]
    Host,
}

impl Address {
    /// Numeric CT-API address
    pub const fn code(self) -> u8 {
        match self {
            Self::Icc => 0,
            Self::Terminal => 1,
            Self::Host => 2,
        }
    }
}

/// Caller-allocated response buffer with a fixed maximum size
#[derive(Clone, PartialEq, Eq)]
pub struct ResponseBuffer {
    data: [u8; Self::CAPACITY],
    len: usize,
}

impl ResponseBuffer {
    /// Maximum number of response bytes
    pub const CAPACITY: usize = 260;

    /// Create an empty response buffer
    pub const fn new() -> Self {
        Self {
            data: [0; Self::CAPACITY],
            len: 0,
        }
    }

    /// Number of valid response bytes
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether no response bytes are held
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Valid response bytes
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Response bytes without the trailing two status bytes
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len.saturating_sub(2)]
    }

    /// First response byte, if any
    pub fn first(&self) -> Option<u8> {
        self.as_slice().first().copied()
    }

    /// First of the two trailing status bytes (SW1), if the response holds them
    pub fn sw1(&self) -> Option<u8> {
        self.len.checked_sub(2).map(|idx| self.data[idx])
    }

    /// Replace the contents with `bytes`
    pub fn fill(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        if bytes.len() > Self::CAPACITY {
            return Err(TransportError::BufferTooSmall);
        }
        self.data[..bytes.len()].copy_from_slice(bytes);
        self.len = bytes.len();
        Ok(())
    }

    /// Append `bytes` to the current contents
    pub fn extend(&mut self, bytes: &[u8]) -> Result<(), TransportError> {
        let end = self.len + bytes.len();
        if end > Self::CAPACITY {
            return Err(TransportError::BufferTooSmall);
        }
        self.data[self.len..end].copy_from_slice(bytes);
        self.len = end;
        Ok(())
    }

    /// Discard the contents
    pub const fn clear(&mut self) {
        self.len = 0;
    }
}

impl Default for ResponseBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ResponseBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ResponseBuffer")
            .field(&hex::encode(self.as_slice()))
            .finish()
    }
}

/// Trait for card terminal transceivers
///
/// A transceiver is a blocking exchange with a single outstanding request. It
/// has no knowledge of conditional-access protocols.
pub trait Transceiver: Send + fmt::Debug {
    /// Open and reset the terminal device
    fn init(&mut self) -> Result<(), TransportError>;

    /// Exchange `command` with `dad` and store the answer in `response`
    ///
    /// On error the response buffer keeps whatever the driver left in it, so
    /// callers may still inspect trailing status bytes.
    fn transmit(
        &mut self,
        dad: Address,
        sad: Address,
        command: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        trace!(%dad, %sad, command = %hex::encode(command), "Transmitting command");
        let result = self.do_transmit(dad, sad, command, response);
        match &result {
            Ok(()) => {
                trace!(response = %hex::encode(response.as_slice()), "Received response");
            }
            Err(e) => {
                debug!(error = %e, %dad, "Transceiver error during exchange");
            }
        }
        result
    }

    /// Internal implementation of transmit
    /// This is the method that concrete implementations should override
    fn do_transmit(
        &mut self,
        dad: Address,
        sad: Address,
        command: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError>;

    /// Switch the alternate (Irdeto) transmission convention on or off
    ///
    /// Terminals without such a mode ignore the hint.
    fn set_alternate_convention(&mut self, _enabled: bool) {}
}
