//! Error types for the card session engine

use std::{io, path::PathBuf};

use smartcas_core::{CaId, TransportError};

/// Reader error type
#[derive(Debug, thiserror::Error)]
pub enum ReaderError {
    /// The terminal could not be opened or reset
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(#[source] TransportError),

    /// The terminal does not report a connected card
    #[error("Terminal reports no connected card")]
    CardNotConnected,

    /// Every ATR request failed
    #[error("Card activation failed after {attempts} attempts")]
    ActivationTimeout {
        /// Number of attempts made
        attempts: usize,
    },

    /// The card returned an unusable ATR
    #[error("Invalid ATR: {0}")]
    InvalidAtr(#[from] smartcas_core::Error),

    /// No registered card system claims the ATR
    #[error("Card system not supported")]
    CardSystemUnsupported,

    /// No initialised card is available
    #[error("Reader has no usable card")]
    NotReady,

    /// ECM was sent for a different CA system than the card's
    #[error("ECM for CA id {request} rejected by card with CA id {card}")]
    EcmRejected {
        /// CA id of the request
        request: CaId,
        /// CA id registered for the card
        card: CaId,
    },

    /// EMM nano is blocked by policy
    #[error("EMM with nano {nano:02X} blocked by policy")]
    EmmBlockedByPolicy {
        /// Nano type of the blocked EMM
        nano: u8,
    },

    /// Archival failed
    #[error(transparent)]
    Archive(#[from] ArchiveError),
}

/// EMM archive error type
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// File system access failed
    #[error("Archive I/O error on {path}: {source}")]
    Io {
        /// File being accessed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: io::Error,
    },

    /// Stored record is not a valid EMM
    #[error("Invalid archived EMM: {0}")]
    Record(#[from] smartcas_core::Error),
}

impl ArchiveError {
    /// Wrap an I/O error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
