//! Error types for the PC/SC transceiver

use smartcas_core::TransportError;

/// PC/SC-specific errors
#[derive(Debug, thiserror::Error)]
pub enum PcscError {
    /// PC/SC error
    #[error("PC/SC error: {0}")]
    Pcsc(#[from] pcsc::Error),

    /// No readers available
    #[error("No readers available")]
    NoReadersAvailable,

    /// Reader not found
    #[error("Reader not found: {0}")]
    ReaderNotFound(String),

    /// No card present in reader
    #[error("No card present in reader: {0}")]
    NoCard(String),
}

impl From<PcscError> for TransportError {
    fn from(error: PcscError) -> Self {
        match error {
            PcscError::NoCard(_)
            | PcscError::Pcsc(
                pcsc::Error::NoSmartcard | pcsc::Error::RemovedCard | pcsc::Error::ResetCard,
            ) => Self::NoCard,
            PcscError::NoReadersAvailable
            | PcscError::ReaderNotFound(_)
            | PcscError::Pcsc(
                pcsc::Error::UnknownReader | pcsc::Error::ReaderUnavailable | pcsc::Error::NoService,
            ) => Self::Connection,
            PcscError::Pcsc(e) => Self::Other(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_card_errors_map_to_no_card() {
        assert_eq!(
            TransportError::from(PcscError::NoCard("ACS".into())),
            TransportError::NoCard
        );
        assert_eq!(
            TransportError::from(PcscError::Pcsc(pcsc::Error::RemovedCard)),
            TransportError::NoCard
        );
    }

    #[test]
    fn test_reader_errors_map_to_connection() {
        assert_eq!(
            TransportError::from(PcscError::ReaderNotFound("ACS".into())),
            TransportError::Connection
        );
        assert_eq!(
            TransportError::from(PcscError::Pcsc(pcsc::Error::ReaderUnavailable)),
            TransportError::Connection
        );
        assert!(matches!(
            TransportError::from(PcscError::Pcsc(pcsc::Error::Timeout)),
            TransportError::Other(_)
        ));
    }
}
