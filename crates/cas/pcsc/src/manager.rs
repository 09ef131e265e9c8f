//! Device manager for PC/SC readers

use pcsc::{Context, Scope};

use crate::{
    config::PcscConfig, error::PcscError, reader::PcscReader, transceiver::PcscTransceiver,
};

/// Manager for PC/SC device operations
#[allow(missing_debug_implementations)]
pub struct PcscDeviceManager {
    context: Context,
}

impl PcscDeviceManager {
    /// Create a new PC/SC device manager
    pub fn new() -> Result<Self, PcscError> {
        let context = Context::establish(Scope::User)?;
        Ok(Self { context })
    }

    /// List all available card readers
    pub fn list_readers(&self) -> Result<Vec<PcscReader>, PcscError> {
        let readers = self.context.list_readers_owned()?;
        if readers.is_empty() {
            return Err(PcscError::NoReadersAvailable);
        }

        let mut result = Vec::with_capacity(readers.len());
        for reader_name in readers {
            let mut reader_states = [pcsc::ReaderState::new(
                reader_name.as_c_str(),
                pcsc::State::UNAWARE,
            )];

            match self.context.get_status_change(None, &mut reader_states) {
                Ok(()) => result.push(PcscReader::from_reader_state(&reader_states[0])),
                Err(_) => {
                    // If we can't get status, assume no card
                    result.push(PcscReader::new(
                        reader_name.to_string_lossy().into_owned(),
                        false,
                        None,
                    ));
                }
            }
        }

        Ok(result)
    }

    fn transceiver_for(
        &self,
        reader_name: &str,
        config: PcscConfig,
    ) -> Result<PcscTransceiver, PcscError> {
        let known = self
            .context
            .list_readers_owned()?
            .iter()
            .any(|name| name.to_string_lossy() == reader_name);
        if !known {
            return Err(PcscError::ReaderNotFound(reader_name.to_string()));
        }

        Ok(PcscTransceiver::new(
            self.context.clone(),
            reader_name.to_string(),
            config,
        ))
    }

    /// Open the named reader, or the first available one when no name is given
    pub fn open(
        &self,
        reader_name: Option<&str>,
        config: PcscConfig,
    ) -> Result<PcscTransceiver, PcscError> {
        match reader_name {
            Some(name) => self.transceiver_for(name, config),
            None => {
                let readers = self.list_readers()?;
                let first = readers.first().ok_or(PcscError::NoReadersAvailable)?;
                self.transceiver_for(first.name(), config)
            }
        }
    }
}
