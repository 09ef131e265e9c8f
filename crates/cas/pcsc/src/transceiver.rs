//! PC/SC transceiver
//!
//! PC/SC has no notion of the CT-BCS terminal commands the card session engine
//! issues, so they are emulated: resetting the terminal drops the card
//! connection, status queries read the reader state and requesting the ICC
//! (re)connects with a cold reset and answers with the card's ATR.

use std::{ffi::CString, fmt, time::Duration};

use pcsc::{Attribute, Card, Context, Disposition, ReaderState, State};
use smartcas_core::transport::{
    Address, ResponseBuffer, Transceiver, TransportError,
    ctbcs::{self, TerminalCommand},
};
use tracing::{debug, trace};

use crate::{config::PcscConfig, error::PcscError, reader::card_present};

/// Status bytes appended to a successful terminal command
const SW_OK: [u8; 2] = [0x90, 0x00];

/// Status bytes appended to the ATR of a processor card
const SW_ICC_ACTIVATED: [u8; 2] = [0x90, 0x01];

/// Terminal answer to a status query
pub(crate) const fn status_response(present: bool) -> [u8; 3] {
    let status = if present {
        ctbcs::DATA_STATUS_CARD_CONNECT
    } else {
        ctbcs::DATA_STATUS_NO_CARD
    };
    [status, SW_OK[0], SW_OK[1]]
}

/// Terminal answer to a request ICC command
pub(crate) fn request_icc_response(
    atr: &[u8],
    response: &mut ResponseBuffer,
) -> Result<(), TransportError> {
    response.fill(atr)?;
    response.extend(&SW_ICC_ACTIVATED)
}

/// Transceiver backed by a PC/SC reader
pub struct PcscTransceiver {
    context: Context,
    card: Option<Card>,
    reader_name: String,
    config: PcscConfig,
}

impl fmt::Debug for PcscTransceiver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PcscTransceiver")
            .field("reader_name", &self.reader_name)
            .field("has_card", &self.card.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl PcscTransceiver {
    pub(crate) const fn new(context: Context, reader_name: String, config: PcscConfig) -> Self {
        Self {
            context,
            card: None,
            reader_name,
            config,
        }
    }

    /// Get the reader name
    pub fn reader_name(&self) -> &str {
        &self.reader_name
    }

    /// Check if the transceiver is connected to a card
    pub const fn has_card(&self) -> bool {
        self.card.is_some()
    }

    fn reader_cstr(&self) -> Result<CString, PcscError> {
        CString::new(self.reader_name.clone())
            .map_err(|_| PcscError::ReaderNotFound(self.reader_name.clone()))
    }

    fn connect_card(&mut self) -> Result<(), PcscError> {
        if self.card.is_some() {
            return Ok(());
        }

        let reader = self.reader_cstr()?;
        match self
            .context
            .connect(&reader, self.config.share_mode.into(), self.config.protocols)
        {
            Ok(card) => {
                debug!(reader = %self.reader_name, "Connected to card");
                self.card = Some(card);
                Ok(())
            }
            Err(pcsc::Error::NoSmartcard) => Err(PcscError::NoCard(self.reader_name.clone())),
            Err(e) => Err(e.into()),
        }
    }

    fn disconnect_card(&mut self, disposition: Disposition) {
        if let Some(card) = self.card.take() {
            if let Err((_, e)) = card.disconnect(disposition) {
                debug!(reader = %self.reader_name, error = %e, "Card disconnect failed");
            }
        }
    }

    /// Whether the reader reports a card in the slot
    fn slot_occupied(&self) -> Result<bool, PcscError> {
        let mut states = [ReaderState::new(self.reader_cstr()?, State::UNAWARE)];
        self.context
            .get_status_change(Some(Duration::ZERO), &mut states)?;
        Ok(card_present(states[0].event_state()))
    }

    /// Cold reset the card and read its ATR
    fn activate_card(&mut self) -> Result<Vec<u8>, PcscError> {
        match self.card.as_mut() {
            Some(card) => {
                card.reconnect(
                    self.config.share_mode.into(),
                    self.config.protocols,
                    Disposition::UnpowerCard,
                )?;
            }
            None => self.connect_card()?,
        }

        let card = self
            .card
            .as_ref()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;
        Ok(card.get_attribute_owned(Attribute::AtrString)?)
    }

    fn transmit_icc(
        &mut self,
        command: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<(), PcscError> {
        self.connect_card()?;
        let card = self
            .card
            .as_mut()
            .ok_or_else(|| PcscError::NoCard(self.reader_name.clone()))?;

        let mut buffer = [0u8; pcsc::MAX_BUFFER_SIZE];
        match card.transmit(command, &mut buffer) {
            Ok(answer) => response
                .fill(answer)
                .map_err(|_| PcscError::Pcsc(pcsc::Error::InsufficientBuffer)),
            Err(e) => {
                if matches!(e, pcsc::Error::ResetCard | pcsc::Error::RemovedCard) {
                    self.card = None;

                    if self.config.auto_reconnect && e == pcsc::Error::ResetCard {
                        if let Ok(()) = self.connect_card() {
                            return self.transmit_icc(command, response);
                        }
                    }
                }
                Err(e.into())
            }
        }
    }

    fn terminal_command(
        &mut self,
        command: TerminalCommand,
        response: &mut ResponseBuffer,
    ) -> Result<(), PcscError> {
        match command {
            TerminalCommand::Reset => {
                self.disconnect_card(Disposition::ResetCard);
                response
                    .fill(&SW_OK)
                    .map_err(|_| PcscError::Pcsc(pcsc::Error::InsufficientBuffer))
            }
            TerminalCommand::Status => {
                let present = self.slot_occupied()?;
                if !present {
                    self.card = None;
                }
                response
                    .fill(&status_response(present))
                    .map_err(|_| PcscError::Pcsc(pcsc::Error::InsufficientBuffer))
            }
            TerminalCommand::RequestIcc => {
                let atr = self.activate_card()?;
                request_icc_response(&atr, response)
                    .map_err(|_| PcscError::Pcsc(pcsc::Error::InsufficientBuffer))
            }
        }
    }
}

impl Transceiver for PcscTransceiver {
    fn init(&mut self) -> Result<(), TransportError> {
        self.disconnect_card(Disposition::LeaveCard);
        if !self.slot_occupied()? {
            debug!(reader = %self.reader_name, "Reader opened without card");
        }
        Ok(())
    }

    fn do_transmit(
        &mut self,
        dad: Address,
        _sad: Address,
        command: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        response.clear();
        match dad {
            Address::Terminal => {
                let Some(terminal_command) = ctbcs::classify(command) else {
                    return Err(TransportError::Unsupported(command.to_vec()));
                };
                Ok(self.terminal_command(terminal_command, response)?)
            }
            Address::Icc => Ok(self.transmit_icc(command, response)?),
            Address::Host => Err(TransportError::other("host is not addressable")),
        }
    }

    fn set_alternate_convention(&mut self, enabled: bool) {
        // PC/SC negotiates the convention from the ATR
        trace!(enabled, "Ignoring alternate convention hint");
    }
}

impl Drop for PcscTransceiver {
    fn drop(&mut self) {
        self.disconnect_card(Disposition::LeaveCard);
    }
}
