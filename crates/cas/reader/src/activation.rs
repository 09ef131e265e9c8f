//! Card activation and ATR retrieval

use std::time::Duration;

use smartcas_core::{
    Atr,
    transport::{Address, ResponseBuffer, Transceiver, ctbcs},
};
use tracing::{info, instrument, warn};

use crate::{delay::Delay, error::ReaderError};

/// Number of ATR requests before activation gives up
pub const ACTIVATION_ATTEMPTS: usize = 5;

/// Pause after a failed ATR request
pub const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Pause after a successful activation before the card is used
pub const SETTLE_DELAY: Duration = Duration::from_secs(1);

/// SW1 of a successful card response
const SW1_OK: u8 = 0x90;

/// Reset the terminal, check card connection and request the ATR
///
/// A request counts as successful when the exchange succeeds or when the
/// response ends in a `90 xx` status, even if the terminal reported an error.
#[instrument(level = "debug", skip_all)]
pub(crate) fn activate(
    transceiver: &mut dyn Transceiver,
    delay: &dyn Delay,
) -> Result<Atr, ReaderError> {
    let mut response = ResponseBuffer::new();

    if let Err(e) = transceiver.transmit(
        Address::Terminal,
        Address::Host,
        &ctbcs::RESET_TERMINAL,
        &mut response,
    ) {
        warn!(error = %e, "Error resetting terminal");
        return Err(ReaderError::DeviceUnavailable(e));
    }

    if let Err(e) = transceiver.transmit(
        Address::Terminal,
        Address::Host,
        &ctbcs::TERMINAL_STATUS,
        &mut response,
    ) {
        warn!(error = %e, "Error getting status of terminal");
        return Err(ReaderError::DeviceUnavailable(e));
    }
    if response.first() != Some(ctbcs::DATA_STATUS_CARD_CONNECT) {
        return Err(ReaderError::CardNotConnected);
    }

    for attempt in 0..ACTIVATION_ATTEMPTS {
        transceiver.set_alternate_convention(attempt % 2 == 1);
        response.clear();

        let result = transceiver.transmit(
            Address::Terminal,
            Address::Host,
            &ctbcs::REQUEST_ICC,
            &mut response,
        );
        if result.is_ok() || response.sw1() == Some(SW1_OK) {
            let atr = Atr::from_slice(response.payload())?;
            info!(%atr, "ATR");
            delay.sleep(SETTLE_DELAY);
            return Ok(atr);
        }

        warn!(attempt = attempt + 1, error = ?result.err(), "Error activating card");
        delay.sleep(RETRY_DELAY);
    }

    Err(ReaderError::ActivationTimeout {
        attempts: ACTIVATION_ATTEMPTS,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{RecordingDelay, SimTerminal};
    use hex_literal::hex;

    const ATR: [u8; 8] = hex!("3B24000030423030");

    #[test]
    fn test_activate_first_attempt() {
        let mut terminal = SimTerminal::with_card(&ATR);
        let delay = RecordingDelay::default();

        let atr = activate(&mut terminal, &delay).unwrap();
        assert_eq!(atr.as_bytes(), &ATR);
        assert_eq!(delay.recorded(), vec![SETTLE_DELAY]);
        assert_eq!(
            terminal.terminal_commands(),
            vec![
                ctbcs::RESET_TERMINAL.to_vec(),
                ctbcs::TERMINAL_STATUS.to_vec(),
                ctbcs::REQUEST_ICC.to_vec(),
            ]
        );
    }

    #[test]
    fn test_activate_retries_then_succeeds() {
        let mut terminal = SimTerminal::with_card(&ATR);
        terminal.fail_requests(3);
        let delay = RecordingDelay::default();

        assert!(activate(&mut terminal, &delay).is_ok());
        assert_eq!(
            delay.recorded(),
            vec![RETRY_DELAY, RETRY_DELAY, RETRY_DELAY, SETTLE_DELAY]
        );
        // Odd attempts switch to the alternate convention
        assert_eq!(terminal.conventions(), vec![false, true, false, true]);
    }

    #[test]
    fn test_activate_gives_up_after_five_attempts() {
        let mut terminal = SimTerminal::with_card(&ATR);
        terminal.fail_requests(usize::MAX);
        let delay = RecordingDelay::default();

        let err = activate(&mut terminal, &delay).unwrap_err();
        assert!(matches!(err, ReaderError::ActivationTimeout { attempts: 5 }));
        assert_eq!(delay.recorded(), vec![RETRY_DELAY; ACTIVATION_ATTEMPTS]);
        let requests = terminal
            .terminal_commands()
            .into_iter()
            .filter(|c| *c == ctbcs::REQUEST_ICC)
            .count();
        assert_eq!(requests, ACTIVATION_ATTEMPTS);
    }

    #[test]
    fn test_activate_accepts_error_with_ok_status() {
        let mut terminal = SimTerminal::with_card(&ATR);
        terminal.lenient_requests(1);
        let delay = RecordingDelay::default();

        let atr = activate(&mut terminal, &delay).unwrap();
        assert_eq!(atr.as_bytes(), &ATR);
        assert_eq!(delay.recorded(), vec![SETTLE_DELAY]);
    }

    #[test]
    fn test_activate_reset_failure_is_fatal() {
        let mut terminal = SimTerminal::with_card(&ATR);
        terminal.fail_reset();
        let delay = RecordingDelay::default();

        let err = activate(&mut terminal, &delay).unwrap_err();
        assert!(matches!(err, ReaderError::DeviceUnavailable(_)));
        assert!(delay.recorded().is_empty());
        assert_eq!(terminal.terminal_commands().len(), 1);
    }

    #[test]
    fn test_activate_requires_connected_card() {
        let mut terminal = SimTerminal::with_card(&ATR);
        terminal.disconnect_interface();
        let delay = RecordingDelay::default();

        let err = activate(&mut terminal, &delay).unwrap_err();
        assert!(matches!(err, ReaderError::CardNotConnected));
        assert!(delay.recorded().is_empty());
    }

    #[test]
    fn test_activate_rejects_oversized_atr() {
        let mut terminal = SimTerminal::with_card(&[0x3B; 70]);
        let delay = RecordingDelay::default();

        let err = activate(&mut terminal, &delay).unwrap_err();
        assert!(matches!(
            err,
            ReaderError::InvalidAtr(smartcas_core::Error::AtrTooLong(70))
        ));
        assert!(delay.recorded().is_empty());
    }
}
