//! CT-BCS basic terminal commands
//!
//! The subset of the CT-BCS command set used to reset a terminal, query card
//! presence and request the card's ATR.

/// Class byte of CT-BCS commands
pub const CLA: u8 = 0x20;
/// RESET CT instruction
pub const INS_RESET: u8 = 0x11;
/// REQUEST ICC instruction
pub const INS_REQUEST: u8 = 0x12;
/// GET STATUS instruction
pub const INS_STATUS: u8 = 0x13;

/// P1 addressing the terminal kernel
pub const P1_CT_KERNEL: u8 = 0x00;
/// P1 addressing the first card interface
pub const P1_INTERFACE1: u8 = 0x01;

/// P2 asking a reset to return the ATR
pub const P2_RESET_GET_ATR: u8 = 0x01;
/// P2 asking a request to return the ATR
pub const P2_REQUEST_GET_ATR: u8 = 0x01;
/// P2 asking for the ICC status data object
pub const P2_STATUS_ICC: u8 = 0x80;

/// Status data byte: card present and connected
pub const DATA_STATUS_CARD_CONNECT: u8 = 0x05;
/// Status data byte: no card
pub const DATA_STATUS_NO_CARD: u8 = 0x00;

/// Reset the terminal
pub const RESET_TERMINAL: [u8; 3] = [INS_RESET, P2_RESET_GET_ATR, 0x00];
/// Query the terminal kernel for the ICC status
pub const TERMINAL_STATUS: [u8; 5] = [CLA, INS_STATUS, P1_CT_KERNEL, P2_STATUS_ICC, 0x00];
/// Query interface 1 for the ICC status
pub const ICC_STATUS: [u8; 5] = [CLA, INS_STATUS, P1_INTERFACE1, P2_STATUS_ICC, 0x00];
/// Power up the card on interface 1 and return its ATR
pub const REQUEST_ICC: [u8; 5] = [CLA, INS_REQUEST, P1_INTERFACE1, P2_REQUEST_GET_ATR, 0x00];

/// A recognised terminal command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalCommand {
    /// RESET CT
    Reset,
    /// GET STATUS, for the kernel or a card interface
    Status,
    /// REQUEST ICC
    RequestIcc,
}

/// Classify a command addressed to the terminal
///
/// The reset command is accepted both with and without the class byte.
pub fn classify(command: &[u8]) -> Option<TerminalCommand> {
    match command {
        [INS_RESET, ..] | [CLA, INS_RESET, ..] => Some(TerminalCommand::Reset),
        [CLA, INS_STATUS, _, P2_STATUS_ICC, ..] => Some(TerminalCommand::Status),
        [CLA, INS_REQUEST, ..] => Some(TerminalCommand::RequestIcc),
        _ => None,
    }
}
