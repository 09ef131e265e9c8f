//! Scripted collaborators for engine tests

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;
use smartcas_core::{
    Atr, CaId, CardContext, CardSystem, CardSystemKind, ControlWords, EcmRequest, EmmPacket,
    transport::{Address, ResponseBuffer, Transceiver, TransportError, ctbcs},
};

use crate::{archive::EmmArchive, delay::Delay, error::ArchiveError};

#[derive(Debug, Default)]
struct SimCard {
    present: bool,
    atr: Vec<u8>,
    failing_requests: usize,
    lenient_requests: usize,
    fail_reset: bool,
    interface_disconnected: bool,
    fail_icc_status: bool,
    commands: Vec<(Address, Vec<u8>)>,
    conventions: Vec<bool>,
}

/// Simulated CT-BCS terminal; clones share the same card slot
#[derive(Debug, Clone, Default)]
pub(crate) struct SimTerminal {
    card: Arc<Mutex<SimCard>>,
}

impl SimTerminal {
    pub(crate) fn empty() -> Self {
        Self::default()
    }

    pub(crate) fn with_card(atr: &[u8]) -> Self {
        let terminal = Self::default();
        terminal.insert(atr);
        terminal
    }

    pub(crate) fn insert(&self, atr: &[u8]) {
        let mut card = self.card.lock();
        card.present = true;
        card.atr = atr.to_vec();
    }

    pub(crate) fn remove(&self) {
        self.card.lock().present = false;
    }

    pub(crate) fn fail_requests(&self, count: usize) {
        self.card.lock().failing_requests = count;
    }

    pub(crate) fn lenient_requests(&self, count: usize) {
        self.card.lock().lenient_requests = count;
    }

    pub(crate) fn fail_reset(&self) {
        self.card.lock().fail_reset = true;
    }

    /// Make ICC status queries fail at the transport level
    pub(crate) fn fail_status(&self, enabled: bool) {
        self.card.lock().fail_icc_status = enabled;
    }

    pub(crate) fn disconnect_interface(&self) {
        self.card.lock().interface_disconnected = true;
    }

    pub(crate) fn terminal_commands(&self) -> Vec<Vec<u8>> {
        self.card
            .lock()
            .commands
            .iter()
            .filter(|(dad, _)| *dad == Address::Terminal)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    pub(crate) fn icc_commands(&self) -> Vec<Vec<u8>> {
        self.card
            .lock()
            .commands
            .iter()
            .filter(|(dad, _)| *dad == Address::Icc)
            .map(|(_, cmd)| cmd.clone())
            .collect()
    }

    pub(crate) fn conventions(&self) -> Vec<bool> {
        self.card.lock().conventions.clone()
    }
}

impl Transceiver for SimTerminal {
    fn init(&mut self) -> Result<(), TransportError> {
        Ok(())
    }

    fn do_transmit(
        &mut self,
        dad: Address,
        _sad: Address,
        command: &[u8],
        response: &mut ResponseBuffer,
    ) -> Result<(), TransportError> {
        let mut card = self.card.lock();
        card.commands.push((dad, command.to_vec()));

        match dad {
            Address::Terminal => match ctbcs::classify(command) {
                Some(ctbcs::TerminalCommand::Reset) if card.fail_reset => {
                    Err(TransportError::Transmission)
                }
                Some(ctbcs::TerminalCommand::Reset) => response.fill(&[0x90, 0x00]),
                Some(ctbcs::TerminalCommand::Status) => {
                    let kernel = command[2] == ctbcs::P1_CT_KERNEL;
                    if !kernel && card.fail_icc_status {
                        return Err(TransportError::Transmission);
                    }
                    let status = if !card.present || (kernel && card.interface_disconnected) {
                        ctbcs::DATA_STATUS_NO_CARD
                    } else {
                        ctbcs::DATA_STATUS_CARD_CONNECT
                    };
                    response.fill(&[status, 0x90, 0x00])
                }
                Some(ctbcs::TerminalCommand::RequestIcc) => {
                    if !card.present {
                        return Err(TransportError::NoCard);
                    }
                    if card.failing_requests > 0 {
                        card.failing_requests -= 1;
                        response.fill(&[0x64, 0x00])?;
                        return Err(TransportError::Transmission);
                    }
                    let mut answer = card.atr.clone();
                    answer.extend_from_slice(&[0x90, 0x01]);
                    response.fill(&answer)?;
                    if card.lenient_requests > 0 {
                        card.lenient_requests -= 1;
                        return Err(TransportError::driver(-1));
                    }
                    Ok(())
                }
                None => Err(TransportError::Unsupported(command.to_vec())),
            },
            Address::Icc => {
                if !card.present {
                    return Err(TransportError::NoCard);
                }
                response.fill(&[0x90, 0x00])
            }
            Address::Host => Err(TransportError::other("host is not addressable")),
        }
    }

    fn set_alternate_convention(&mut self, enabled: bool) {
        self.card.lock().conventions.push(enabled);
    }
}

/// Delay that records instead of sleeping
#[derive(Debug, Clone, Default)]
pub(crate) struct RecordingDelay {
    slept: Arc<Mutex<Vec<Duration>>>,
}

impl RecordingDelay {
    pub(crate) fn recorded(&self) -> Vec<Duration> {
        self.slept.lock().clone()
    }
}

impl Delay for RecordingDelay {
    fn sleep(&self, duration: Duration) {
        self.slept.lock().push(duration);
    }
}

/// Call counters shared between a [`FakeSystem`] and the test
#[derive(Debug, Default)]
pub(crate) struct Calls {
    pub(crate) card_info: AtomicUsize,
    pub(crate) ecm: AtomicUsize,
    pub(crate) emm: AtomicUsize,
}

impl Calls {
    pub(crate) fn ecm(&self) -> usize {
        self.ecm.load(Ordering::SeqCst)
    }

    pub(crate) fn emm(&self) -> usize {
        self.emm.load(Ordering::SeqCst)
    }

    pub(crate) fn card_info(&self) -> usize {
        self.card_info.load(Ordering::SeqCst)
    }
}

pub(crate) const FAKE_SERIAL: [u8; 8] = [0, 0, 0x11, 0x22, 0x33, 0x44, 0x55, 0x66];
pub(crate) const FAKE_CW: ControlWords = ControlWords {
    even: [0x11; 8],
    odd: [0x22; 8],
};

/// Card system claiming ATRs that start with a prefix
#[derive(Debug)]
pub(crate) struct FakeSystem {
    kind: CardSystemKind,
    prefix: Vec<u8>,
    caid: CaId,
    emm_code: i32,
    calls: Arc<Calls>,
}

impl FakeSystem {
    pub(crate) fn new(kind: CardSystemKind, prefix: &[u8], caid: u16) -> (Box<Self>, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let system = Self {
            kind,
            prefix: prefix.to_vec(),
            caid: CaId(caid),
            emm_code: 1,
            calls: Arc::clone(&calls),
        };
        (Box::new(system), calls)
    }

    pub(crate) fn with_emm_code(mut self: Box<Self>, code: i32) -> Box<Self> {
        self.emm_code = code;
        self
    }
}

impl CardSystem for FakeSystem {
    fn kind(&self) -> CardSystemKind {
        self.kind
    }

    fn probe(&self, atr: &Atr) -> bool {
        atr.as_bytes().starts_with(&self.prefix)
    }

    fn card_info(&mut self, ctx: &mut CardContext<'_>) -> i32 {
        self.calls.card_info.fetch_add(1, Ordering::SeqCst);
        if ctx.send(&[0x00, 0xB2, 0x01, 0x00]).is_err() {
            return 0;
        }
        let card = ctx.card_mut();
        card.caid = self.caid;
        card.hex_serial = FAKE_SERIAL;
        card.provider_ids[0] = [0x00, 0x00, 0x00, 0x01];
        card.provider_count = 1;
        1
    }

    fn service_ecm(&mut self, ctx: &mut CardContext<'_>, _: &EcmRequest) -> Option<ControlWords> {
        self.calls.ecm.fetch_add(1, Ordering::SeqCst);
        ctx.send(&[0x80, 0x30, 0x00, 0x00]).ok()?;
        Some(FAKE_CW)
    }

    fn service_emm(&mut self, _: &mut CardContext<'_>, _: &EmmPacket) -> i32 {
        self.calls.emm.fetch_add(1, Ordering::SeqCst);
        self.emm_code
    }
}

/// In-memory archive
#[derive(Debug, Default)]
pub(crate) struct MemoryArchive {
    files: Mutex<Vec<(String, Vec<u8>)>>,
    pending: Mutex<Option<Result<EmmPacket, ()>>>,
    fail_writes: bool,
}

impl MemoryArchive {
    pub(crate) fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Self::default()
        }
    }

    pub(crate) fn with_pending(packet: EmmPacket) -> Self {
        let archive = Self::default();
        *archive.pending.lock() = Some(Ok(packet));
        archive
    }

    pub(crate) fn with_unreadable_pending() -> Self {
        let archive = Self::default();
        *archive.pending.lock() = Some(Err(()));
        archive
    }

    pub(crate) fn files(&self) -> Vec<(String, Vec<u8>)> {
        self.files.lock().clone()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.pending.lock().is_some()
    }
}

impl EmmArchive for MemoryArchive {
    fn store(&self, file_name: &str, contents: &[u8]) -> Result<PathBuf, ArchiveError> {
        if self.fail_writes {
            return Err(ArchiveError::io(
                file_name,
                std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only"),
            ));
        }
        self.files
            .lock()
            .push((file_name.to_string(), contents.to_vec()));
        Ok(PathBuf::from(file_name))
    }

    fn load_pending(&self) -> Result<Option<EmmPacket>, ArchiveError> {
        match self.pending.lock().as_ref() {
            Some(Ok(packet)) => Ok(Some(packet.clone())),
            Some(Err(())) => Err(ArchiveError::io(
                "pending.emm",
                std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
            )),
            None => Ok(None),
        }
    }

    fn clear_pending(&self) {
        self.pending.lock().take();
    }
}
