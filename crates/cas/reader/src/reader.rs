//! The card session engine
//!
//! A [`Reader`] owns the state of one physical reader. Every entry point takes
//! the reader's exclusive section, runs a fresh health check and then acts on
//! the card that is actually in the slot:
//!
//! - [`Reader::check_health`] advances the card state (insertion, activation,
//!   identification, removal)
//! - [`Reader::process_ecm`] forwards an ECM to the bound card system
//! - [`Reader::process_emm`] applies the nano save/block policy and forwards an EMM
//! - [`Reader::card_info`] re-reads card identity from the bound card system

use std::{sync::Arc, time::SystemTime};

use chrono::Local;
use parking_lot::Mutex;
use smartcas_core::{
    CaId, CardContext, CardSystemKind, CardSystems, ControlWords, EcmRequest, EmmPacket,
    NanoFlags, NanoPolicyTable,
    transport::{Address, ResponseBuffer, Transceiver, ctbcs},
    utils::hexdump,
};
use tracing::{debug, error, info, instrument, warn};

use crate::{
    activation::activate,
    archive::{ArchiveNames, EmmArchive, text_record},
    delay::{Delay, ThreadSleep},
    error::ReaderError,
    session::{ClientSessions, SessionId, SessionRegistry},
    state::{CardStatus, ReaderId, ReaderState},
};

/// Result of an ECM dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EcmOutcome {
    /// The reader has no usable card; try another reader
    Unavailable,
    /// The ECM belongs to another CA system than the card's
    Rejected {
        /// CA id of the request
        request: CaId,
        /// CA id registered for the card
        card: CaId,
    },
    /// The card system returned control words
    Serviced(ControlWords),
    /// The card system declined the ECM
    Declined,
}

impl EcmOutcome {
    /// Whether control words were recovered
    pub const fn is_serviced(&self) -> bool {
        matches!(self, Self::Serviced(_))
    }

    /// Convert into a result, mapping the non-card outcomes to errors
    pub fn into_result(self) -> Result<Option<ControlWords>, ReaderError> {
        match self {
            Self::Unavailable => Err(ReaderError::NotReady),
            Self::Rejected { request, card } => Err(ReaderError::EcmRejected { request, card }),
            Self::Serviced(cw) => Ok(Some(cw)),
            Self::Declined => Ok(None),
        }
    }
}

/// Result of an EMM dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmmOutcome {
    /// The reader has no usable card
    Unavailable,
    /// The nano is blocked by policy; the card was not contacted
    Blocked {
        /// Nano type of the blocked EMM
        nano: u8,
    },
    /// The card system accepted the EMM with a scheme specific result code
    Serviced(i32),
    /// The card system declined the EMM
    Declined,
}

impl EmmOutcome {
    /// Whether the card system accepted the EMM
    pub const fn is_serviced(&self) -> bool {
        matches!(self, Self::Serviced(_))
    }

    /// Convert into a result, mapping the non-card outcomes to errors
    pub fn into_result(self) -> Result<i32, ReaderError> {
        match self {
            Self::Unavailable => Err(ReaderError::NotReady),
            Self::Blocked { nano } => Err(ReaderError::EmmBlockedByPolicy { nano }),
            Self::Serviced(code) => Ok(code),
            Self::Declined => Ok(0),
        }
    }
}

/// Builder for [`Reader`]
#[derive(Debug)]
pub struct ReaderBuilder<T> {
    id: ReaderId,
    transceiver: T,
    systems: CardSystems,
    policy: NanoPolicyTable,
    archive: Option<Arc<dyn EmmArchive>>,
    sessions: Option<Arc<dyn ClientSessions>>,
    delay: Box<dyn Delay>,
}

impl<T: Transceiver> ReaderBuilder<T> {
    /// Card system handlers to probe on insertion
    pub fn card_systems(mut self, systems: CardSystems) -> Self {
        self.systems = systems;
        self
    }

    /// Nano save/block policy
    pub fn policy(mut self, policy: NanoPolicyTable) -> Self {
        self.policy = policy;
        self
    }

    /// Storage for archived and pending EMMs
    ///
    /// Without an archive, EMMs flagged for saving are only logged.
    pub fn archive(mut self, archive: Arc<dyn EmmArchive>) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Client sessions to notify on card changes
    pub fn sessions(mut self, sessions: Arc<dyn ClientSessions>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Delay used by the activation retry loop
    pub fn delay(mut self, delay: impl Delay + 'static) -> Self {
        self.delay = Box::new(delay);
        self
    }

    /// Build the reader
    pub fn build(self) -> Reader<T> {
        let sessions = self
            .sessions
            .unwrap_or_else(|| Arc::new(SessionRegistry::new()));
        Reader {
            id: self.id,
            inner: Mutex::new(Inner {
                transceiver: self.transceiver,
                state: ReaderState::default(),
                systems: self.systems,
                policy: self.policy,
                archive: self.archive,
                sessions,
                delay: self.delay,
            }),
        }
    }
}

/// Card session engine for one physical reader
#[derive(Debug)]
pub struct Reader<T> {
    id: ReaderId,
    inner: Mutex<Inner<T>>,
}

#[derive(Debug)]
struct Inner<T> {
    transceiver: T,
    state: ReaderState,
    systems: CardSystems,
    policy: NanoPolicyTable,
    archive: Option<Arc<dyn EmmArchive>>,
    sessions: Arc<dyn ClientSessions>,
    delay: Box<dyn Delay>,
}

impl<T: Transceiver> Reader<T> {
    /// Start building a reader around a transceiver
    pub fn builder(id: impl Into<ReaderId>, transceiver: T) -> ReaderBuilder<T> {
        ReaderBuilder {
            id: id.into(),
            transceiver,
            systems: CardSystems::new(),
            policy: NanoPolicyTable::new(),
            archive: None,
            sessions: None,
            delay: Box::new(ThreadSleep),
        }
    }

    /// Reader id
    pub const fn id(&self) -> &ReaderId {
        &self.id
    }

    /// Snapshot of the reader state
    pub fn state(&self) -> ReaderState {
        self.inner.lock().state.clone()
    }

    /// Current card status, without polling the card
    pub fn status(&self) -> CardStatus {
        self.inner.lock().state.status
    }

    /// Current nano policy
    pub fn policy(&self) -> NanoPolicyTable {
        self.inner.lock().policy.clone()
    }

    /// Replace the nano policy
    pub fn set_policy(&self, policy: NanoPolicyTable) {
        self.inner.lock().policy = policy;
    }

    /// Open the terminal device
    #[instrument(level = "debug", skip(self), fields(reader = %self.id))]
    pub fn init_device(&self) -> Result<(), ReaderError> {
        self.inner.lock().transceiver.init().map_err(|e| {
            error!(reader = %self.id, error = %e, "Cannot open device");
            ReaderError::DeviceUnavailable(e)
        })
    }

    /// Poll the card and advance the reader state
    ///
    /// Returns whether a card is inserted and ready for dispatch. On a fresh
    /// insertion this runs the activation sequence, which may block for several
    /// seconds.
    pub fn check_health(&self) -> bool {
        self.inner.lock().check_health(&self.id)
    }

    /// Re-read card identity and entitlements from the bound card system
    ///
    /// Replays a still pending EMM first.
    pub fn card_info(&self) -> Result<i32, ReaderError> {
        let mut inner = self.inner.lock();
        if !inner.check_health(&self.id) {
            return Err(ReaderError::NotReady);
        }
        let kind = inner
            .state
            .card_system
            .ok_or(ReaderError::CardSystemUnsupported)?;
        inner.replay_pending();
        Ok(inner.read_card_info(kind))
    }

    /// Dispatch an ECM on behalf of a client session
    #[instrument(level = "debug", skip_all, fields(reader = %self.id, %session, caid = %request.caid, srvid = %request.srvid))]
    pub fn process_ecm(&self, session: SessionId, request: &EcmRequest) -> EcmOutcome {
        let mut inner = self.inner.lock();
        if !inner.check_health(&self.id) {
            return EcmOutcome::Unavailable;
        }

        inner
            .sessions
            .update_last_seen(session, request.srvid, request.caid, SystemTime::now());

        let card = inner.state.card.caid;
        if request.caid.system() != card.system() {
            debug!(%card, "ECM rejected, CA system mismatch");
            return EcmOutcome::Rejected {
                request: request.caid,
                card,
            };
        }

        let Inner {
            transceiver,
            state,
            systems,
            ..
        } = &mut *inner;
        let Some(handler) = state.card_system.and_then(|kind| systems.get_mut(kind)) else {
            return EcmOutcome::Declined;
        };
        let mut ctx = CardContext::new(transceiver, &mut state.card);
        match handler.service_ecm(&mut ctx, request) {
            Some(cw) => EcmOutcome::Serviced(cw),
            None => EcmOutcome::Declined,
        }
    }

    /// Dispatch an EMM, archiving and blocking it according to the nano policy
    #[instrument(level = "debug", skip_all, fields(reader = %self.id, nano = packet.nano()))]
    pub fn process_emm(&self, packet: &EmmPacket) -> EmmOutcome {
        let mut inner = self.inner.lock();
        if !inner.check_health(&self.id) {
            return EmmOutcome::Unavailable;
        }
        inner.dispatch_emm(packet)
    }
}

impl<T: Transceiver> Inner<T> {
    fn check_health(&mut self, reader: &ReaderId) -> bool {
        let present = self.card_present();

        match (present, self.state.status.is_present()) {
            (true, false) => {
                info!(%reader, "Card detected");
                self.insert_card(reader);
            }
            (false, true) => {
                info!(%reader, "Card ejected");
                self.state.null_card();
                self.state.status = CardStatus::Absent;
                let terminated = self.sessions.terminate_all_bound_to(reader);
                debug!(%reader, terminated, "Terminated client sessions");
            }
            _ => {}
        }

        self.state.status.is_ready()
    }

    /// Ask the terminal whether a card sits in the slot; errors count as absent
    fn card_present(&mut self) -> bool {
        let mut response = ResponseBuffer::new();
        match self.transceiver.transmit(
            Address::Terminal,
            Address::Host,
            &ctbcs::ICC_STATUS,
            &mut response,
        ) {
            Ok(()) => response.first().is_some_and(|status| status != 0),
            Err(e) => {
                debug!(error = %e, "ICC status unavailable, treating card as absent");
                false
            }
        }
    }

    fn insert_card(&mut self, reader: &ReaderId) {
        self.state.null_card();
        self.state.status = CardStatus::NeedInit;

        let atr = match activate(&mut self.transceiver, &*self.delay) {
            Ok(atr) => atr,
            Err(e) => {
                warn!(%reader, error = %e, "Card activation failed");
                self.state.status = CardStatus::Failure;
                return;
            }
        };
        self.state.atr = Some(atr);
        self.state.status = CardStatus::Inserted;

        let Some(kind) = self.systems.identify(&atr) else {
            warn!(%reader, error = %ReaderError::CardSystemUnsupported, %atr, "Card system not supported");
            return;
        };
        info!(%reader, card_system = %kind, "Card system identified");
        self.state.card_system = Some(kind);

        self.replay_pending();
        self.read_card_info(kind);
    }

    fn read_card_info(&mut self, kind: CardSystemKind) -> i32 {
        let Some(handler) = self.systems.get_mut(kind) else {
            return 0;
        };
        let mut ctx = CardContext::new(&mut self.transceiver, &mut self.state.card);
        let rc = handler.card_info(&mut ctx);
        let card = &self.state.card;
        info!(
            card_system = %kind,
            caid = %card.caid,
            serial = %hexdump(&card.hex_serial, false),
            providers = card.provider_count,
            rc,
            "Card info"
        );
        rc
    }

    /// Send the queued EMM to the card once, bypassing the nano policy
    fn replay_pending(&mut self) {
        let Some(archive) = self.archive.clone() else {
            return;
        };
        let packet = match archive.load_pending() {
            Ok(Some(packet)) => packet,
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "Cannot load pending EMM");
                return;
            }
        };

        let nano = packet.nano();
        let flags = self.policy.get(nano);
        self.policy
            .set(nano, flags.difference(NanoFlags::SAVE.union(NanoFlags::BLOCK)));
        let outcome = self.dispatch_emm(&packet);
        self.policy.set(nano, flags);

        archive.clear_pending();
        info!(?outcome, nano, "Replayed pending EMM");
    }

    fn dispatch_emm(&mut self, packet: &EmmPacket) -> EmmOutcome {
        let nano = packet.nano();
        let flags = self.policy.get(nano);

        if flags.save() {
            self.archive_emm(packet);
        }
        if flags.block() {
            debug!(nano, "EMM blocked by policy");
            return EmmOutcome::Blocked { nano };
        }

        let Some(handler) = self
            .state
            .card_system
            .and_then(|kind| self.systems.get_mut(kind))
        else {
            return EmmOutcome::Declined;
        };
        let mut ctx = CardContext::new(&mut self.transceiver, &mut self.state.card);
        match handler.service_emm(&mut ctx, packet) {
            0 => EmmOutcome::Declined,
            code => EmmOutcome::Serviced(code),
        }
    }

    /// Write the EMM as a text dump and a binary record; failures are only logged
    fn archive_emm(&self, packet: &EmmPacket) {
        let Some(archive) = &self.archive else {
            debug!(nano = packet.nano(), "No archive configured, EMM not saved");
            return;
        };

        let names = ArchiveNames::new(packet.is_unique(), Local::now());
        match archive.store(&names.text, text_record(packet).as_bytes()) {
            Ok(path) => debug!(path = %path.display(), "Archived EMM text"),
            Err(e) => warn!(error = %e, "Cannot archive EMM text"),
        }
        match archive.store(&names.binary, &packet.to_bytes()) {
            Ok(path) => debug!(path = %path.display(), "Archived EMM record"),
            Err(e) => warn!(error = %e, "Cannot archive EMM record"),
        }
    }
}
