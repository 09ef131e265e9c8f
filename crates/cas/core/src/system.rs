//! Card system capability interface
//!
//! Every conditional-access scheme is a [`CardSystem`]: it decides from the ATR
//! whether it owns a card, then services ECM and EMM requests for it. The
//! [`CardSystems`] registry holds at most one handler per [`CardSystemKind`] and
//! probes them in [`CardSystemKind::PROBE_ORDER`].

use std::fmt;

use serde::Deserialize;
use tracing::debug;

use crate::transport::{Address, ResponseBuffer, Transceiver, TransportError};
use crate::{Atr, AtrSignature, CaId, ControlWords, EcmRequest, EmmPacket};

/// The supported conditional-access schemes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, derive_more::Display)]
#[serde(rename_all = "lowercase")]
pub enum CardSystemKind {
    /// Irdeto
    #[display("irdeto")]
    Irdeto,
    /// Cryptoworks
    #[display("cryptoworks")]
    Cryptoworks,
    /// Viaccess
    #[display("viaccess")]
    Viaccess,
    /// Conax
    #[display("conax")]
    Conax,
    /// Seca
    #[display("seca")]
    Seca,
    /// NDS VideoGuard 2
    #[display("videoguard2")]
    #[serde(alias = "videoguard")]
    VideoGuard2,
}

impl CardSystemKind {
    /// Order in which handlers are probed; a later match overrides an earlier one
    pub const PROBE_ORDER: [Self; 6] = [
        Self::Irdeto,
        Self::Conax,
        Self::Cryptoworks,
        Self::Seca,
        Self::Viaccess,
        Self::VideoGuard2,
    ];

    const fn slot(self) -> usize {
        match self {
            Self::Irdeto => 0,
            Self::Conax => 1,
            Self::Cryptoworks => 2,
            Self::Seca => 3,
            Self::Viaccess => 4,
            Self::VideoGuard2 => 5,
        }
    }
}

/// Maximum number of providers a card reports
pub const MAX_PROVIDERS: usize = 16;

/// Card identity and entitlements reported by the bound handler
#[derive(Clone, PartialEq, Eq)]
pub struct CardData {
    /// CA id registered for the card
    pub caid: CaId,
    /// Card serial number
    pub hex_serial: [u8; 8],
    /// Provider ids, `FF FF FF FF` for unused slots
    pub provider_ids: [[u8; 4]; MAX_PROVIDERS],
    /// Key indexes available per provider
    pub available_keys: [[u8; 16]; MAX_PROVIDERS],
    /// Access condition bitmask
    pub access_bitmask: u32,
    /// Number of providers in use
    pub provider_count: usize,
}

impl CardData {
    /// Reset to the no-card defaults
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

impl Default for CardData {
    fn default() -> Self {
        Self {
            caid: CaId::default(),
            hex_serial: [0; 8],
            provider_ids: [[0xFF; 4]; MAX_PROVIDERS],
            available_keys: [[0; 16]; MAX_PROVIDERS],
            access_bitmask: 0,
            provider_count: 0,
        }
    }
}

impl fmt::Debug for CardData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CardData")
            .field("caid", &self.caid)
            .field("hex_serial", &hex::encode(self.hex_serial))
            .field("provider_count", &self.provider_count)
            .field("access_bitmask", &self.access_bitmask)
            .finish_non_exhaustive()
    }
}

/// Access to the card for the duration of one handler call
#[derive(Debug)]
pub struct CardContext<'a> {
    transceiver: &'a mut dyn Transceiver,
    card: &'a mut CardData,
    response: ResponseBuffer,
}

impl<'a> CardContext<'a> {
    /// Create a new context
    pub fn new(transceiver: &'a mut dyn Transceiver, card: &'a mut CardData) -> Self {
        Self {
            transceiver,
            card,
            response: ResponseBuffer::new(),
        }
    }

    /// Card identity and entitlements
    pub const fn card(&self) -> &CardData {
        &*self.card
    }

    /// Mutable card identity and entitlements
    pub const fn card_mut(&mut self) -> &mut CardData {
        &mut *self.card
    }

    /// Send a command to the card and return its response
    pub fn send(&mut self, command: &[u8]) -> Result<&ResponseBuffer, TransportError> {
        self.transceiver
            .transmit(Address::Icc, Address::Host, command, &mut self.response)?;
        Ok(&self.response)
    }
}

/// A conditional-access scheme handler
pub trait CardSystem: Send + fmt::Debug {
    /// Scheme implemented by this handler
    fn kind(&self) -> CardSystemKind;

    /// Whether this handler owns a card with the given ATR
    fn probe(&self, atr: &Atr) -> bool;

    /// Read serial, providers and keys from the card into the context
    fn card_info(&mut self, ctx: &mut CardContext<'_>) -> i32;

    /// Decrypt an ECM, returning the control words on success
    fn service_ecm(
        &mut self,
        ctx: &mut CardContext<'_>,
        request: &EcmRequest,
    ) -> Option<ControlWords>;

    /// Write an EMM to the card, returning a scheme specific result code (0 = declined)
    fn service_emm(&mut self, ctx: &mut CardContext<'_>, packet: &EmmPacket) -> i32;
}

/// Registry holding at most one handler per card system
#[derive(Debug, Default)]
pub struct CardSystems {
    slots: [Option<Box<dyn CardSystem>>; 6],
}

impl CardSystems {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, returning the one it replaces
    pub fn register(&mut self, handler: Box<dyn CardSystem>) -> Option<Box<dyn CardSystem>> {
        let slot = handler.kind().slot();
        self.slots[slot].replace(handler)
    }

    /// Builder-style registration
    pub fn with(mut self, handler: Box<dyn CardSystem>) -> Self {
        self.register(handler);
        self
    }

    /// Whether no handler is registered
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Probe every registered handler in [`CardSystemKind::PROBE_ORDER`]
    ///
    /// Every handler is probed; the last one claiming the ATR wins.
    pub fn identify(&self, atr: &Atr) -> Option<CardSystemKind> {
        let mut selected = None;
        for kind in CardSystemKind::PROBE_ORDER {
            if let Some(handler) = &self.slots[kind.slot()] {
                if handler.probe(atr) {
                    debug!(%kind, "Card system claims ATR");
                    selected = Some(kind);
                }
            }
        }
        selected
    }

    /// Handler registered for `kind`
    pub fn get_mut(&mut self, kind: CardSystemKind) -> Option<&mut (dyn CardSystem + 'static)> {
        self.slots[kind.slot()].as_deref_mut()
    }
}

/// Identification-only handler bound to an ATR signature
///
/// Claims cards whose ATR matches the signature and registers the configured
/// CA id. It has no wire protocol, so it declines every ECM and EMM.
#[derive(Debug, Clone)]
pub struct SignatureSystem {
    kind: CardSystemKind,
    signature: AtrSignature,
    caid: CaId,
}

impl SignatureSystem {
    /// Create a signature handler
    pub const fn new(kind: CardSystemKind, signature: AtrSignature, caid: CaId) -> Self {
        Self {
            kind,
            signature,
            caid,
        }
    }
}

impl CardSystem for SignatureSystem {
    fn kind(&self) -> CardSystemKind {
        self.kind
    }

    fn probe(&self, atr: &Atr) -> bool {
        self.signature.matches(atr.as_bytes())
    }

    fn card_info(&mut self, ctx: &mut CardContext<'_>) -> i32 {
        ctx.card_mut().caid = self.caid;
        1
    }

    fn service_ecm(&mut self, _: &mut CardContext<'_>, request: &EcmRequest) -> Option<ControlWords> {
        debug!(kind = %self.kind, srvid = %request.srvid, "No ECM support for signature handler");
        None
    }

    fn service_emm(&mut self, _: &mut CardContext<'_>, _: &EmmPacket) -> i32 {
        0
    }
}
