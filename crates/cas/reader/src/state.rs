//! Per-reader card state

use serde::Deserialize;
use smartcas_core::{Atr, CardData, CardSystemKind};

/// Identifier of a physical reader
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Deserialize, derive_more::Display, derive_more::From)]
#[serde(transparent)]
pub struct ReaderId(String);

impl ReaderId {
    /// Create a reader id
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Reader id as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ReaderId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Card presence and initialisation status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, derive_more::Display)]
pub enum CardStatus {
    /// No card in the reader
    #[default]
    #[display("absent")]
    Absent,
    /// Card detected, activation in progress
    #[display("initialising")]
    NeedInit,
    /// Card activated and ready
    #[display("inserted")]
    Inserted,
    /// Card present but activation failed
    #[display("failure")]
    Failure,
}

impl CardStatus {
    /// Whether a card is physically present, whatever its initialisation state
    pub const fn is_present(self) -> bool {
        !matches!(self, Self::Absent)
    }

    /// Whether the card is ready for ECM/EMM dispatch
    pub const fn is_ready(self) -> bool {
        matches!(self, Self::Inserted)
    }
}

/// State of one physical reader
///
/// While the status is [`CardStatus::Absent`], no card system is bound and the
/// card data holds its zeroed defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReaderState {
    /// Card presence and initialisation status
    pub status: CardStatus,
    /// Card system bound to the current card
    pub card_system: Option<CardSystemKind>,
    /// ATR of the current card
    pub atr: Option<Atr>,
    /// Card identity and entitlements
    pub card: CardData,
}

impl ReaderState {
    /// Forget the current card
    pub fn null_card(&mut self) {
        self.card_system = None;
        self.atr = None;
        self.card.clear();
    }
}
