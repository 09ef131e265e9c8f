//! Reader configuration

use std::{path::PathBuf, time::Duration};

use serde::Deserialize;
use smartcas_core::{
    AtrSignature, CaId, CardSystemKind, CardSystems, NanoPolicyTable, NanoSelection,
    SignatureSystem,
};

use crate::{archive::DirArchive, state::ReaderId};

/// Configuration of one physical reader
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader id sessions are bound to
    pub id: ReaderId,
    /// Terminal device name; the first available reader when unset
    pub device: Option<String>,
    /// Directory EMMs are archived to
    pub archive_dir: Option<PathBuf>,
    /// EMM replayed once after the next card insertion, relative to `archive_dir`
    pub emm_file: Option<PathBuf>,
    /// Nanos whose EMMs are archived
    pub save_nano: NanoSelection,
    /// Nanos whose EMMs are not forwarded to the card
    pub block_nano: NanoSelection,
    /// Health check interval in milliseconds
    pub poll_interval_ms: u64,
    /// ATR signatures identifying card systems
    pub signatures: Vec<SignatureConfig>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            id: ReaderId::from("reader0"),
            device: None,
            archive_dir: None,
            emm_file: None,
            save_nano: NanoSelection::None,
            block_nano: NanoSelection::None,
            poll_interval_ms: 1000,
            signatures: Vec::new(),
        }
    }
}

/// ATR signature bound to a card system
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SignatureConfig {
    /// Card system claiming matching cards
    pub kind: CardSystemKind,
    /// ATR pattern as hex
    pub atr: String,
    /// Optional mask as hex, applied to both ATR and pattern
    #[serde(default)]
    pub mask: Option<String>,
    /// CA id registered for matching cards
    pub caid: u16,
}

impl ReaderConfig {
    /// Nano save/block policy table
    pub fn policy(&self) -> NanoPolicyTable {
        NanoPolicyTable::from_selections(&self.save_nano, &self.block_nano)
    }

    /// Health check interval
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Card system handlers for the configured signatures
    pub fn card_systems(&self) -> smartcas_core::Result<CardSystems> {
        let mut systems = CardSystems::new();
        for sig in &self.signatures {
            let signature = AtrSignature::from_hex(&sig.atr, sig.mask.as_deref())?;
            systems.register(Box::new(SignatureSystem::new(
                sig.kind,
                signature,
                CaId(sig.caid),
            )));
        }
        Ok(systems)
    }

    /// EMM archive, when an archive directory or pending EMM is configured
    pub fn archive(&self) -> Option<DirArchive> {
        if self.archive_dir.is_none() && self.emm_file.is_none() {
            return None;
        }
        let dir = self.archive_dir.clone().unwrap_or_else(|| PathBuf::from("."));
        let archive = DirArchive::new(dir);
        Some(match &self.emm_file {
            Some(file) => archive.with_pending(file),
            None => archive,
        })
    }
}
