//! Card session engine for conditional-access smart card readers
//!
//! A [`Reader`] owns one physical card terminal. An external poller calls
//! [`Reader::check_health`] to detect insertion and removal; on insertion the
//! card is activated, its ATR is matched against the registered
//! [`CardSystem`](smartcas_core::CardSystem) handlers and the card's identity is
//! read. Client sessions then dispatch ECMs and EMMs through the reader, which
//! enforces the per-nano save/block policy and archives EMMs on request.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use smartcas_core::{CardSystems, EcmRequest};
//! use smartcas_reader::{DirArchive, Reader, SessionRegistry};
//! # fn run(transceiver: impl smartcas_core::Transceiver) {
//! let sessions = Arc::new(SessionRegistry::new());
//! let reader = Reader::builder("reader0", transceiver)
//!     .card_systems(CardSystems::new())
//!     .archive(Arc::new(DirArchive::new("/var/lib/smartcas")))
//!     .sessions(sessions.clone())
//!     .build();
//!
//! let session = sessions.open("alice", reader.id().clone());
//! if reader.check_health() {
//!     let outcome = reader.process_ecm(session, &EcmRequest::new(0x0001, 0x0B00, vec![0x80]));
//!     println!("{outcome:?}");
//! }
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

mod activation;
pub mod archive;
pub mod config;
pub mod delay;
mod error;
mod reader;
pub mod session;
pub mod state;

#[cfg(test)]
mod mock;

pub use activation::{ACTIVATION_ATTEMPTS, RETRY_DELAY, SETTLE_DELAY};
pub use archive::{ArchiveNames, DirArchive, EmmArchive};
pub use config::{ReaderConfig, SignatureConfig};
pub use delay::{Delay, ThreadSleep};
pub use error::{ArchiveError, ReaderError};
pub use reader::{EcmOutcome, EmmOutcome, Reader, ReaderBuilder};
pub use session::{ClientSession, ClientSessions, SessionEvent, SessionId, SessionRegistry};
pub use state::{CardStatus, ReaderId, ReaderState};
