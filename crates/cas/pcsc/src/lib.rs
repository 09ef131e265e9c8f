//! PC/SC transceiver for conditional-access smart card readers
//!
//! This crate implements the [`Transceiver`](smartcas_core::Transceiver) trait
//! from `smartcas-core` on top of the PC/SC API. The CT-BCS terminal commands
//! issued by the card session engine are emulated with PC/SC reader state
//! queries and card (re)connections; card commands are forwarded unchanged.
//!
//! # Examples
//!
//! ```no_run
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use smartcas_transport_pcsc::{PcscConfig, PcscDeviceManager};
//!
//! let manager = PcscDeviceManager::new()?;
//! for reader in manager.list_readers()? {
//!     println!("{} card={}", reader.name(), reader.has_card());
//! }
//!
//! let transceiver = manager.open(None, PcscConfig::default())?;
//! println!("Opened {}", transceiver.reader_name());
//! # Ok(())
//! # }
//! ```
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![warn(missing_docs)]

mod config;
mod error;
mod manager;
mod reader;
mod transceiver;

pub use config::{PcscConfig, ShareMode};
pub use error::PcscError;
pub use manager::PcscDeviceManager;
pub use reader::PcscReader;
pub use transceiver::PcscTransceiver;

// Re-export some pcsc types for convenience
pub use pcsc::{Protocol, Protocols};
