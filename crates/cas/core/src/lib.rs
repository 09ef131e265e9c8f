//! Core traits and types for conditional-access smart card readers
//!
//! This crate provides the foundational types shared by the reader engine and
//! the transport implementations:
//!
//! - Byte buffers exchanged with the card and the broadcast side ([`Atr`],
//!   [`ResponseBuffer`], [`EcmRequest`], [`EmmPacket`])
//! - The [`Transceiver`] trait used to talk to a card terminal, together with
//!   the CT-BCS command set the engine issues
//! - The [`CardSystem`] capability implemented by every conditional-access
//!   scheme, and the [`CardSystems`] registry that probes them in a fixed order
//! - The per-nano save/block [`NanoPolicyTable`]
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![forbid(unsafe_code)]
#![warn(missing_docs, rustdoc::missing_crate_level_docs)]

// Re-export bytes for convenience
pub use bytes::{Bytes, BytesMut};

pub mod atr;
pub mod message;
pub mod policy;
pub mod system;
pub mod transport;
pub mod utils;

mod error;
pub use error::{Error, Result};

pub use atr::{Atr, AtrSignature};
pub use message::{CaId, ControlWords, EcmRequest, EmmPacket, ServiceId};
pub use policy::{NanoFlags, NanoPolicyTable, NanoSelection};
pub use system::{CardContext, CardData, CardSystem, CardSystemKind, CardSystems, SignatureSystem};
pub use transport::{Address, ResponseBuffer, Transceiver, TransportError};

/// Prelude module containing commonly used traits and types
pub mod prelude {
    pub use crate::{
        Atr, Bytes, CaId, CardContext, CardData, CardSystem, CardSystemKind, CardSystems,
        ControlWords, EcmRequest, EmmPacket, Error, NanoFlags, NanoPolicyTable, Result,
        transport::{Address, ResponseBuffer, Transceiver, TransportError},
    };
}
