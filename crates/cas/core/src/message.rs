//! ECM and EMM buffers delivered by the broadcast side

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::{Error, Result};

/// Conditional-access system identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{_0:04X}")]
pub struct CaId(pub u16);

impl CaId {
    /// High byte, which identifies the CA vendor
    pub const fn system(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Whether the CA id is unset
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }
}

/// Broadcast service identifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, derive_more::Display)]
#[display("{_0:04X}")]
pub struct ServiceId(pub u16);

/// Entitlement Control Message request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EcmRequest {
    /// Service the ECM belongs to
    pub srvid: ServiceId,
    /// CA system the ECM was sent for
    pub caid: CaId,
    /// Raw ECM section
    pub payload: Bytes,
}

impl EcmRequest {
    /// Create a new ECM request
    pub fn new(srvid: u16, caid: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            srvid: ServiceId(srvid),
            caid: CaId(caid),
            payload: payload.into(),
        }
    }
}

/// Even and odd control words recovered from an ECM
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct ControlWords {
    /// Even control word
    pub even: [u8; 8],
    /// Odd control word
    pub odd: [u8; 8],
}

impl fmt::Debug for ControlWords {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Control words are secrets; only show whether they are set
        f.debug_struct("ControlWords")
            .field("even", &(self.even != [0; 8]))
            .field("odd", &(self.odd != [0; 8]))
            .finish()
    }
}

/// Entitlement Management Message packet
///
/// The payload lives in a fixed-size area so the packet can be archived and
/// reloaded as a fixed-size binary record.
#[derive(Clone, PartialEq, Eq)]
pub struct EmmPacket {
    data: [u8; Self::MAX_LEN],
    len: usize,
    caid: CaId,
    provider_id: [u8; 4],
    hex_serial: [u8; 8],
    emm_type: u8,
}

impl EmmPacket {
    /// Size of the payload area
    pub const MAX_LEN: usize = 258;

    /// Size of a binary EMM record
    pub const ENCODED_LEN: usize = Self::MAX_LEN + 2 + 2 + 4 + 8 + 1;

    /// Nano tag of an EMM addressed to a single card
    pub const UNIQUE_NANO: u8 = 0x82;

    /// Length of the section header preceding the 12-bit length field's data
    pub const HEADER_LEN: usize = 3;

    /// Create a packet from a raw EMM section
    pub fn new(payload: &[u8]) -> Result<Self> {
        if payload.len() > Self::MAX_LEN {
            return Err(Error::EmmTooLong(payload.len()));
        }
        let mut data = [0; Self::MAX_LEN];
        data[..payload.len()].copy_from_slice(payload);
        Ok(Self {
            data,
            len: payload.len(),
            caid: CaId::default(),
            provider_id: [0; 4],
            hex_serial: [0; 8],
            emm_type: 0,
        })
    }

    /// Set the CA id the EMM was received for
    pub const fn with_caid(mut self, caid: CaId) -> Self {
        self.caid = caid;
        self
    }

    /// Set the provider id the EMM was received for
    pub const fn with_provider_id(mut self, provider_id: [u8; 4]) -> Self {
        self.provider_id = provider_id;
        self
    }

    /// Set the card serial the EMM is addressed to
    pub const fn with_hex_serial(mut self, hex_serial: [u8; 8]) -> Self {
        self.hex_serial = hex_serial;
        self
    }

    /// Set the EMM type classification
    pub const fn with_emm_type(mut self, emm_type: u8) -> Self {
        self.emm_type = emm_type;
        self
    }

    /// Raw EMM bytes as received
    pub fn payload(&self) -> &[u8] {
        &self.data[..self.len]
    }

    /// Nano type tag (first payload byte)
    pub const fn nano(&self) -> u8 {
        self.data[0]
    }

    /// Whether the EMM is addressed to a single card
    pub const fn is_unique(&self) -> bool {
        self.nano() == Self::UNIQUE_NANO
    }

    /// Section length declared by the header: 3 header bytes plus the 12-bit length field
    pub fn section_len(&self) -> usize {
        let declared = (usize::from(self.data[1] & 0x0f) << 8) | usize::from(self.data[2]);
        Self::HEADER_LEN + declared
    }

    /// Bytes covered by the declared section length, capped at the payload area
    pub fn section(&self) -> &[u8] {
        &self.data[..self.section_len().min(Self::MAX_LEN)]
    }

    /// CA id the EMM was received for
    pub const fn caid(&self) -> CaId {
        self.caid
    }

    /// Provider id the EMM was received for
    pub const fn provider_id(&self) -> [u8; 4] {
        self.provider_id
    }

    /// Card serial the EMM is addressed to
    pub const fn hex_serial(&self) -> [u8; 8] {
        self.hex_serial
    }

    /// EMM type classification
    pub const fn emm_type(&self) -> u8 {
        self.emm_type
    }

    /// Encode the packet as a fixed-size binary record
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::ENCODED_LEN);
        buf.put_slice(&self.data);
        buf.put_u16(self.len as u16);
        buf.put_u16(self.caid.0);
        buf.put_slice(&self.provider_id);
        buf.put_slice(&self.hex_serial);
        buf.put_u8(self.emm_type);
        buf.freeze()
    }

    /// Decode a fixed-size binary record
    pub fn from_bytes(record: &[u8]) -> Result<Self> {
        if record.len() != Self::ENCODED_LEN {
            return Err(Error::InvalidEmmRecord("record size mismatch"));
        }

        let mut buf = record;
        let mut data = [0; Self::MAX_LEN];
        buf.copy_to_slice(&mut data);
        let len = usize::from(buf.get_u16());
        if len > Self::MAX_LEN {
            return Err(Error::InvalidEmmRecord("length exceeds payload area"));
        }
        let caid = CaId(buf.get_u16());
        let mut provider_id = [0; 4];
        buf.copy_to_slice(&mut provider_id);
        let mut hex_serial = [0; 8];
        buf.copy_to_slice(&mut hex_serial);
        let emm_type = buf.get_u8();

        Ok(Self {
            data,
            len,
            caid,
            provider_id,
            hex_serial,
            emm_type,
        })
    }
}

impl fmt::Debug for EmmPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmmPacket")
            .field("nano", &format_args!("{:02X}", self.nano()))
            .field("payload", &hex::encode(self.payload()))
            .field("caid", &self.caid)
            .field("emm_type", &self.emm_type)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_caid_system() {
        assert_eq!(CaId(0x0604).system(), 0x06);
        assert_eq!(CaId(0x0604).to_string(), "0604");
        assert!(CaId::default().is_zero());
    }

    #[test]
    fn test_emm_section_len() {
        let emm = EmmPacket::new(&hex!("82700A0102030405060708090A")).unwrap();
        assert_eq!(emm.nano(), 0x82);
        assert!(emm.is_unique());
        assert_eq!(emm.section_len(), 13);
        assert_eq!(emm.section(), &hex!("82700A0102030405060708090A"));

        // Upper nibble of byte 1 is not part of the length
        let emm = EmmPacket::new(&hex!("83F102")).unwrap();
        assert!(!emm.is_unique());
        assert_eq!(emm.section_len(), 3 + 0x102);
        assert_eq!(emm.section().len(), EmmPacket::MAX_LEN);
    }

    #[test]
    fn test_emm_too_long() {
        assert_eq!(
            EmmPacket::new(&[0u8; EmmPacket::MAX_LEN + 1]),
            Err(Error::EmmTooLong(EmmPacket::MAX_LEN + 1))
        );
    }

    #[test]
    fn test_emm_record() {
        let emm = EmmPacket::new(&hex!("8870050011223344"))
            .unwrap()
            .with_caid(CaId(0x0500))
            .with_provider_id(hex!("00032400"))
            .with_hex_serial(hex!("0000112233445566"))
            .with_emm_type(2);

        let record = emm.to_bytes();
        assert_eq!(record.len(), EmmPacket::ENCODED_LEN);

        let decoded = EmmPacket::from_bytes(&record).unwrap();
        assert_eq!(decoded, emm);
        assert_eq!(decoded.payload(), &hex!("8870050011223344"));
        assert_eq!(decoded.caid(), CaId(0x0500));
    }

    #[test]
    fn test_emm_record_rejects_bad_input() {
        assert!(EmmPacket::from_bytes(&[0u8; 10]).is_err());

        let mut record = vec![0u8; EmmPacket::ENCODED_LEN];
        record[EmmPacket::MAX_LEN] = 0xFF;
        assert_eq!(
            EmmPacket::from_bytes(&record),
            Err(Error::InvalidEmmRecord("length exceeds payload area"))
        );
    }
}
