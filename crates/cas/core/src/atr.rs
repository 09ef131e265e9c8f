//! Answer-To-Reset buffer and ATR signature matching

use std::fmt;

use crate::utils::hexdump;
use crate::{Error, Result};

/// Answer-To-Reset returned by a card on activation
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Atr {
    bytes: [u8; Self::MAX_LEN],
    len: usize,
}

impl Atr {
    /// Maximum ATR length
    pub const MAX_LEN: usize = 64;

    /// Build an ATR from raw bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > Self::MAX_LEN {
            return Err(Error::AtrTooLong(bytes.len()));
        }
        let mut atr = Self::default();
        atr.bytes[..bytes.len()].copy_from_slice(bytes);
        atr.len = bytes.len();
        Ok(atr)
    }

    /// ATR bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len]
    }

    /// ATR length
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Whether the ATR is empty
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl Default for Atr {
    fn default() -> Self {
        Self {
            bytes: [0; Self::MAX_LEN],
            len: 0,
        }
    }
}

impl AsRef<[u8]> for Atr {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

impl fmt::Debug for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Atr").field(&hex::encode(self.as_bytes())).finish()
    }
}

impl fmt::Display for Atr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hexdump(self.as_bytes(), true))
    }
}

/// ATR prefix pattern with an optional bit mask
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AtrSignature {
    pattern: Vec<u8>,
    mask: Option<Vec<u8>>,
}

impl AtrSignature {
    /// Create a signature from a pattern and optional mask
    pub const fn new(pattern: Vec<u8>, mask: Option<Vec<u8>>) -> Self {
        Self { pattern, mask }
    }

    /// Parse a signature from hex strings (whitespace is ignored)
    pub fn from_hex(pattern: &str, mask: Option<&str>) -> Result<Self> {
        let pattern = crate::utils::decode_hex(pattern)?;
        let mask = mask.map(crate::utils::decode_hex).transpose()?;
        Ok(Self::new(pattern, mask))
    }

    /// Match an ATR against the signature
    ///
    /// If a mask is provided, only the bits set in the mask are compared.
    pub fn matches(&self, atr: &[u8]) -> bool {
        // If pattern is longer than ATR, it can't match
        if self.pattern.len() > atr.len() {
            return false;
        }

        match &self.mask {
            Some(mask) => {
                // Mask must be at least as long as pattern
                mask.len() >= self.pattern.len()
                    && self
                        .pattern
                        .iter()
                        .zip(mask)
                        .zip(atr)
                        .all(|((p, m), a)| a & m == p & m)
            }
            None => atr.starts_with(&self.pattern),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_atr_bounds() {
        let atr = Atr::from_slice(&hex!("3B9F21")).unwrap();
        assert_eq!(atr.len(), 3);
        assert_eq!(atr.as_bytes(), &hex!("3B9F21"));
        assert_eq!(atr.to_string(), "3B 9F 21");

        assert!(Atr::from_slice(&[0u8; Atr::MAX_LEN]).is_ok());
        assert_eq!(
            Atr::from_slice(&[0u8; Atr::MAX_LEN + 1]),
            Err(Error::AtrTooLong(Atr::MAX_LEN + 1))
        );
    }

    #[test]
    fn test_signature_without_mask() {
        let sig = AtrSignature::from_hex("3B 78 12", None).unwrap();
        assert!(sig.matches(&hex!("3B781200006545")));
        assert!(!sig.matches(&hex!("3B791200006545")));
        assert!(!sig.matches(&hex!("3B78")));
    }

    #[test]
    fn test_signature_with_mask() {
        let sig = AtrSignature::from_hex("3B0F", Some("FF0F")).unwrap();
        assert!(sig.matches(&hex!("3B9F21")));
        assert!(sig.matches(&hex!("3B2F")));
        assert!(!sig.matches(&hex!("3B9E21")));

        // Mask shorter than pattern never matches
        let sig = AtrSignature::from_hex("3B0F", Some("FF")).unwrap();
        assert!(!sig.matches(&hex!("3B0F")));
    }
}
