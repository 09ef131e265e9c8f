//! Byte formatting helpers used for logging and archival

use crate::Result;

/// Format bytes as uppercase hex, optionally separating bytes with a space
pub fn hexdump(bytes: &[u8], spaced: bool) -> String {
    if !spaced {
        return hex::encode_upper(bytes);
    }

    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, byte) in bytes.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        out.push_str(&format!("{byte:02X}"));
    }
    out
}

/// Decode a hex string, ignoring any whitespace
pub fn decode_hex(text: &str) -> Result<Vec<u8>> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(hex::decode(compact)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hexdump() {
        assert_eq!(hexdump(&[0x82, 0x70, 0x0a], false), "82700A");
        assert_eq!(hexdump(&[0x82, 0x70, 0x0a], true), "82 70 0A");
        assert_eq!(hexdump(&[], true), "");
    }

    #[test]
    fn test_decode_hex() {
        assert_eq!(decode_hex("82 70 0A").unwrap(), vec![0x82, 0x70, 0x0a]);
        assert_eq!(decode_hex("82700a\n").unwrap(), vec![0x82, 0x70, 0x0a]);
        assert!(decode_hex("8").is_err());
    }

    #[test]
    fn test_decode_hex_error() {
        assert_eq!(
            decode_hex("82zz"),
            Err(crate::Error::Hex(hex::FromHexError::InvalidHexCharacter {
                c: 'z',
                index: 2
            }))
        );
    }
}
