//! Text <-> hex conversion for `at+send=lorap2p:` payloads.
//!
//! The radio carries payloads as hex digits on the AT line: two uppercase
//! digits per byte. The command line has a fixed length limit, so encoding
//! checks the result against a character budget and refuses rather than
//! truncates.

use hex::FromHexError;

use crate::error::{CodecError, Result};

/// Encode `text` as uppercase hex, two digits per byte.
///
/// ```
/// assert_eq!(lorabridge_codec::hex::encode_hex("{}"), "7B7D");
/// ```
pub fn encode_hex(text: &str) -> String {
    hex::encode_upper(text.as_bytes())
}

/// Encode `text` for transmission, rejecting it if the hex form would
/// exceed `budget` characters.
pub fn encode_payload(text: &str, budget: usize) -> Result<String> {
    let len = text.len() * 2;
    if len > budget {
        return Err(CodecError::PayloadTooLarge { len, budget });
    }
    Ok(encode_hex(text))
}

/// Decode a hex payload back to text.
///
/// Either digit case is accepted. Bytes that are not valid UTF-8 are
/// replaced with U+FFFD; the JSON parser downstream rejects anything that
/// is actually garbled.
pub fn decode_hex(payload_hex: &str) -> Result<String> {
    let bytes = hex::decode(payload_hex).map_err(|e| match e {
        FromHexError::InvalidHexCharacter { c, index } => CodecError::InvalidHex { c, index },
        FromHexError::OddLength | FromHexError::InvalidStringLength => {
            CodecError::OddLength(payload_hex.len())
        }
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_is_uppercase() {
        assert_eq!(encode_hex("{\"md\":1}"), "7B226D64223A317D");
    }

    #[test]
    fn decode_accepts_either_case() {
        assert_eq!(decode_hex("7B7D").unwrap(), "{}");
        assert_eq!(decode_hex("7b7d").unwrap(), "{}");
    }

    #[test]
    fn round_trip_cases() {
        let latin1: String = (0u8..=255).map(char::from).collect();
        let cases = [
            "",
            "{}",
            "{\"i\":\"R1\",\"sv\":[65,150,245],\"av\":[1,0,0]}",
            "{\"i\":\"Raum-Süd\",\"x\":0}",
            "温室 🌱",
            latin1.as_str(),
        ];
        for text in cases {
            let encoded = encode_hex(text);
            assert_eq!(encoded.len(), text.len() * 2, "{text:?}");
            assert_eq!(decode_hex(&encoded).unwrap(), text, "{text:?}");
        }
    }

    #[test]
    fn every_ascii_byte_encodes_to_its_two_digits() {
        for b in 0u8..=127 {
            let text = char::from(b).to_string();
            let encoded = encode_hex(&text);
            assert_eq!(encoded, format!("{b:02X}"));
            assert_eq!(decode_hex(&encoded).unwrap(), text);
        }
    }

    #[test]
    fn decode_odd_length() {
        assert!(matches!(decode_hex("7B7"), Err(CodecError::OddLength(3))));
    }

    #[test]
    fn decode_invalid_digit() {
        match decode_hex("7G7D") {
            Err(CodecError::InvalidHex { c, index }) => {
                assert_eq!(c, 'G');
                assert_eq!(index, 1);
            }
            other => panic!("expected InvalidHex, got {other:?}"),
        }
    }

    #[test]
    fn decode_invalid_utf8_is_replaced() {
        let text = decode_hex("7BFF7D").unwrap();
        assert_eq!(text, "{\u{FFFD}}");
    }

    #[test]
    fn encode_payload_respects_budget() {
        assert_eq!(encode_payload("AB", 4).unwrap(), "4142");
        match encode_payload("ABC", 4) {
            Err(CodecError::PayloadTooLarge { len, budget }) => {
                assert_eq!(len, 6);
                assert_eq!(budget, 4);
            }
            other => panic!("expected PayloadTooLarge, got {other:?}"),
        }
    }
}
