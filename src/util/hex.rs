//! # Hex Encoding/Decoding Utilities
//!
//! This module provides the hex encoding and decoding functions used
//! throughout the LoRaWAN implementation for identifier display, debugging,
//! and test frame construction.
//!
//! ## Features
//!
//! - Efficient hex encoding/decoding using the `hex` crate
//! - Case-insensitive decoding with whitespace stripping
//! - Error handling for invalid hex strings

use thiserror::Error;

/// Errors that can occur during hex operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("Odd number of hex characters: {0}")]
    OddLength(usize),

    #[error("Empty hex string")]
    EmptyString,

    #[error("Hex decoding error: {0}")]
    DecodeError(String),
}

/// Encode bytes to lowercase hex string
///
/// This is the primary encoding function used throughout the codebase
/// for consistent hex representation.
pub fn encode_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hex string to bytes
///
/// Accepts both uppercase and lowercase hex characters.
/// Whitespace is automatically stripped.
pub fn decode_hex(hex_str: &str) -> Result<Vec<u8>, HexError> {
    if hex_str.is_empty() {
        return Err(HexError::EmptyString);
    }

    let cleaned: String = hex_str.chars().filter(|c| !c.is_whitespace()).collect();

    if cleaned.len() % 2 != 0 {
        return Err(HexError::OddLength(cleaned.len()));
    }

    hex::decode(&cleaned).map_err(|e| HexError::DecodeError(e.to_string()))
}

/// Format hex data for compact display (useful for logs)
///
/// Formats data as "40 04 03 02" with spaces between bytes.
pub fn format_hex_compact(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Helper for creating test data from hex strings
///
/// Panics on invalid hex (intended for test code only).
pub fn hex_to_bytes(hex: &str) -> Vec<u8> {
    decode_hex(hex).expect("Invalid hex in test data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode_roundtrip() {
        let data = vec![0x40, 0x04, 0x03, 0x02, 0x01, 0x80, 0x01, 0x00];
        let encoded = encode_hex(&data);
        let decoded = decode_hex(&encoded).unwrap();
        assert_eq!(data, decoded);
    }

    #[test]
    fn test_decode_is_case_insensitive() {
        assert_eq!(decode_hex("ABCDEF").unwrap(), vec![0xAB, 0xCD, 0xEF]);
        assert_eq!(decode_hex("abcdef").unwrap(), vec![0xAB, 0xCD, 0xEF]);
    }

    #[test]
    fn test_decode_with_whitespace() {
        let hex = "40 04 03 02";
        let expected = vec![0x40, 0x04, 0x03, 0x02];
        assert_eq!(decode_hex(hex).unwrap(), expected);
    }

    #[test]
    fn test_format_compact() {
        let data = vec![0x40, 0x04, 0x03, 0x02];
        assert_eq!(format_hex_compact(&data), "40 04 03 02");
    }

    #[test]
    fn test_errors() {
        assert!(decode_hex("").is_err());
        assert!(decode_hex("1").is_err()); // Odd length
        assert!(decode_hex("GG").is_err()); // Invalid character
    }
}
