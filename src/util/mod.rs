//! # Utility Modules
//!
//! This module provides common utility functions used throughout the
//! lorawan-ns crate, currently hex encoding/decoding for the opaque binary
//! identifiers (EUIs, addresses, keys) that cross external interfaces.

pub mod hex;

// Re-export commonly used functions
pub use hex::{decode_hex, encode_hex, format_hex_compact, hex_to_bytes};
