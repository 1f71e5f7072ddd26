//! # LoRaWAN Error Handling
//!
//! This module defines the LoraWanError enum, which represents the different
//! error types that can occur in the lorawan-ns crate.

use thiserror::Error;

use crate::lorawan::crypto::CryptoError;
use crate::lorawan::frame::{DevAddr, Eui};
use crate::lorawan::registry::RegistryError;

/// Represents the different error types that can occur in the MAC core.
///
/// MIC failures and counter-gap violations never mutate registry state;
/// callers may report them and drop the frame without recovery logic.
#[derive(Debug, Error)]
pub enum LoraWanError {
    /// The forwarding gateway is not registered.
    #[error("Unknown gateway MAC: {0}")]
    UnknownMac(Eui),

    /// A join-request arrived for a DevEUI without a device record.
    #[error("Unknown DevEUI: {0}")]
    UnknownDevEui(Eui),

    /// A data frame arrived for a DevAddr without an active session.
    #[error("Unknown DevAddr: {0}")]
    UnknownDevAddr(DevAddr),

    /// The frame MIC did not match the expected AES-CMAC value.
    #[error("Bad MIC")]
    BadMic,

    /// The reconstructed frame counter jumped too far ahead of the session.
    #[error("Frame counter gap {gap} exceeds the allowed window")]
    FcntGapTooLarge { gap: u32 },

    /// Indicates an error when parsing a PHY payload.
    #[error("Error parsing LoRaWAN frame: {0}")]
    FrameParse(String),

    /// Indicates an invalid runtime configuration (e.g. an RX2 data rate
    /// outside the regional table).
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Indicates a cryptographic operation failure.
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Indicates an error raised by the registry backend.
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    /// Indicates an error returned by the application handler.
    #[error("Application handler error: {0}")]
    App(String),

    /// Indicates an invalid hexadecimal string was provided.
    #[error("Invalid hexadecimal string")]
    InvalidHexString,
}
