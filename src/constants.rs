//! LoRaWAN Protocol Constants
//!
//! This module defines constants used in the LoRaWAN MAC implementation,
//! based on the LoRaWAN 1.0.1 specification and the EU868 regional defaults.

/// AES block length in bytes; all MIC and payload ciphering operates on
/// 16-byte blocks.
pub const AES_BLOCK_LEN: usize = 16;

/// MIC length in bytes (truncated AES-CMAC).
pub const MIC_LEN: usize = 4;

/// Total length of a join-request PHY payload:
/// MHDR(1) + AppEUI(8) + DevEUI(8) + DevNonce(2) + MIC(4).
pub const JOIN_REQUEST_LEN: usize = 23;

/// Minimum length of a data PHY payload:
/// MHDR(1) + DevAddr(4) + FCtrl(1) + FCnt(2) + MIC(4).
pub const DATA_MIN_LEN: usize = 12;

/// Maximum FOpts length; FOptsLen is a 4-bit field in FCtrl.
pub const FOPTS_MAX_LEN: usize = 15;

/// Largest accepted gap between the stored 32-bit uplink counter and the
/// counter reconstructed from the 16-bit wire value. Larger gaps are
/// treated as replay or unrecoverable loss and the frame is rejected.
pub const MAX_FCNT_GAP: u32 = 16_384;

/// Delay from the end of a join-request to the join-accept transmission
/// (JOIN_ACCEPT_DELAY1), in microseconds of concentrator time.
pub const JOIN_ACCEPT_DELAY1_US: u32 = 5_000_000;

/// Delay from the end of an uplink to the RX2 window (RECEIVE_DELAY2),
/// in microseconds of concentrator time.
pub const RX_DELAY2_US: u32 = 2_000_000;

/// RxDelay field carried in every join-accept (RECEIVE_DELAY1 in seconds).
pub const JOIN_ACCEPT_RX_DELAY: u8 = 1;

/// Default RX2 center frequency in MHz (EU868 band plan).
pub const RX2_DEFAULT_FREQ_MHZ: f64 = 869.525;

/// Default RX2 data rate index (DR0, SF12BW125).
pub const RX2_DEFAULT_DATR: u8 = 0;

/// Default RX2 coding rate.
pub const RX2_DEFAULT_CODR: &str = "4/5";

/// Number of random candidates tried when allocating a fresh DevAddr
/// before giving up with an allocation error.
pub const DEVADDR_ALLOC_ATTEMPTS: u32 = 8;
