//! # LoRaWAN PHY Frame Handling
//!
//! This module provides parsing and generation of LoRaWAN 1.0 PHY payloads
//! as exchanged with radio gateways. It owns the byte-level frame layout,
//! the bit-packed header fields, and the wire-order conversions.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────────────┬──────────┐
//! │  MHDR    │  MACPayload                                  │  MIC     │
//! │  (1 byte)│  (variable)                                  │ (4 bytes)│
//! └──────────┴──────────────────────────────────────────────┴──────────┘
//! ```
//!
//! For data frames the MACPayload carries a FHDR
//! (DevAddr, FCtrl, FCnt, FOpts) followed by an optional FPort and
//! FRMPayload. A join-request carries AppEUI, DevEUI and DevNonce instead.
//!
//! ## Wire Order
//!
//! DevAddr, DevEUI and AppEUI are transmitted least-significant-byte first;
//! the rest of the crate stores them most-significant-byte first. The
//! `from_wire`/`to_wire` constructors in this module are the only reversal
//! sites; nothing outside the codec re-orders identifier bytes.

use std::fmt;

use nom::bytes::complete::take;
use nom::number::complete::{le_u16, u8 as any_byte};
use nom::IResult;
use serde::{Deserialize, Serialize};

use crate::constants::{DATA_MIN_LEN, FOPTS_MAX_LEN, JOIN_REQUEST_LEN, MIC_LEN};
use crate::error::LoraWanError;
use crate::util::hex::{decode_hex, encode_hex};

/// 64-bit extended unique identifier, stored most-significant-byte first.
///
/// Used for gateway MACs, DevEUIs and AppEUIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Eui([u8; 8]);

impl Eui {
    pub fn new(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Build an EUI from its wire representation (LSB first).
    pub fn from_wire(wire: &[u8]) -> Result<Self, LoraWanError> {
        let mut bytes: [u8; 8] = wire
            .try_into()
            .map_err(|_| LoraWanError::FrameParse(format!("EUI must be 8 bytes, got {}", wire.len())))?;
        bytes.reverse();
        Ok(Self(bytes))
    }

    /// Wire representation (LSB first).
    pub fn to_wire(self) -> [u8; 8] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    pub fn from_hex(s: &str) -> Result<Self, LoraWanError> {
        let bytes = decode_hex(s).map_err(|_| LoraWanError::InvalidHexString)?;
        let bytes: [u8; 8] = bytes.try_into().map_err(|_| LoraWanError::InvalidHexString)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }
}

impl fmt::Display for Eui {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", encode_hex(&self.0))
    }
}

/// 32-bit per-session network address assigned on join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DevAddr(u32);

impl DevAddr {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    /// Build a DevAddr from its wire representation (LSB first).
    pub fn from_wire(wire: &[u8]) -> Result<Self, LoraWanError> {
        let bytes: [u8; 4] = wire
            .try_into()
            .map_err(|_| LoraWanError::FrameParse(format!("DevAddr must be 4 bytes, got {}", wire.len())))?;
        Ok(Self(u32::from_le_bytes(bytes)))
    }

    /// Wire representation (LSB first).
    pub fn to_wire(self) -> [u8; 4] {
        self.0.to_le_bytes()
    }

    pub fn from_hex(s: &str) -> Result<Self, LoraWanError> {
        let bytes = decode_hex(s).map_err(|_| LoraWanError::InvalidHexString)?;
        let bytes: [u8; 4] = bytes.try_into().map_err(|_| LoraWanError::InvalidHexString)?;
        Ok(Self(u32::from_be_bytes(bytes)))
    }
}

impl fmt::Display for DevAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

/// Device nonce from a join-request, kept in wire byte order.
///
/// The nonce participates in session-key derivation exactly as it appears
/// on the air, so it is never re-ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevNonce([u8; 2]);

impl DevNonce {
    pub fn new(bytes: [u8; 2]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl fmt::Display for DevNonce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", u16::from_le_bytes(self.0))
    }
}

/// Server nonce generated for a join-accept, kept in transmitted byte order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppNonce([u8; 3]);

impl AppNonce {
    pub fn new(bytes: [u8; 3]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 3] {
        &self.0
    }
}

/// MAC header message type (top 3 bits of MHDR).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MType {
    JoinRequest,
    JoinAccept,
    UnconfirmedDataUp,
    UnconfirmedDataDown,
    ConfirmedDataUp,
    ConfirmedDataDown,
}

impl MType {
    /// True for the two uplink data types.
    pub fn is_data_uplink(self) -> bool {
        matches!(self, MType::UnconfirmedDataUp | MType::ConfirmedDataUp)
    }
}

impl TryFrom<u8> for MType {
    type Error = LoraWanError;

    /// Extract the message type from a full MHDR byte.
    fn try_from(mhdr: u8) -> Result<Self, Self::Error> {
        match (mhdr >> 5) & 0x07 {
            0b000 => Ok(MType::JoinRequest),
            0b001 => Ok(MType::JoinAccept),
            0b010 => Ok(MType::UnconfirmedDataUp),
            0b011 => Ok(MType::UnconfirmedDataDown),
            0b100 => Ok(MType::ConfirmedDataUp),
            0b101 => Ok(MType::ConfirmedDataDown),
            t => Err(LoraWanError::FrameParse(format!("unsupported message type {t:#05b}"))),
        }
    }
}

impl fmt::Display for MType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MType::JoinRequest => "JoinRequest",
            MType::JoinAccept => "JoinAccept",
            MType::UnconfirmedDataUp => "UnconfirmedDataUp",
            MType::UnconfirmedDataDown => "UnconfirmedDataDown",
            MType::ConfirmedDataUp => "ConfirmedDataUp",
            MType::ConfirmedDataDown => "ConfirmedDataDown",
        };
        write!(f, "{name}")
    }
}

/// Build the MHDR byte for a message type (major version 0, RFU bits 0).
pub fn mhdr_byte(mtype: MType) -> u8 {
    let bits: u8 = match mtype {
        MType::JoinRequest => 0b000,
        MType::JoinAccept => 0b001,
        MType::UnconfirmedDataUp => 0b010,
        MType::UnconfirmedDataDown => 0b011,
        MType::ConfirmedDataUp => 0b100,
        MType::ConfirmedDataDown => 0b101,
    };
    bits << 5
}

/// Frame control byte (FCtrl).
///
/// Bit 4 is RFU on uplinks and FPending on downlinks; it is surfaced as
/// `fpending` and simply reads as false for compliant uplinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FCtrl {
    pub adr: bool,
    pub adr_ack_req: bool,
    pub ack: bool,
    pub fpending: bool,
    pub fopts_len: u8,
}

impl FCtrl {
    pub fn from_byte(byte: u8) -> Self {
        Self {
            adr: byte & 0x80 != 0,
            adr_ack_req: byte & 0x40 != 0,
            ack: byte & 0x20 != 0,
            fpending: byte & 0x10 != 0,
            fopts_len: byte & 0x0F,
        }
    }

    pub fn to_byte(self) -> u8 {
        (u8::from(self.adr) << 7)
            | (u8::from(self.adr_ack_req) << 6)
            | (u8::from(self.ack) << 5)
            | (u8::from(self.fpending) << 4)
            | (self.fopts_len & 0x0F)
    }
}

/// Parsed data frame header and payload, still carrying the encrypted
/// FRMPayload. The MIC is split off before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFrame {
    pub mtype: MType,
    pub devaddr: DevAddr,
    pub fctrl: FCtrl,
    pub fcnt: u16,
    pub fopts: Vec<u8>,
    pub fport: Option<u8>,
    pub frm_payload: Vec<u8>,
}

/// Parsed join-request body with identifiers in canonical (MSB-first) order.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequest {
    pub appeui: Eui,
    pub deveui: Eui,
    pub devnonce: DevNonce,
}

/// Split a PHY payload into the MIC'ed message part and the trailing MIC.
pub fn split_mic(phy_payload: &[u8]) -> Result<(&[u8], [u8; 4]), LoraWanError> {
    if phy_payload.len() < 1 + MIC_LEN {
        return Err(LoraWanError::FrameParse(format!(
            "PHY payload too short: {} bytes",
            phy_payload.len()
        )));
    }
    let split = phy_payload.len() - MIC_LEN;
    let mut mic = [0u8; MIC_LEN];
    mic.copy_from_slice(&phy_payload[split..]);
    Ok((&phy_payload[..split], mic))
}

fn fhdr(input: &[u8]) -> IResult<&[u8], (DevAddr, FCtrl, u16)> {
    let (input, addr) = take(4usize)(input)?;
    let (input, fctrl) = any_byte(input)?;
    let (input, fcnt) = le_u16(input)?;
    let devaddr = DevAddr(u32::from_le_bytes([addr[0], addr[1], addr[2], addr[3]]));
    Ok((input, (devaddr, FCtrl::from_byte(fctrl), fcnt)))
}

/// Parse a data frame from the message part of an uplink PHY payload
/// (MHDR through FRMPayload, MIC already removed).
pub fn parse_data_frame(msg: &[u8]) -> Result<DataFrame, LoraWanError> {
    if msg.len() + MIC_LEN < DATA_MIN_LEN {
        return Err(LoraWanError::FrameParse(format!(
            "data frame too short: {} bytes",
            msg.len() + MIC_LEN
        )));
    }
    let mtype = MType::try_from(msg[0])?;

    let (rest, (devaddr, fctrl, fcnt)) = fhdr(&msg[1..])
        .map_err(|_| LoraWanError::FrameParse("truncated frame header".into()))?;

    let fopts_len = fctrl.fopts_len as usize;
    if fopts_len > rest.len() {
        return Err(LoraWanError::FrameParse(format!(
            "FOptsLen {} exceeds available data",
            fopts_len
        )));
    }
    let (fopts, rest) = rest.split_at(fopts_len);

    let (fport, frm_payload) = match rest.split_first() {
        Some((&port, payload)) => (Some(port), payload.to_vec()),
        None => (None, Vec::new()),
    };

    Ok(DataFrame {
        mtype,
        devaddr,
        fctrl,
        fcnt,
        fopts: fopts.to_vec(),
        fport,
        frm_payload,
    })
}

/// Parse a join-request from the message part of its PHY payload
/// (MHDR through DevNonce, MIC already removed).
pub fn parse_join_request(msg: &[u8]) -> Result<JoinRequest, LoraWanError> {
    if msg.len() + MIC_LEN != JOIN_REQUEST_LEN {
        return Err(LoraWanError::FrameParse(format!(
            "join-request must be {} bytes, got {}",
            JOIN_REQUEST_LEN,
            msg.len() + MIC_LEN
        )));
    }

    fn body(input: &[u8]) -> IResult<&[u8], (&[u8], &[u8], &[u8])> {
        let (input, appeui) = take(8usize)(input)?;
        let (input, deveui) = take(8usize)(input)?;
        let (input, devnonce) = take(2usize)(input)?;
        Ok((input, (appeui, deveui, devnonce)))
    }

    let (_, (appeui, deveui, devnonce)) =
        body(&msg[1..]).map_err(|_| LoraWanError::FrameParse("truncated join-request".into()))?;

    Ok(JoinRequest {
        appeui: Eui::from_wire(appeui)?,
        deveui: Eui::from_wire(deveui)?,
        devnonce: DevNonce::new([devnonce[0], devnonce[1]]),
    })
}

/// Assemble the message part of a data downlink (MHDR through FRMPayload,
/// without MIC). `fopts` must already be clamped to [`FOPTS_MAX_LEN`];
/// `frm_payload` is expected to be ciphered.
pub fn encode_data_frame(
    mtype: MType,
    devaddr: DevAddr,
    fctrl: FCtrl,
    fcnt: u16,
    fopts: &[u8],
    fport: Option<u8>,
    frm_payload: &[u8],
) -> Vec<u8> {
    debug_assert!(fopts.len() <= FOPTS_MAX_LEN);
    let mut msg = Vec::with_capacity(8 + fopts.len() + 1 + frm_payload.len());
    msg.push(mhdr_byte(mtype));
    msg.extend_from_slice(&devaddr.to_wire());
    msg.push(fctrl.to_byte());
    msg.extend_from_slice(&fcnt.to_le_bytes());
    msg.extend_from_slice(fopts);
    if let Some(port) = fport {
        msg.push(port);
        msg.extend_from_slice(frm_payload);
    }
    msg
}

/// Assemble the plaintext MACPayload of a join-accept (without MHDR or MIC):
/// AppNonce, NetID, DevAddr(wire), DLSettings, RxDelay. No CFList is
/// appended.
pub fn encode_join_accept(
    appnonce: AppNonce,
    netid: [u8; 3],
    devaddr: DevAddr,
    rx1_dr_offset: u8,
    rx2_datarate: u8,
    rx_delay: u8,
) -> Vec<u8> {
    let dlsettings = ((rx1_dr_offset & 0x07) << 4) | (rx2_datarate & 0x0F);
    let mut payload = Vec::with_capacity(12);
    payload.extend_from_slice(appnonce.as_bytes());
    payload.extend_from_slice(&netid);
    payload.extend_from_slice(&devaddr.to_wire());
    payload.push(dlsettings);
    payload.push(rx_delay);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eui_wire_reversal() {
        let eui = Eui::from_wire(&[0x30, 0x5F, 0x1A, 0x00, 0x0B, 0xA3, 0x04, 0x00]).unwrap();
        assert_eq!(eui, Eui::from_hex("0004A30B001A5F30").unwrap());
        assert_eq!(eui.to_wire(), [0x30, 0x5F, 0x1A, 0x00, 0x0B, 0xA3, 0x04, 0x00]);
        assert_eq!(eui.to_string(), "0004a30b001a5f30");
    }

    #[test]
    fn test_devaddr_wire_reversal() {
        let addr = DevAddr::from_wire(&[0x04, 0x03, 0x02, 0x01]).unwrap();
        assert_eq!(addr.value(), 0x01020304);
        assert_eq!(addr.to_wire(), [0x04, 0x03, 0x02, 0x01]);
        assert_eq!(addr.to_string(), "01020304");
    }

    #[test]
    fn test_fctrl_roundtrip() {
        for byte in [0x00u8, 0x80, 0xA3, 0x5F, 0xFF] {
            assert_eq!(FCtrl::from_byte(byte).to_byte(), byte);
        }
        let fctrl = FCtrl::from_byte(0x80);
        assert!(fctrl.adr);
        assert!(!fctrl.ack);
        assert_eq!(fctrl.fopts_len, 0);
    }

    #[test]
    fn test_mhdr_byte_values() {
        assert_eq!(mhdr_byte(MType::JoinRequest), 0x00);
        assert_eq!(mhdr_byte(MType::JoinAccept), 0x20);
        assert_eq!(mhdr_byte(MType::UnconfirmedDataUp), 0x40);
        assert_eq!(mhdr_byte(MType::UnconfirmedDataDown), 0x60);
        assert_eq!(mhdr_byte(MType::ConfirmedDataUp), 0x80);
        assert_eq!(mhdr_byte(MType::ConfirmedDataDown), 0xA0);
    }

    #[test]
    fn test_reserved_mtypes_rejected() {
        assert!(MType::try_from(0xC0).is_err());
        assert!(MType::try_from(0xE0).is_err());
    }
}
