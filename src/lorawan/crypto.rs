//! # LoRaWAN 1.0 Frame Cryptography
//!
//! This module implements the AES-128 primitives the MAC layer relies on:
//! frame integrity codes (4-byte truncated AES-CMAC over a prefixed B0
//! block), the counter-style FRMPayload cipher, ECB block operations for
//! the join-accept, and OTAA session-key derivation.
//!
//! ## Block layouts
//!
//! MIC and payload ciphering both prefix a 16-byte block whose layout only
//! differs in the first and last byte:
//!
//! ```text
//! B0 = 49 00 00 00 00 | dir | DevAddr(LE,4) | FCnt32(LE,4) | 00 | len(msg)
//! Ai = 01 00 00 00 00 | dir | DevAddr(LE,4) | FCnt32(LE,4) | 00 | i
//! ```
//!
//! where `dir` is 0 for uplink and 1 for downlink and `i` is the 1-based
//! index of the 16-byte keystream block.

use aes::cipher::{generic_array::GenericArray, BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use cmac::{Cmac, Mac};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::constants::{AES_BLOCK_LEN, MIC_LEN};
use crate::lorawan::frame::{AppNonce, DevAddr, DevNonce};
use crate::util::hex::decode_hex;

/// Errors raised by key handling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CryptoError {
    #[error("Invalid key length: expected {expected}, got {actual}")]
    InvalidKeyLength { expected: usize, actual: usize },

    #[error("Invalid key encoding: {reason}")]
    InvalidKeyEncoding { reason: String },
}

/// Frame direction as encoded in the B0/Ai blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Uplink,
    Downlink,
}

impl Direction {
    fn byte(self) -> u8 {
        match self {
            Direction::Uplink => 0,
            Direction::Downlink => 1,
        }
    }
}

/// AES-128 key material: AppKey or a derived session key.
///
/// The key bytes are wiped on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct AesKey {
    key: [u8; 16],
}

impl AesKey {
    /// Create AES key from a 16-byte slice.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() != 16 {
            return Err(CryptoError::InvalidKeyLength {
                expected: 16,
                actual: bytes.len(),
            });
        }

        let mut key = [0u8; 16];
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    /// Create AES key from a hex string.
    pub fn from_hex(hex_str: &str) -> Result<Self, CryptoError> {
        let bytes = decode_hex(hex_str).map_err(|e| CryptoError::InvalidKeyEncoding {
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    /// Get key bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.key
    }
}

impl From<[u8; 16]> for AesKey {
    fn from(key: [u8; 16]) -> Self {
        Self { key }
    }
}

impl fmt::Debug for AesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AesKey(..)")
    }
}

/// AES-CMAC truncated to the first 4 bytes.
pub fn cmac_mic(key: &AesKey, msg: &[u8]) -> [u8; MIC_LEN] {
    let mut mac = <Cmac<Aes128> as Mac>::new(GenericArray::from_slice(key.as_bytes()));
    mac.update(msg);
    let tag = mac.finalize().into_bytes();

    let mut mic = [0u8; MIC_LEN];
    mic.copy_from_slice(&tag[..MIC_LEN]);
    mic
}

/// MIC of a data frame: CMAC over the B0 block followed by `msg`, where
/// `msg` is MHDR plus MACPayload and B0 encodes direction, address and the
/// full 32-bit frame counter.
pub fn data_mic(
    key: &AesKey,
    dir: Direction,
    devaddr: DevAddr,
    fcnt: u32,
    msg: &[u8],
) -> [u8; MIC_LEN] {
    let b0 = prefix_block(0x49, dir, devaddr, fcnt, msg.len() as u8);
    let mut buf = Vec::with_capacity(AES_BLOCK_LEN + msg.len());
    buf.extend_from_slice(&b0);
    buf.extend_from_slice(msg);
    cmac_mic(key, &buf)
}

/// MIC of a join-request or join-accept: plain CMAC over the message bytes
/// (MHDR included), no prefix block.
pub fn join_mic(key: &AesKey, msg: &[u8]) -> [u8; MIC_LEN] {
    cmac_mic(key, msg)
}

/// Encrypt or decrypt a FRMPayload.
///
/// Generates the keystream `S_i = AES-ECB-Enc(key, A_i)` and XORs it over
/// the payload; the final short block uses only the leading keystream
/// bytes. The operation is its own inverse under identical
/// (key, dir, DevAddr, FCnt).
pub fn payload_cipher(
    key: &AesKey,
    dir: Direction,
    devaddr: DevAddr,
    fcnt: u32,
    payload: &[u8],
) -> Vec<u8> {
    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut out = Vec::with_capacity(payload.len());
    for (i, chunk) in payload.chunks(AES_BLOCK_LEN).enumerate() {
        let ai = prefix_block(0x01, dir, devaddr, fcnt, (i + 1) as u8);
        let mut keystream = GenericArray::clone_from_slice(&ai);
        cipher.encrypt_block(&mut keystream);
        out.extend(chunk.iter().zip(keystream.iter()).map(|(p, s)| p ^ s));
    }
    out
}

/// Encrypt a single 16-byte block with AES-128 in ECB mode.
pub fn aes_ecb_encrypt(key: &AesKey, block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut buf);
    buf.into()
}

/// Decrypt a single 16-byte block with AES-128 in ECB mode.
pub fn aes_ecb_decrypt(key: &AesKey, block: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key.as_bytes()));
    let mut buf = GenericArray::clone_from_slice(block);
    cipher.decrypt_block(&mut buf);
    buf.into()
}

/// AES-ECB-decrypt a message, zero-padding it to a block multiple first.
///
/// The join-accept body is produced with the *decrypt* primitive on the
/// server: the device only implements AES encryption and applies it to the
/// received body to recover the plaintext.
pub fn aes_ecb_decrypt_padded(key: &AesKey, msg: &[u8]) -> Vec<u8> {
    let padded = pad16(msg);
    let mut out = Vec::with_capacity(padded.len());
    for chunk in padded.chunks(AES_BLOCK_LEN) {
        // chunks of a padded buffer are always full blocks
        let block: [u8; 16] = chunk.try_into().unwrap_or([0u8; 16]);
        out.extend_from_slice(&aes_ecb_decrypt(key, &block));
    }
    out
}

/// Zero-pad a message to the next multiple of the AES block length.
/// A message already on a block boundary is returned unchanged.
pub fn pad16(msg: &[u8]) -> Vec<u8> {
    let mut padded = msg.to_vec();
    let rem = padded.len() % AES_BLOCK_LEN;
    if rem != 0 {
        padded.resize(padded.len() + AES_BLOCK_LEN - rem, 0);
    }
    padded
}

/// Derive an OTAA session key:
/// `AES-ECB-Enc(AppKey, pad16(tag, AppNonce, NetID, DevNonce))` with tag
/// 0x01 for the NwkSKey and 0x02 for the AppSKey. All nonce and NetID
/// bytes enter in their transmitted order.
pub fn derive_session_key(
    tag: u8,
    appkey: &AesKey,
    appnonce: AppNonce,
    netid: [u8; 3],
    devnonce: DevNonce,
) -> AesKey {
    let mut block = [0u8; 16];
    block[0] = tag;
    block[1..4].copy_from_slice(appnonce.as_bytes());
    block[4..7].copy_from_slice(&netid);
    block[7..9].copy_from_slice(devnonce.as_bytes());
    AesKey::from(aes_ecb_encrypt(appkey, &block))
}

fn prefix_block(first: u8, dir: Direction, devaddr: DevAddr, fcnt: u32, last: u8) -> [u8; 16] {
    let mut block = [0u8; 16];
    block[0] = first;
    // block[1..5] are 0
    block[5] = dir.byte();
    block[6..10].copy_from_slice(&devaddr.to_wire());
    block[10..14].copy_from_slice(&fcnt.to_le_bytes());
    // block[14] is 0
    block[15] = last;
    block
}
