//! # MAC Frame Processing
//!
//! Entry point of the MAC layer. [`MacEngine::process_frame`] terminates
//! one uplink PHY payload: it authenticates the frame, reconciles the
//! 32-bit frame counter with the 16-bit wire value, commits the session
//! update, decrypts the application payload and asks the downlink planner
//! for a response. [`MacEngine::process_status`] ingests gateway status
//! reports.
//!
//! Processing is stateless per call; any number of frames may be handled
//! concurrently as long as the registry honors its transactional contract.
//! Authentication strictly precedes mutation: a frame that fails the MIC
//! or the counter-gap check leaves the registry untouched.

use chrono::Utc;
use log::{debug, info, warn};

use crate::constants::{JOIN_ACCEPT_DELAY1_US, MAX_FCNT_GAP, RX2_DEFAULT_CODR, RX2_DEFAULT_DATR, RX2_DEFAULT_FREQ_MHZ, RX_DELAY2_US};
use crate::error::LoraWanError;
use crate::lorawan::app::AppHandler;
use crate::lorawan::commands::MacCommandHandler;
use crate::lorawan::crypto::{self, Direction};
use crate::lorawan::frame::{self, Eui, MType};
use crate::lorawan::region;
use crate::lorawan::registry::{Gateway, Link, Registry, RxFrame};
use crate::util::hex::format_hex_compact;

/// Reception quality as reported by the forwarding gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct RxQuality {
    /// Concentrator timestamp of the end of reception, in microseconds.
    /// The counter wraps at 2^32.
    pub tmst: u32,
    pub rssi: f64,
    pub lsnr: f64,
}

/// Radio parameters of a received or scheduled transmission.
#[derive(Debug, Clone, PartialEq)]
pub struct RfParams {
    /// Center frequency in MHz.
    pub freq: f64,
    /// Modulation string, e.g. "SF12BW125".
    pub datr: String,
    /// Coding rate, e.g. "4/5".
    pub codr: String,
}

/// A downlink handed back to the gateway transport.
///
/// `time` is a deadline in the concentrator's wrapping microsecond domain;
/// a transport that cannot meet it should drop the frame silently.
#[derive(Debug, Clone, PartialEq)]
pub struct TxFrame {
    pub time: u32,
    pub rf: RfParams,
    pub phy_payload: Vec<u8>,
}

/// Gateway status report (field names follow the packet-forwarder stat
/// object).
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GatewayStatus {
    pub lati: Option<f64>,
    pub long: Option<f64>,
    pub alti: Option<i32>,
}

/// RX2 window radio settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Rx2Config {
    pub freq: f64,
    /// Data-rate index into the regional table (0..=6).
    pub datr: u8,
    pub codr: String,
}

impl Default for Rx2Config {
    fn default() -> Self {
        Self {
            freq: RX2_DEFAULT_FREQ_MHZ,
            datr: RX2_DEFAULT_DATR,
            codr: RX2_DEFAULT_CODR.to_string(),
        }
    }
}

/// MAC timing and RX2 configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct MacConfig {
    pub rx2_rf: Rx2Config,
    /// Join-request end to join-accept transmission, microseconds.
    pub join_delay1: u32,
    /// Uplink end to RX2 transmission, microseconds.
    pub rx_delay2: u32,
}

impl Default for MacConfig {
    fn default() -> Self {
        Self {
            rx2_rf: Rx2Config::default(),
            join_delay1: JOIN_ACCEPT_DELAY1_US,
            rx_delay2: RX_DELAY2_US,
        }
    }
}

/// The MAC protocol engine.
///
/// Owns no background tasks; every call runs to completion against the
/// injected registry, application handler and MAC-command hook.
pub struct MacEngine<R, A, C> {
    pub(crate) config: MacConfig,
    /// Modulation string for the configured RX2 data rate, resolved once.
    pub(crate) rx2_datr: &'static str,
    pub(crate) registry: R,
    pub(crate) app: A,
    pub(crate) commands: C,
}

impl<R, A, C> MacEngine<R, A, C>
where
    R: Registry,
    A: AppHandler,
    C: MacCommandHandler,
{
    /// Create an engine, validating the RX2 data rate against the regional
    /// table.
    pub fn new(config: MacConfig, registry: R, app: A, commands: C) -> Result<Self, LoraWanError> {
        let rx2_datr = region::dr_to_datr(config.rx2_rf.datr).ok_or_else(|| {
            LoraWanError::Config(format!(
                "RX2 data rate {} outside the regional table",
                config.rx2_rf.datr
            ))
        })?;
        Ok(Self {
            config,
            rx2_datr,
            registry,
            app,
            commands,
        })
    }

    /// Access the injected registry.
    pub fn registry(&self) -> &R {
        &self.registry
    }

    /// Access the injected application handler.
    pub fn app(&self) -> &A {
        &self.app
    }

    /// Access the injected MAC-command handler.
    pub fn commands(&self) -> &C {
        &self.commands
    }

    /// Process one PHY payload forwarded by a gateway.
    ///
    /// Returns `Ok(Some(frame))` when a downlink must be transmitted,
    /// `Ok(None)` when the frame was consumed without a response (including
    /// silently ignored traffic), and an error otherwise. Errors never
    /// leave partial state behind.
    pub async fn process_frame(
        &self,
        gwmac: Eui,
        rxq: &RxQuality,
        rf: &RfParams,
        phy_payload: &[u8],
    ) -> Result<Option<TxFrame>, LoraWanError> {
        debug!("RX from gateway {gwmac}: {}", format_hex_compact(phy_payload));

        let (msg, mic) = frame::split_mic(phy_payload)?;
        let mtype = MType::try_from(msg[0])?;

        let gateway = self
            .registry
            .get_gateway(gwmac)
            .await?
            .ok_or(LoraWanError::UnknownMac(gwmac))?;

        match mtype {
            MType::JoinRequest => self.process_join(&gateway, rxq, rf, msg, mic).await,
            t if t.is_data_uplink() => self.process_uplink(&gateway, rxq, rf, msg, mic).await,
            t => Err(LoraWanError::FrameParse(format!(
                "{t} is not an uplink frame"
            ))),
        }
    }

    /// Ingest a gateway status report, updating its GPS fields.
    pub async fn process_status(
        &self,
        gwmac: Eui,
        status: &GatewayStatus,
    ) -> Result<(), LoraWanError> {
        let mut gateway = self
            .registry
            .get_gateway(gwmac)
            .await?
            .ok_or(LoraWanError::UnknownMac(gwmac))?;

        if let (Some(lat), Some(lon)) = (status.lati, status.long) {
            gateway.gpspos = Some((lat, lon));
        }
        if let Some(alt) = status.alti {
            gateway.gpsalt = Some(alt);
        }
        self.registry.put_gateway(gateway).await?;
        Ok(())
    }

    async fn process_uplink(
        &self,
        gateway: &Gateway,
        rxq: &RxQuality,
        rf: &RfParams,
        msg: &[u8],
        mic: [u8; 4],
    ) -> Result<Option<TxFrame>, LoraWanError> {
        let uplink = frame::parse_data_frame(msg)?;
        let devaddr = uplink.devaddr;

        for rule in self.registry.ignored_links().await? {
            if rule.matches(devaddr) {
                debug!("Ignoring uplink from {devaddr} (rule {}/{})", rule.devaddr, rule.mask);
                return Ok(None);
            }
        }

        let link = self
            .registry
            .get_link(devaddr)
            .await?
            .ok_or(LoraWanError::UnknownDevAddr(devaddr))?;

        let (gap, fcnt) = reconstruct_fcnt(link.fcntup, uplink.fcnt)?;

        let expected = crypto::data_mic(&link.nwkskey, Direction::Uplink, devaddr, fcnt, msg);
        if expected != mic {
            warn!("Bad MIC on uplink from {devaddr}");
            return Err(LoraWanError::BadMic);
        }

        // MAC commands and FCtrl bookkeeping run on a staging copy;
        // nothing is stored until the transactional re-check commits it.
        let (mut staged, fopts_out) = self.commands.handle(link, &uplink.fopts);
        staged.adr_flag_use = uplink.fctrl.adr;
        staged.fcntup = fcnt;
        staged.last_rx = Some(Utc::now());

        let wire_fcnt = uplink.fcnt;
        let committed = self
            .registry
            .update_link(
                devaddr,
                Box::new(move |fresh: Link| {
                    // A concurrent frame may have advanced the counter since
                    // the lookup; commit only if this frame still
                    // reconstructs to the value its MIC was verified with.
                    match reconstruct_fcnt(fresh.fcntup, wire_fcnt) {
                        Ok((_, n)) if n == fcnt => Some(staged),
                        _ => None,
                    }
                }),
            )
            .await?
            .ok_or(LoraWanError::FcntGapTooLarge { gap })?;

        let key = if uplink.fport == Some(0) {
            // FPort 0 carries MAC commands, ciphered with the network key
            &committed.nwkskey
        } else {
            &committed.appskey
        };
        let data = crypto::payload_cipher(key, Direction::Uplink, devaddr, fcnt, &uplink.frm_payload);

        self.registry
            .append_rx_frame(RxFrame {
                frid: 0,
                mac: gateway.mac,
                rssi: rxq.rssi,
                lsnr: rxq.lsnr,
                freq: rf.freq,
                datr: rf.datr.clone(),
                codr: rf.codr.clone(),
                devaddr,
                fcnt,
                devstat: committed.devstat,
            })
            .await?;

        info!(
            "Uplink from {devaddr} fcnt {fcnt} port {:?} ({} data bytes)",
            uplink.fport,
            data.len()
        );

        self.plan_downlink(rxq, &uplink, committed, data, fopts_out).await
    }
}

/// Reconstruct the 32-bit frame counter from the 16-bit wire value.
///
/// Returns `(gap, fcnt32)`; gaps of [`MAX_FCNT_GAP`] or more are rejected
/// as replay or unrecoverable loss. A gap of zero is legal and covers
/// confirmed-uplink retransmissions.
pub(crate) fn reconstruct_fcnt(fcntup: u32, wire: u16) -> Result<(u32, u32), LoraWanError> {
    let last16 = fcntup & 0xFFFF;
    let wire = u32::from(wire);
    let gap = if wire >= last16 {
        wire - last16
    } else {
        0x1_0000 - last16 + wire
    };
    if gap >= MAX_FCNT_GAP {
        return Err(LoraWanError::FcntGapTooLarge { gap });
    }
    Ok((gap, fcntup.wrapping_add(gap)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fcnt_simple_advance() {
        assert_eq!(reconstruct_fcnt(0, 1).unwrap(), (1, 1));
        assert_eq!(reconstruct_fcnt(41, 42).unwrap(), (1, 42));
    }

    #[test]
    fn test_fcnt_gap_zero_is_retransmission() {
        assert_eq!(reconstruct_fcnt(42, 42).unwrap(), (0, 42));
    }

    #[test]
    fn test_fcnt_wraps_past_16_bits() {
        // stored low half 0xFFFF, wire rolls over to 0
        assert_eq!(reconstruct_fcnt(0xFFFF, 0).unwrap(), (1, 0x1_0000));
        assert_eq!(reconstruct_fcnt(0x0001_FFFE, 3).unwrap(), (5, 0x0002_0003));
    }

    #[test]
    fn test_fcnt_gap_boundary() {
        assert_eq!(
            reconstruct_fcnt(0, (MAX_FCNT_GAP - 1) as u16).unwrap(),
            (MAX_FCNT_GAP - 1, MAX_FCNT_GAP - 1)
        );
        assert!(matches!(
            reconstruct_fcnt(0, MAX_FCNT_GAP as u16),
            Err(LoraWanError::FcntGapTooLarge { gap }) if gap == MAX_FCNT_GAP
        ));
    }

    #[test]
    fn test_fcnt_large_backwards_jump_rejected() {
        // stored 20000, wire 1: the device would have to be 45537 frames
        // ahead for this to be legitimate
        let err = reconstruct_fcnt(20_000, 1).unwrap_err();
        assert!(matches!(
            err,
            LoraWanError::FcntGapTooLarge { gap } if gap == 0x1_0000 - 20_000 + 1
        ));
    }
}
