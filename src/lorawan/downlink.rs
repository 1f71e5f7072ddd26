//! # Downlink Planning
//!
//! Decides, for every committed uplink, whether a Class-A downlink must be
//! transmitted and builds it. A reply is required when the uplink was
//! confirmed, when the device requested an ADR acknowledgement, when MAC
//! commands are queued, or when the application asks to send.
//!
//! Confirmed downlinks are retained until the device acknowledges them; an
//! uplink arriving without the ACK bit while such a frame is stored marks
//! it lost, and the application may elect to retransmit it verbatim.
//!
//! Data downlinks are always scheduled into the RX2 window; RX1 selection
//! is a configuration policy this core does not implement.

use log::{info, warn};

use crate::constants::FOPTS_MAX_LEN;
use crate::error::LoraWanError;
use crate::lorawan::app::{AppHandler, RxData, RxDecision, TxData};
use crate::lorawan::commands::MacCommandHandler;
use crate::lorawan::crypto::{self, Direction};
use crate::lorawan::frame::{self, DataFrame, FCtrl, MType};
use crate::lorawan::mac::{MacEngine, RfParams, RxQuality, TxFrame};
use crate::lorawan::registry::{Link, PendingDownlink, Registry};

impl<R, A, C> MacEngine<R, A, C>
where
    R: Registry,
    A: AppHandler,
    C: MacCommandHandler,
{
    pub(crate) async fn plan_downlink(
        &self,
        rxq: &RxQuality,
        uplink: &DataFrame,
        link: Link,
        data: Vec<u8>,
        fopts_out: Vec<u8>,
    ) -> Result<Option<TxFrame>, LoraWanError> {
        let confirmed_up = uplink.mtype == MType::ConfirmedDataUp;
        let devaddr = link.devaddr;

        // Lost-downlink detection: an ACK consumes the stored frame, its
        // absence while one is stored means the device never got it.
        let mut pending_phy = None;
        if uplink.fctrl.ack {
            self.registry.delete_pending(devaddr).await?;
        } else if let Some(pending) = self.registry.get_pending(devaddr).await? {
            pending_phy = Some(pending.phy_payload);
        }
        let last_lost = pending_phy.is_some();

        let shall_reply = confirmed_up || uplink.fctrl.adr_ack_req || !fopts_out.is_empty();

        let decision = self
            .app
            .handle_rx(
                devaddr,
                &link.app,
                &link.appid,
                RxData {
                    port: uplink.fport,
                    data,
                    last_lost,
                    shall_reply,
                },
            )
            .await?;

        match decision {
            RxDecision::Send(tx) => self
                .send_downlink(rxq, &link, confirmed_up, fopts_out, tx)
                .await
                .map(Some),
            RxDecision::Retransmit => match pending_phy {
                Some(phy_payload) => {
                    info!("Retransmitting stored downlink to {devaddr}");
                    Ok(Some(self.rx2_frame(rxq, phy_payload)))
                }
                None => {
                    warn!("Retransmit requested for {devaddr} but no downlink is stored");
                    Ok(None)
                }
            },
            RxDecision::Handled if shall_reply => self
                .send_downlink(
                    rxq,
                    &link,
                    confirmed_up,
                    fopts_out,
                    TxData {
                        confirmed: false,
                        port: None,
                        data: Vec::new(),
                        pending: false,
                    },
                )
                .await
                .map(Some),
            RxDecision::Handled => Ok(None),
        }
    }

    /// Build one data downlink and schedule it into RX2.
    ///
    /// The downlink counter is incremented inside a link transaction so
    /// that two concurrent downlinks to one device always carry distinct
    /// counter values; the new value is the one transmitted.
    async fn send_downlink(
        &self,
        rxq: &RxQuality,
        link: &Link,
        ack: bool,
        fopts: Vec<u8>,
        tx: TxData,
    ) -> Result<TxFrame, LoraWanError> {
        let devaddr = link.devaddr;

        let link = self
            .registry
            .update_link(
                devaddr,
                Box::new(|mut fresh: Link| {
                    fresh.fcntdown = fresh.fcntdown.wrapping_add(1);
                    Some(fresh)
                }),
            )
            .await?
            .ok_or(LoraWanError::UnknownDevAddr(devaddr))?;
        let fcntdown = link.fcntdown;

        let fopts = if fopts.len() > FOPTS_MAX_LEN {
            warn!(
                "Truncating {}-byte FOpts for {devaddr} to {FOPTS_MAX_LEN}",
                fopts.len()
            );
            fopts[..FOPTS_MAX_LEN].to_vec()
        } else {
            fopts
        };

        let mtype = if tx.confirmed {
            MType::ConfirmedDataDown
        } else {
            MType::UnconfirmedDataDown
        };
        let fctrl = FCtrl {
            adr: link.adr_flag_set,
            adr_ack_req: false,
            ack,
            fpending: tx.pending,
            fopts_len: fopts.len() as u8,
        };

        let (fport, frm_payload) = match tx.port {
            Some(port) => {
                let key = if port == 0 { &link.nwkskey } else { &link.appskey };
                let ciphered =
                    crypto::payload_cipher(key, Direction::Downlink, devaddr, fcntdown, &tx.data);
                (Some(port), ciphered)
            }
            None => (None, Vec::new()),
        };

        let msg = frame::encode_data_frame(
            mtype,
            devaddr,
            fctrl,
            (fcntdown & 0xFFFF) as u16,
            &fopts,
            fport,
            &frm_payload,
        );
        let mic = crypto::data_mic(&link.nwkskey, Direction::Downlink, devaddr, fcntdown, &msg);

        let mut phy_payload = msg;
        phy_payload.extend_from_slice(&mic);

        if tx.confirmed {
            self.registry
                .put_pending(PendingDownlink {
                    devaddr,
                    phy_payload: phy_payload.clone(),
                })
                .await?;
        }

        info!(
            "Downlink to {devaddr} fcnt {fcntdown} port {:?} ({})",
            tx.port, mtype
        );

        Ok(self.rx2_frame(rxq, phy_payload))
    }

    /// Wrap a PHY payload into a transmission at the RX2 deadline.
    fn rx2_frame(&self, rxq: &RxQuality, phy_payload: Vec<u8>) -> TxFrame {
        TxFrame {
            time: rxq.tmst.wrapping_add(self.config.rx_delay2),
            rf: RfParams {
                freq: self.config.rx2_rf.freq,
                datr: self.rx2_datr.to_string(),
                codr: self.config.rx2_rf.codr.clone(),
            },
            phy_payload,
        }
    }
}
