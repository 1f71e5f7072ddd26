//! # Over-The-Air Activation
//!
//! Handles join-requests: authenticates the device under its AppKey,
//! derives a fresh session-key pair, allocates (or reuses) a DevAddr and
//! answers with a join-accept in the first join window.
//!
//! The join-accept body is produced with AES-ECB *decryption* on the
//! server. This is deliberate: end devices only carry the AES encryption
//! primitive, so they recover the plaintext by encrypting the received
//! body.

use log::{info, warn};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::constants::{DEVADDR_ALLOC_ATTEMPTS, JOIN_ACCEPT_RX_DELAY};
use crate::error::LoraWanError;
use crate::lorawan::app::AppHandler;
use crate::lorawan::commands::MacCommandHandler;
use crate::lorawan::crypto::{self, AesKey};
use crate::lorawan::frame::{self, AppNonce, DevAddr, MType};
use crate::lorawan::mac::{MacEngine, RfParams, RxQuality, TxFrame};
use crate::lorawan::registry::{AdrParams, Device, Gateway, Link, Registry, RegistryError};

impl<R, A, C> MacEngine<R, A, C>
where
    R: Registry,
    A: AppHandler,
    C: MacCommandHandler,
{
    pub(crate) async fn process_join(
        &self,
        gateway: &Gateway,
        rxq: &RxQuality,
        rf: &RfParams,
        msg: &[u8],
        mic: [u8; 4],
    ) -> Result<Option<TxFrame>, LoraWanError> {
        let request = frame::parse_join_request(msg)?;

        let device = self
            .registry
            .get_device(request.deveui)
            .await?
            .ok_or(LoraWanError::UnknownDevEui(request.deveui))?;

        if !device.can_join {
            info!("Join attempt from disabled device {}", request.deveui);
            return Ok(None);
        }

        if crypto::join_mic(&device.appkey, msg) != mic {
            warn!("Bad MIC on join-request from {}", request.deveui);
            return Err(LoraWanError::BadMic);
        }

        let mut nonce = [0u8; 3];
        OsRng.fill_bytes(&mut nonce);
        let appnonce = AppNonce::new(nonce);

        let netid = gateway.netid;
        let nwkskey =
            crypto::derive_session_key(0x01, &device.appkey, appnonce, netid, request.devnonce);
        let appskey =
            crypto::derive_session_key(0x02, &device.appkey, appnonce, netid, request.devnonce);

        // Allocate a candidate even when the device held an address before:
        // the transactional re-read decides which one wins.
        let candidate = self.allocate_devaddr(netid).await?;

        let (device, link) = self
            .registry
            .commit_join(
                request.deveui,
                Box::new(move |mut fresh: Device| {
                    let devaddr = fresh.link.unwrap_or(candidate);
                    fresh.link = Some(devaddr);
                    fresh.last_join = Some(chrono::Utc::now());
                    let link = Link {
                        devaddr,
                        app: fresh.app.clone(),
                        appid: fresh.appid.clone(),
                        nwkskey,
                        appskey,
                        fcntup: 0,
                        fcntdown: 0,
                        adr_flag_use: false,
                        adr_flag_set: fresh.adr_flag_set,
                        adr_use: AdrParams::initial(),
                        adr_set: fresh.adr_set,
                        devstat: None,
                        last_rx: None,
                    };
                    (fresh, link)
                }),
            )
            .await?;

        // The session is fresh; a confirmed downlink from the previous one
        // must not be retransmitted into it.
        self.registry.delete_pending(link.devaddr).await?;

        self.app
            .handle_join(link.devaddr, &device.app, &device.appid)
            .await?;

        info!(
            "Device {} joined as {} (app {}/{})",
            device.deveui, link.devaddr, device.app, device.appid
        );

        Ok(Some(self.build_join_accept(
            &device.appkey,
            appnonce,
            netid,
            link.devaddr,
            rxq,
            rf,
        )))
    }

    /// Draw random DevAddr candidates under the gateway's NetID until one
    /// is unused, with a bounded number of attempts.
    ///
    /// Layout: NwkID (low 7 bits of the NetID) in the top 7 bits, a zero
    /// bit, then 24 random bits. The final uniqueness word is spoken by
    /// `commit_join`, which re-checks under the write lock.
    async fn allocate_devaddr(&self, netid: [u8; 3]) -> Result<DevAddr, LoraWanError> {
        let nwkid = u32::from(netid[2] & 0x7F);
        for _ in 0..DEVADDR_ALLOC_ATTEMPTS {
            let random = OsRng.next_u32() & 0x00FF_FFFF;
            let candidate = DevAddr::new((nwkid << 25) | random);
            if !self.registry.link_exists(candidate).await? {
                return Ok(candidate);
            }
        }
        Err(RegistryError::AddrExhausted {
            attempts: DEVADDR_ALLOC_ATTEMPTS,
        }
        .into())
    }

    fn build_join_accept(
        &self,
        appkey: &AesKey,
        appnonce: AppNonce,
        netid: [u8; 3],
        devaddr: DevAddr,
        rxq: &RxQuality,
        rf: &RfParams,
    ) -> TxFrame {
        let macpayload = frame::encode_join_accept(
            appnonce,
            netid,
            devaddr,
            0, // RX1DRoffset
            self.config.rx2_rf.datr,
            JOIN_ACCEPT_RX_DELAY,
        );

        let mhdr = frame::mhdr_byte(MType::JoinAccept);
        let mut msg = Vec::with_capacity(1 + macpayload.len());
        msg.push(mhdr);
        msg.extend_from_slice(&macpayload);
        let mic = crypto::join_mic(appkey, &msg);

        let mut body = macpayload;
        body.extend_from_slice(&mic);

        let mut phy_payload = vec![mhdr];
        phy_payload.extend_from_slice(&crypto::aes_ecb_decrypt_padded(appkey, &body));

        // The accept goes out in the first join window, on the channel the
        // request came in on.
        TxFrame {
            time: rxq.tmst.wrapping_add(self.config.join_delay1),
            rf: rf.clone(),
            phy_payload,
        }
    }
}
