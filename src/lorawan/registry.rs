//! # Device and Session Registry
//!
//! This module defines the persistent records the MAC layer operates on
//! (gateways, pre-activation devices, post-activation links, pending
//! confirmed downlinks, ignore rules and the received-frame log) together
//! with the [`Registry`] trait that abstracts their storage.
//!
//! The trait has two tiers:
//!
//! - **quick access**: single-key reads and writes without transactional
//!   guarantees, used on the hot uplink path once the frame is
//!   authenticated;
//! - **transactions**: serialized read-modify-write used wherever two
//!   concurrent frames must not both win (uplink counter commit, downlink
//!   counter increment, join activation).
//!
//! [`MemoryRegistry`] is the bundled reference backend; production
//! deployments implement the trait over their own store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::lorawan::crypto::AesKey;
use crate::lorawan::frame::{DevAddr, Eui};

/// Errors raised by registry backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RegistryError {
    /// A join tried to activate a DevAddr that another session holds.
    #[error("DevAddr {0} is already in use")]
    AddrInUse(DevAddr),

    /// No free DevAddr was found within the bounded allocation attempts.
    #[error("No free DevAddr found after {attempts} attempts")]
    AddrExhausted { attempts: u32 },

    /// A record disappeared between lookup and transactional re-read.
    #[error("Record vanished during transaction: {0}")]
    Vanished(String),

    /// Backend-specific failure (I/O, serialization, ...).
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// ADR parameter triple: TX power index, data-rate index, channel mask.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdrParams {
    pub power: u8,
    pub datr: u8,
    pub chans: u16,
}

impl AdrParams {
    /// In-use parameters a fresh session starts from.
    pub fn initial() -> Self {
        Self { power: 1, datr: 0, chans: 7 }
    }
}

/// Last device status reported through the DevStatusAns MAC command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DevStat {
    pub battery: u8,
    pub margin: i8,
}

/// A radio gateway, created externally and mutated only by status ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Gateway {
    pub mac: Eui,
    /// NetID the gateway serves; its low 7 bits seed every DevAddr
    /// allocated through this gateway.
    pub netid: [u8; 3],
    pub gpspos: Option<(f64, f64)>,
    pub gpsalt: Option<i32>,
}

/// Pre-activation device record, keyed by DevEUI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    pub deveui: Eui,
    pub app: String,
    pub appid: String,
    pub appeui: Eui,
    pub appkey: AesKey,
    pub can_join: bool,
    pub adr_flag_set: bool,
    pub adr_set: AdrParams,
    /// DevAddr of the most recent activation; reused on rejoin.
    pub link: Option<DevAddr>,
    pub last_join: Option<DateTime<Utc>>,
}

/// Post-activation session record, keyed by DevAddr.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Link {
    pub devaddr: DevAddr,
    pub app: String,
    pub appid: String,
    pub nwkskey: AesKey,
    pub appskey: AesKey,
    pub fcntup: u32,
    pub fcntdown: u32,
    /// ADR bit last seen in an uplink FCtrl.
    pub adr_flag_use: bool,
    pub adr_flag_set: bool,
    pub adr_use: AdrParams,
    pub adr_set: AdrParams,
    pub devstat: Option<DevStat>,
    pub last_rx: Option<DateTime<Utc>>,
}

/// Last confirmed downlink sent to a device, retained for retransmission
/// until the device acknowledges it or rejoins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingDownlink {
    pub devaddr: DevAddr,
    pub phy_payload: Vec<u8>,
}

/// Address-range ignore rule: traffic from any DevAddr with
/// `(addr & mask) == base` is dropped silently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IgnoredLink {
    pub devaddr: DevAddr,
    pub mask: DevAddr,
}

impl IgnoredLink {
    pub fn matches(&self, addr: DevAddr) -> bool {
        addr.value() & self.mask.value() == self.devaddr.value()
    }
}

/// Append-only log entry emitted for every authenticated uplink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RxFrame {
    /// Monotonic frame id, assigned by the registry on append.
    pub frid: u64,
    pub mac: Eui,
    pub rssi: f64,
    pub lsnr: f64,
    pub freq: f64,
    pub datr: String,
    pub codr: String,
    pub devaddr: DevAddr,
    pub fcnt: u32,
    pub devstat: Option<DevStat>,
}

/// Closure applied to a Link under its per-DevAddr write lock. Returning
/// `None` aborts the transaction without writing.
pub type LinkUpdate = Box<dyn FnOnce(Link) -> Option<Link> + Send>;

/// Closure applied to a Device under its write lock during join
/// activation; returns the updated device and the fresh session.
pub type JoinUpdate = Box<dyn FnOnce(Device) -> (Device, Link) + Send>;

/// Storage abstraction for all MAC state.
///
/// Implementations must guarantee at-most-one transaction at a time per
/// key; the bundled [`MemoryRegistry`] serializes through a single lock.
#[async_trait]
pub trait Registry: Send + Sync {
    // --- quick access -----------------------------------------------------

    async fn get_gateway(&self, mac: Eui) -> Result<Option<Gateway>, RegistryError>;
    async fn put_gateway(&self, gateway: Gateway) -> Result<(), RegistryError>;

    async fn get_device(&self, deveui: Eui) -> Result<Option<Device>, RegistryError>;
    async fn put_device(&self, device: Device) -> Result<(), RegistryError>;

    async fn get_link(&self, devaddr: DevAddr) -> Result<Option<Link>, RegistryError>;
    async fn put_link(&self, link: Link) -> Result<(), RegistryError>;
    async fn link_exists(&self, devaddr: DevAddr) -> Result<bool, RegistryError>;

    async fn get_pending(&self, devaddr: DevAddr) -> Result<Option<PendingDownlink>, RegistryError>;
    async fn put_pending(&self, pending: PendingDownlink) -> Result<(), RegistryError>;
    async fn delete_pending(&self, devaddr: DevAddr) -> Result<(), RegistryError>;

    async fn ignored_links(&self) -> Result<Vec<IgnoredLink>, RegistryError>;
    async fn put_ignored_link(&self, ignored: IgnoredLink) -> Result<(), RegistryError>;

    /// Append a frame to the received-frame log, assigning and returning
    /// its monotonic id.
    async fn append_rx_frame(&self, frame: RxFrame) -> Result<u64, RegistryError>;

    // --- transactions -----------------------------------------------------

    /// Atomically read-modify-write the Link under `devaddr`.
    ///
    /// The closure observes the freshest stored record; two concurrent
    /// updates to one DevAddr are serialized, which is what makes uplink
    /// counter commits and downlink counter increments safe. Returns the
    /// written record, or `None` when the closure aborted or no Link
    /// exists.
    async fn update_link(
        &self,
        devaddr: DevAddr,
        update: LinkUpdate,
    ) -> Result<Option<Link>, RegistryError>;

    /// Atomically activate a session: re-read the Device under its write
    /// lock, apply `update`, write the Device back and create/overwrite
    /// the returned Link.
    ///
    /// If the returned Link claims a DevAddr the device did not already
    /// own and a session exists there, the transaction fails with
    /// [`RegistryError::AddrInUse`] and nothing is written.
    async fn commit_join(
        &self,
        deveui: Eui,
        update: JoinUpdate,
    ) -> Result<(Device, Link), RegistryError>;
}

#[derive(Default)]
struct Stores {
    gateways: HashMap<Eui, Gateway>,
    devices: HashMap<Eui, Device>,
    links: HashMap<DevAddr, Link>,
    pending: HashMap<DevAddr, PendingDownlink>,
    ignored: Vec<IgnoredLink>,
    frames: Vec<RxFrame>,
    next_frid: u64,
}

/// In-memory reference backend.
///
/// All operations go through one async mutex, which trivially satisfies
/// the per-key serialization contract. Suitable for tests and small
/// single-process deployments.
#[derive(Default)]
pub struct MemoryRegistry {
    stores: Mutex<Stores>,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the received-frame log, oldest first.
    pub async fn rx_frames(&self) -> Vec<RxFrame> {
        self.stores.lock().await.frames.clone()
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn get_gateway(&self, mac: Eui) -> Result<Option<Gateway>, RegistryError> {
        Ok(self.stores.lock().await.gateways.get(&mac).cloned())
    }

    async fn put_gateway(&self, gateway: Gateway) -> Result<(), RegistryError> {
        self.stores.lock().await.gateways.insert(gateway.mac, gateway);
        Ok(())
    }

    async fn get_device(&self, deveui: Eui) -> Result<Option<Device>, RegistryError> {
        Ok(self.stores.lock().await.devices.get(&deveui).cloned())
    }

    async fn put_device(&self, device: Device) -> Result<(), RegistryError> {
        self.stores.lock().await.devices.insert(device.deveui, device);
        Ok(())
    }

    async fn get_link(&self, devaddr: DevAddr) -> Result<Option<Link>, RegistryError> {
        Ok(self.stores.lock().await.links.get(&devaddr).cloned())
    }

    async fn put_link(&self, link: Link) -> Result<(), RegistryError> {
        self.stores.lock().await.links.insert(link.devaddr, link);
        Ok(())
    }

    async fn link_exists(&self, devaddr: DevAddr) -> Result<bool, RegistryError> {
        Ok(self.stores.lock().await.links.contains_key(&devaddr))
    }

    async fn get_pending(&self, devaddr: DevAddr) -> Result<Option<PendingDownlink>, RegistryError> {
        Ok(self.stores.lock().await.pending.get(&devaddr).cloned())
    }

    async fn put_pending(&self, pending: PendingDownlink) -> Result<(), RegistryError> {
        self.stores.lock().await.pending.insert(pending.devaddr, pending);
        Ok(())
    }

    async fn delete_pending(&self, devaddr: DevAddr) -> Result<(), RegistryError> {
        self.stores.lock().await.pending.remove(&devaddr);
        Ok(())
    }

    async fn ignored_links(&self) -> Result<Vec<IgnoredLink>, RegistryError> {
        Ok(self.stores.lock().await.ignored.clone())
    }

    async fn put_ignored_link(&self, ignored: IgnoredLink) -> Result<(), RegistryError> {
        self.stores.lock().await.ignored.push(ignored);
        Ok(())
    }

    async fn append_rx_frame(&self, mut frame: RxFrame) -> Result<u64, RegistryError> {
        let mut stores = self.stores.lock().await;
        stores.next_frid += 1;
        frame.frid = stores.next_frid;
        let frid = frame.frid;
        stores.frames.push(frame);
        Ok(frid)
    }

    async fn update_link(
        &self,
        devaddr: DevAddr,
        update: LinkUpdate,
    ) -> Result<Option<Link>, RegistryError> {
        let mut stores = self.stores.lock().await;
        let Some(current) = stores.links.get(&devaddr).cloned() else {
            return Ok(None);
        };
        match update(current) {
            Some(updated) => {
                stores.links.insert(devaddr, updated.clone());
                Ok(Some(updated))
            }
            None => Ok(None),
        }
    }

    async fn commit_join(
        &self,
        deveui: Eui,
        update: JoinUpdate,
    ) -> Result<(Device, Link), RegistryError> {
        let mut stores = self.stores.lock().await;
        let current = stores
            .devices
            .get(&deveui)
            .cloned()
            .ok_or_else(|| RegistryError::Vanished(format!("device {deveui}")))?;
        let previous_addr = current.link;

        let (device, link) = update(current);
        if previous_addr != Some(link.devaddr) && stores.links.contains_key(&link.devaddr) {
            return Err(RegistryError::AddrInUse(link.devaddr));
        }

        stores.devices.insert(deveui, device.clone());
        stores.links.insert(link.devaddr, link.clone());
        Ok((device, link))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_link(devaddr: u32) -> Link {
        Link {
            devaddr: DevAddr::new(devaddr),
            app: "semtech-mote".into(),
            appid: "1".into(),
            nwkskey: AesKey::from([2; 16]),
            appskey: AesKey::from([1; 16]),
            fcntup: 0,
            fcntdown: 0,
            adr_flag_use: false,
            adr_flag_set: false,
            adr_use: AdrParams::initial(),
            adr_set: AdrParams::initial(),
            devstat: None,
            last_rx: None,
        }
    }

    #[test]
    fn test_ignored_link_matching() {
        let rule = IgnoredLink {
            devaddr: DevAddr::new(0x0200_0000),
            mask: DevAddr::new(0xFF00_0000),
        };
        assert!(rule.matches(DevAddr::new(0x02AA_BBCC)));
        assert!(!rule.matches(DevAddr::new(0x0300_0000)));
    }

    #[tokio::test]
    async fn test_update_link_aborts_without_writing() {
        let registry = MemoryRegistry::new();
        registry.put_link(sample_link(0x0102_0304)).await.unwrap();

        let result = registry
            .update_link(DevAddr::new(0x0102_0304), Box::new(|_| None))
            .await
            .unwrap();
        assert!(result.is_none());
        let stored = registry.get_link(DevAddr::new(0x0102_0304)).await.unwrap().unwrap();
        assert_eq!(stored.fcntup, 0);
    }

    #[tokio::test]
    async fn test_update_link_missing_key() {
        let registry = MemoryRegistry::new();
        let result = registry
            .update_link(DevAddr::new(0xDEAD_BEEF), Box::new(Some))
            .await
            .unwrap();
        assert!(result.is_none());
    }

    fn sample_device(deveui: Eui) -> Device {
        Device {
            deveui,
            app: "semtech-mote".into(),
            appid: "1".into(),
            appeui: Eui::new([1, 2, 3, 4, 1, 2, 3, 4]),
            appkey: AesKey::from([1; 16]),
            can_join: true,
            adr_flag_set: false,
            adr_set: AdrParams::initial(),
            link: None,
            last_join: None,
        }
    }

    #[tokio::test]
    async fn test_commit_join_rejects_devaddr_held_by_another_session() {
        let registry = MemoryRegistry::new();
        let taken = DevAddr::new(0x0102_0304);
        let mut existing = sample_link(0x0102_0304);
        existing.fcntup = 17;
        registry.put_link(existing).await.unwrap();

        // a different device tries to activate onto the occupied address
        let deveui = Eui::new([9; 8]);
        registry.put_device(sample_device(deveui)).await.unwrap();

        let err = registry
            .commit_join(
                deveui,
                Box::new(move |mut fresh: Device| {
                    fresh.link = Some(taken);
                    (fresh, sample_link(0x0102_0304))
                }),
            )
            .await
            .unwrap_err();
        assert_eq!(err, RegistryError::AddrInUse(taken));

        // nothing was written: the device still has no session and the
        // occupying link keeps its counters
        let device = registry.get_device(deveui).await.unwrap().unwrap();
        assert_eq!(device.link, None);
        let link = registry.get_link(taken).await.unwrap().unwrap();
        assert_eq!(link.fcntup, 17);
    }

    #[tokio::test]
    async fn test_commit_join_overwrites_own_devaddr_on_rejoin() {
        let registry = MemoryRegistry::new();
        let devaddr = DevAddr::new(0x0102_0304);
        let mut existing = sample_link(0x0102_0304);
        existing.fcntup = 17;
        registry.put_link(existing).await.unwrap();

        let deveui = Eui::new([9; 8]);
        let mut device = sample_device(deveui);
        device.link = Some(devaddr);
        registry.put_device(device).await.unwrap();

        let (device, link) = registry
            .commit_join(
                deveui,
                Box::new(|fresh: Device| (fresh, sample_link(0x0102_0304))),
            )
            .await
            .unwrap();
        assert_eq!(device.link, Some(devaddr));
        assert_eq!(link.fcntup, 0);
        assert_eq!(registry.get_link(devaddr).await.unwrap().unwrap().fcntup, 0);
    }

    #[tokio::test]
    async fn test_rx_frame_ids_are_monotonic() {
        let registry = MemoryRegistry::new();
        let frame = RxFrame {
            frid: 0,
            mac: Eui::new([1; 8]),
            rssi: -42.0,
            lsnr: 9.5,
            freq: 868.1,
            datr: "SF7BW125".into(),
            codr: "4/5".into(),
            devaddr: DevAddr::new(1),
            fcnt: 1,
            devstat: None,
        };
        let first = registry.append_rx_frame(frame.clone()).await.unwrap();
        let second = registry.append_rx_frame(frame).await.unwrap();
        assert_eq!(second, first + 1);
    }
}
