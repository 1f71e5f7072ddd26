//! # lorawan-ns - A Rust Crate for LoRaWAN Network-Server MAC Processing
//!
//! The lorawan-ns crate implements the network-server side of the LoRaWAN
//! 1.0.1 Class-A MAC layer: it terminates the air-interface framing between
//! end devices and application handlers, mediated by one or more radio
//! gateways.
//!
//! ## Features
//!
//! - Parse and authenticate PHY payloads forwarded by gateways (AES-CMAC
//!   MIC over the B0-prefixed message)
//! - Reconstruct 32-bit frame counters from their 16-bit wire value with a
//!   bounded-gap replay defense
//! - Decrypt and deliver application payloads to pluggable handlers
//! - Run the OTAA join handshake: nonce generation, session-key
//!   derivation, DevAddr allocation, join-accept construction
//! - Plan correctly-timed RX2 downlinks, including confirmed-downlink
//!   retention and retransmission
//! - Store all session state behind an injectable [`Registry`], with a
//!   bundled in-memory backend
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lorawan_ns::{
//!     AppError, AppHandler, DevAddr, Eui, MacConfig, MacEngine, MemoryRegistry,
//!     PassthroughCommands, RfParams, RxData, RxDecision, RxQuality,
//! };
//!
//! struct Printer;
//!
//! #[async_trait::async_trait]
//! impl AppHandler for Printer {
//!     async fn handle_join(&self, devaddr: DevAddr, _app: &str, _appid: &str)
//!         -> Result<(), AppError> {
//!         println!("joined: {devaddr}");
//!         Ok(())
//!     }
//!
//!     async fn handle_rx(&self, devaddr: DevAddr, _app: &str, _appid: &str, rx: RxData)
//!         -> Result<RxDecision, AppError> {
//!         println!("rx from {devaddr}: {:?}", rx.data);
//!         Ok(RxDecision::Handled)
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = MacEngine::new(
//!         MacConfig::default(),
//!         MemoryRegistry::new(),
//!         Printer,
//!         PassthroughCommands,
//!     )?;
//!
//!     // per received packet:
//!     let rxq = RxQuality { tmst: 1_000_000, rssi: -35.0, lsnr: 9.2 };
//!     let rf = RfParams { freq: 868.1, datr: "SF7BW125".into(), codr: "4/5".into() };
//!     if let Some(tx) = engine
//!         .process_frame(Eui::from_hex("b827ebfffe000001")?, &rxq, &rf, &[0u8; 23])
//!         .await?
//!     {
//!         println!("transmit at {}: {} bytes", tx.time, tx.phy_payload.len());
//!     }
//!     Ok(())
//! }
//! ```

pub mod constants;
pub mod error;
pub mod logging;
pub mod lorawan;
pub mod util;

pub use crate::error::LoraWanError;
pub use crate::logging::init_logger;

// Core MAC types
pub use lorawan::{
    AdrParams, AesKey, AppError, AppHandler, AppNonce, CryptoError, DevAddr, DevNonce, DevStat,
    Device, Direction, Eui, FCtrl, Gateway, GatewayStatus, IgnoredLink, Link, MType,
    MacCommandHandler, MacConfig, MacEngine, MemoryRegistry, PassthroughCommands, PendingDownlink,
    Registry, RegistryError, RfParams, Rx2Config, RxData, RxDecision, RxFrame, RxQuality, TxData,
    TxFrame,
};
