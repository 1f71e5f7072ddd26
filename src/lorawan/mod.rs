//! # LoRaWAN Class-A MAC Module
//!
//! This module implements the network-server side of the LoRaWAN 1.0.1
//! Class-A MAC: frame codec, crypto, session registry, uplink processing,
//! OTAA join handling and downlink planning.

pub mod app;
pub mod commands;
pub mod crypto;
pub mod downlink;
pub mod frame;
pub mod join;
pub mod mac;
pub mod region;
pub mod registry;

// Re-export the necessary types and functions from the submodules
pub use app::{AppError, AppHandler, RxData, RxDecision, TxData};
pub use commands::{MacCommandHandler, PassthroughCommands};
pub use crypto::{AesKey, CryptoError, Direction};
pub use frame::{AppNonce, DevAddr, DevNonce, Eui, FCtrl, MType};
pub use mac::{GatewayStatus, MacConfig, MacEngine, RfParams, Rx2Config, RxQuality, TxFrame};
pub use registry::{
    AdrParams, DevStat, Device, Gateway, IgnoredLink, Link, MemoryRegistry, PendingDownlink,
    Registry, RegistryError, RxFrame,
};
