//! # Application Handler Contract
//!
//! Applications (plugins, bridges, backend connectors) sit behind this
//! trait. The MAC layer notifies them of joins and authenticated uplinks
//! and lets them decide whether a downlink is produced; the handler never
//! sees wire formats or key material.

use async_trait::async_trait;
use thiserror::Error;

use crate::error::LoraWanError;
use crate::lorawan::frame::DevAddr;

/// Error surfaced by an application handler; the MAC reports it to the
/// transport without retrying.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{0}")]
pub struct AppError(pub String);

impl From<AppError> for LoraWanError {
    fn from(err: AppError) -> Self {
        LoraWanError::App(err.0)
    }
}

/// Decrypted uplink delivered to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct RxData {
    /// FPort, absent when the frame carried no payload.
    pub port: Option<u8>,
    /// Decrypted FRMPayload.
    pub data: Vec<u8>,
    /// True when a previously sent confirmed downlink was not acknowledged
    /// by this uplink; the handler may answer with
    /// [`RxDecision::Retransmit`].
    pub last_lost: bool,
    /// True when the MAC must transmit in the device's receive window
    /// regardless of the handler's decision (confirmed uplink, ADR ack
    /// request, or queued MAC commands).
    pub shall_reply: bool,
}

/// Downlink requested by the application.
#[derive(Debug, Clone, PartialEq)]
pub struct TxData {
    pub confirmed: bool,
    pub port: Option<u8>,
    pub data: Vec<u8>,
    /// Sets the FPending bit, telling the device more data is queued.
    pub pending: bool,
}

/// Application verdict for one uplink.
#[derive(Debug, Clone, PartialEq)]
pub enum RxDecision {
    /// Nothing to send; the MAC still produces an empty reply when the
    /// protocol requires one.
    Handled,
    /// Resend the stored confirmed downlink verbatim.
    Retransmit,
    /// Build and schedule a fresh downlink.
    Send(TxData),
}

/// Receiver for join notifications and uplink data.
#[async_trait]
pub trait AppHandler: Send + Sync {
    /// A device completed the join handshake and owns `devaddr` now.
    /// Returning an error suppresses the join-accept.
    async fn handle_join(&self, devaddr: DevAddr, app: &str, appid: &str)
        -> Result<(), AppError>;

    /// An authenticated uplink was committed for `devaddr`.
    async fn handle_rx(
        &self,
        devaddr: DevAddr,
        app: &str,
        appid: &str,
        rx: RxData,
    ) -> Result<RxDecision, AppError>;
}
