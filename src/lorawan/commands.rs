//! # MAC-Command Hook
//!
//! FOpts bytes are handed to a [`MacCommandHandler`] verbatim; the MAC core
//! itself never parses MAC commands. A handler may rewrite the link's ADR
//! state from answers it decodes and return command bytes to piggyback on
//! the next downlink's FOpts field.

use crate::lorawan::registry::Link;

/// Processes uplink FOpts and produces downlink FOpts.
pub trait MacCommandHandler: Send + Sync {
    /// Called for every authenticated uplink, before the session record is
    /// committed. Returns the (possibly updated) link and the FOpts bytes
    /// to send downstream; at most 15 bytes are transmitted.
    fn handle(&self, link: Link, fopts: &[u8]) -> (Link, Vec<u8>);
}

/// Default handler: ignores incoming options and queues nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCommands;

impl MacCommandHandler for PassthroughCommands {
    fn handle(&self, link: Link, _fopts: &[u8]) -> (Link, Vec<u8>) {
        (link, Vec::new())
    }
}
