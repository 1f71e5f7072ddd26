//! # Regional Data-Rate Mapping
//!
//! Maps LoRaWAN data-rate indices to the modulation strings used by the
//! gateway protocol ("SF12BW125" and friends) for an EU868-like band plan.
//! Anything beyond the DR ↔ spreading-factor table (duty cycle, channel
//! plans, TX power tables) is configuration policy outside the MAC core.

/// Data-rate table for DR0..DR6: spreading factor and bandwidth as
/// transmitted in the packet-forwarder `datr` field.
const DATA_RATES: [&str; 7] = [
    "SF12BW125",
    "SF11BW125",
    "SF10BW125",
    "SF9BW125",
    "SF8BW125",
    "SF7BW125",
    "SF7BW250",
];

/// Modulation string for a data-rate index, or `None` outside the table.
pub fn dr_to_datr(dr: u8) -> Option<&'static str> {
    DATA_RATES.get(dr as usize).copied()
}

/// Data-rate index for a modulation string, or `None` if it is not part of
/// the regional table. Matching is exact; gateways report these strings
/// verbatim.
pub fn datr_to_dr(datr: &str) -> Option<u8> {
    DATA_RATES.iter().position(|&d| d == datr).map(|i| i as u8)
}
