// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Packet- and message-scoped scratch pads (base spec C4).
//!
//! These are the *only* channel between TLV decoders and event handlers.
//! They carry no ownership of decoded bytes, are zeroed before each inbound
//! packet decode, and every field is paired with a `_present` flag so a
//! handler can distinguish "absent" from "present with value zero" (base
//! spec §8: "Latency 0 round-trips as 0 and is not confused with absent").

use crate::wire::bytes::{AddrOp, MacAddr};
use std::net::{Ipv4Addr, Ipv6Addr};

/// Packet-scoped fields (base spec §3).
#[derive(Debug, Default, Clone)]
pub struct PacketScratchPad {
    pub sequence: u16,
    pub sequence_present: bool,
    pub router_id: u32,
    pub router_id_present: bool,
    pub client_id: u32,
    pub client_id_present: bool,
    pub peer_heartbeat_interval: u32,
    pub peer_heartbeat_interval_present: bool,
}

impl PacketScratchPad {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Message-scoped fields (base spec §3).
#[derive(Debug, Default, Clone)]
pub struct MessageScratchPad {
    pub message_code: u16,

    pub major_version: u8,
    pub minor_version: u8,
    pub version_present: bool,

    pub status_code: u8,
    pub status_present: bool,

    pub mac: MacAddr,
    pub mac_present: bool,

    pub ipv4: Ipv4Addr,
    pub ipv4_op: AddrOp,
    pub ipv4_present: bool,

    pub ipv6: Ipv6Addr,
    pub ipv6_op: AddrOp,
    pub ipv6_present: bool,

    pub ipv4_subnet: Ipv4Addr,
    pub ipv4_subnet_prefix: u8,
    pub ipv4_subnet_present: bool,

    pub ipv6_subnet: Ipv6Addr,
    pub ipv6_subnet_prefix: u8,
    pub ipv6_subnet_present: bool,

    pub peer_type: String,
    pub peer_type_present: bool,

    pub rlq_tx: u8,
    pub rlq_tx_present: bool,
    pub rlq_rx: u8,
    pub rlq_rx_present: bool,
    pub resources: u8,
    pub resources_present: bool,
    pub latency: u64,
    pub latency_present: bool,
    pub cdr_tx: u64,
    pub cdr_tx_present: bool,
    pub cdr_rx: u64,
    pub cdr_rx_present: bool,
    pub mdr_tx: u64,
    pub mdr_tx_present: bool,
    pub mdr_rx: u64,
    pub mdr_rx_present: bool,
    pub mtu: u16,
    pub mtu_present: bool,

    pub mrw: u16,
    pub mrw_present: bool,
    pub rrw: u16,
    pub rrw_present: bool,
    pub cgr: u16,
    pub cgr_present: bool,
    /// Set when a Credit Request TLV was present (it carries no value of
    /// its own, just a presence marker).
    pub credit_request_present: bool,

    pub port: u16,
    pub port_present: bool,

    pub eft: u32,
    pub eft_present: bool,
    pub hbt: u32,
    pub hbt_present: bool,
}

impl MessageScratchPad {
    pub fn clear(&mut self) {
        let code = self.message_code;
        *self = Self::default();
        self.message_code = code;
    }
}

impl Default for AddrOp {
    fn default() -> Self {
        AddrOp::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clear_resets_present_flags() {
        let mut pad = MessageScratchPad::default();
        pad.status_code = 5;
        pad.status_present = true;
        pad.latency = 0;
        pad.latency_present = true;
        pad.clear();
        assert!(!pad.status_present);
        assert!(!pad.latency_present);
        assert_eq!(pad.status_code, 0);
    }

    #[test]
    fn latency_zero_distinct_from_absent() {
        let mut pad = MessageScratchPad::default();
        assert!(!pad.latency_present);
        pad.latency = 0;
        pad.latency_present = true;
        assert!(pad.latency_present);
        assert_eq!(pad.latency, 0);
    }
}
