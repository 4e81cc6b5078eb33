// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TLV encoder with back-patched message-block length fields (base spec C2).

use crate::wire::bytes::{put_ipv4, put_ipv6, put_mac, put_u16, put_u32, put_u64, put_u8, MacAddr};
use crate::wire::tlv::SIGNAL_MAGIC;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Packet header flag bits (base spec §9 open question, resolved: the
/// sequence/router/client correlation fields ride as optional header
/// extensions, not invented TLV codes — see [`Encoder::packet_header`]).
pub struct PacketHeaderFlags;
impl PacketHeaderFlags {
    pub const SEQNUM: u8 = 0x01;
    pub const ROUTER_ID: u8 = 0x02;
    pub const CLIENT_ID: u8 = 0x04;
}

/// Appends TLVs to a growable buffer, tracking the back-patch point for the
/// current message block's 2-octet length field.
pub struct Encoder {
    buf: Vec<u8>,
    /// Offset of the message-block length placeholder, set by
    /// [`message_block_start`].
    msg_len_at: Option<usize>,
}

impl Encoder {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(128),
            msg_len_at: None,
        }
    }

    /// Prefix the packet with the DLEP signal magic (used only for
    /// attached-discovery and peer-offer, which travel over UDP — base spec §4.1).
    pub fn write_signal_magic(&mut self) {
        self.buf.extend_from_slice(&SIGNAL_MAGIC);
    }

    /// Write the 1-octet RFC5444-derived packet header (version in the high
    /// nibble, flags in the low nibble), followed by whichever optional
    /// header-extension fields the flags select: a 2-octet sequence number
    /// (`PHASSEQNUM`), then a 4-octet router id (`PHASROUTERID`), then a
    /// 4-octet client id (`PHASCLIENTID`). These correlation fields are not
    /// DLEP TLVs — they are header extensions in the same position the
    /// base protocol reserves for its own optional sequence number.
    pub fn packet_header(&mut self, sequence: Option<u16>, router_id: Option<u32>, client_id: Option<u32>) {
        let mut flags: u8 = 0;
        if sequence.is_some() {
            flags |= PacketHeaderFlags::SEQNUM;
        }
        if router_id.is_some() {
            flags |= PacketHeaderFlags::ROUTER_ID;
        }
        if client_id.is_some() {
            flags |= PacketHeaderFlags::CLIENT_ID;
        }
        put_u8(&mut self.buf, flags & 0x0F);
        if let Some(seq) = sequence {
            put_u16(&mut self.buf, seq);
        }
        if let Some(rid) = router_id {
            put_u32(&mut self.buf, rid);
        }
        if let Some(cid) = client_id {
            put_u32(&mut self.buf, cid);
        }
    }

    /// Open a message block: write the 2-octet code, record the length
    /// back-patch point, and emit a zero placeholder length.
    pub fn message_block_start(&mut self, code: u16) {
        put_u16(&mut self.buf, code);
        self.msg_len_at = Some(self.buf.len());
        put_u16(&mut self.buf, 0);
    }

    /// Close the current message block: compute the byte count emitted since
    /// the placeholder and write it in place.
    pub fn message_block_end(&mut self) {
        let at = self
            .msg_len_at
            .take()
            .expect("message_block_end called without matching message_block_start");
        let len = (self.buf.len() - at - 2) as u16;
        self.buf[at..at + 2].copy_from_slice(&len.to_be_bytes());
    }

    // ===== TLV emitters =====

    fn tlv_header(&mut self, code: u16, len: u16) {
        put_u16(&mut self.buf, code);
        put_u16(&mut self.buf, len);
    }

    pub fn tlv_status(&mut self, status: u8) {
        self.tlv_header(crate::wire::tlv::tlv_code::STATUS, 1);
        put_u8(&mut self.buf, status);
    }

    pub fn tlv_peer_type(&mut self, s: &str) {
        let bytes = s.as_bytes();
        debug_assert!(bytes.len() <= crate::wire::tlv::PEER_TYPE_MAX_LEN);
        self.tlv_header(crate::wire::tlv::tlv_code::PEER_TYPE, bytes.len() as u16);
        self.buf.extend_from_slice(bytes);
    }

    pub fn tlv_heartbeat_interval(&mut self, ms: u32) {
        self.tlv_header(crate::wire::tlv::tlv_code::HEARTBEAT_INTERVAL, 4);
        put_u32(&mut self.buf, ms);
    }

    pub fn tlv_mac_address(&mut self, mac: MacAddr) {
        self.tlv_header(crate::wire::tlv::tlv_code::MAC_ADDRESS, 6);
        put_mac(&mut self.buf, mac);
    }

    pub fn tlv_ipv4_connection_point(&mut self, addr: Ipv4Addr, port: u16) {
        self.tlv_header(crate::wire::tlv::tlv_code::IPV4_CONNECTION_POINT, 7);
        put_u8(&mut self.buf, 0); // reserved/flags octet
        put_ipv4(&mut self.buf, addr);
        put_u16(&mut self.buf, port);
    }

    pub fn tlv_ipv6_connection_point(&mut self, addr: Ipv6Addr, port: u16) {
        self.tlv_header(crate::wire::tlv::tlv_code::IPV6_CONNECTION_POINT, 19);
        put_u8(&mut self.buf, 0);
        put_ipv6(&mut self.buf, addr);
        put_u16(&mut self.buf, port);
    }

    /// Address-with-operation TLV: 1 op octet + the address.
    pub fn tlv_ipv4_address(&mut self, op: u8, addr: Ipv4Addr) {
        self.tlv_header(crate::wire::tlv::tlv_code::IPV4_ADDRESS, 5);
        put_u8(&mut self.buf, op);
        put_ipv4(&mut self.buf, addr);
    }

    pub fn tlv_ipv6_address(&mut self, op: u8, addr: Ipv6Addr) {
        self.tlv_header(crate::wire::tlv::tlv_code::IPV6_ADDRESS, 17);
        put_u8(&mut self.buf, op);
        put_ipv6(&mut self.buf, addr);
    }

    pub fn tlv_ipv4_attached_subnet(&mut self, addr: Ipv4Addr, prefix_len: u8) {
        self.tlv_header(crate::wire::tlv::tlv_code::IPV4_ATTACHED_SUBNET, 5);
        put_ipv4(&mut self.buf, addr);
        put_u8(&mut self.buf, prefix_len);
    }

    pub fn tlv_ipv6_attached_subnet(&mut self, addr: Ipv6Addr, prefix_len: u8) {
        self.tlv_header(crate::wire::tlv::tlv_code::IPV6_ATTACHED_SUBNET, 17);
        put_ipv6(&mut self.buf, addr);
        put_u8(&mut self.buf, prefix_len);
    }

    pub fn tlv_mdr_rx(&mut self, v: u64) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_MDR_RX, 8);
        put_u64(&mut self.buf, v);
    }
    pub fn tlv_mdr_tx(&mut self, v: u64) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_MDR_TX, 8);
        put_u64(&mut self.buf, v);
    }
    pub fn tlv_cdr_rx(&mut self, v: u64) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_CDR_RX, 8);
        put_u64(&mut self.buf, v);
    }
    pub fn tlv_cdr_tx(&mut self, v: u64) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_CDR_TX, 8);
        put_u64(&mut self.buf, v);
    }
    pub fn tlv_latency(&mut self, v: u64) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_LATENCY, 8);
        put_u64(&mut self.buf, v);
    }

    pub fn tlv_resources(&mut self, v: u8) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_RESOURCES, 1);
        put_u8(&mut self.buf, v.min(100));
    }
    pub fn tlv_rlq_rx(&mut self, v: u8) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_RLQ_RX, 1);
        put_u8(&mut self.buf, v.min(100));
    }
    pub fn tlv_rlq_tx(&mut self, v: u8) {
        self.tlv_header(crate::wire::tlv::tlv_code::LINK_RLQ_TX, 1);
        put_u8(&mut self.buf, v.min(100));
    }

    pub fn tlv_mtu(&mut self, v: u16) {
        self.tlv_header(crate::wire::tlv::tlv_code::MTU, 2);
        put_u16(&mut self.buf, v);
    }

    pub fn tlv_credit_window_status(&mut self, mrw: u16, rrw: u16) {
        self.tlv_header(crate::wire::tlv::tlv_code::CREDIT_WINDOW_STATUS, 4);
        put_u16(&mut self.buf, mrw);
        put_u16(&mut self.buf, rrw);
    }

    pub fn tlv_credit_grant_req(&mut self, cgr: u16) {
        self.tlv_header(crate::wire::tlv::tlv_code::CREDIT_GRANT_REQ, 2);
        put_u16(&mut self.buf, cgr);
    }

    /// Consume the encoder and return the finished buffer.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_block_length_is_back_patched() {
        let mut enc = Encoder::new();
        enc.message_block_start(7);
        enc.tlv_status(0);
        enc.message_block_end();
        let bytes = enc.into_bytes();
        // code(2) + len(2) + tlv(2+2+1=5)
        assert_eq!(bytes.len(), 9);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]), 5);
    }

    #[test]
    fn rlq_clamps_to_100() {
        let mut enc = Encoder::new();
        enc.tlv_rlq_tx(255);
        let bytes = enc.into_bytes();
        assert_eq!(bytes[4], 100);
    }

    #[test]
    fn signal_magic_prefix() {
        let mut enc = Encoder::new();
        enc.write_signal_magic();
        assert_eq!(&enc.bytes()[0..4], &SIGNAL_MAGIC);
    }
}
