// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Message builders for every DLEP operation named in the base spec (C5,
//! §4.3/§4.4). Each function owns exactly one wire shape and is the only
//! place that shape is assembled — the base spec's redesign note against
//! "duplicate builder trees" ([`crate::fuzz`] reuses these same functions
//! rather than re-encoding messages by hand).

use crate::model::neighbor::NeighborContext;
use crate::model::peer::PeerContext;
use crate::wire::encoder::Encoder;
use crate::wire::tlv::msg_code;

/// Build the UDP Peer Discovery signal (base spec §4.3, DISCOVERY state).
/// Carries no required TLVs; the router identifies candidate radios purely
/// by the signal arriving.
pub fn build_peer_discovery() -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_signal_magic();
    enc.packet_header(None, None, None);
    enc.message_block_start(msg_code::ATT_PEER_DISCOVERY);
    enc.message_block_end();
    enc.into_bytes()
}

/// Build the UDP Peer Offer signal sent in reply to a discovery. Carries a
/// sequence number the eventual Peer Initialization Request is expected to
/// echo (base spec §7 "Unexpected sequence" error class).
pub fn build_peer_offer(peer: &mut PeerContext, udp_port: u16, tcp_port: u16) -> Vec<u8> {
    let seq = peer.take_sequence();
    peer.expected_offer_sequence = Some(seq);
    let mut enc = Encoder::new();
    enc.write_signal_magic();
    enc.packet_header(Some(seq), None, None);
    enc.message_block_start(msg_code::PEER_OFFER);
    enc.tlv_peer_type(&peer.peer_type);
    enc.tlv_heartbeat_interval(peer.heartbeat_interval_ms);
    if let Some(addr) = peer.local_ipv4 {
        enc.tlv_ipv4_connection_point(addr, tcp_port);
    }
    if let Some(addr) = peer.local_ipv6 {
        enc.tlv_ipv6_connection_point(addr, tcp_port);
    }
    let _ = udp_port; // the discovery signal itself carries the UDP port implicitly (source address)
    enc.message_block_end();
    enc.into_bytes()
}

/// Build a TCP Peer Initialization Request (INITIALIZATION state).
pub fn build_peer_init_request(peer: &mut PeerContext) -> Vec<u8> {
    let seq = peer.take_sequence();
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_INIT_REQ);
    enc.tlv_peer_type(&peer.peer_type);
    enc.tlv_heartbeat_interval(peer.heartbeat_interval_ms);
    enc.message_block_end();
    enc.into_bytes()
}

/// Build the matching Peer Initialization Response.
pub fn build_peer_init_response(peer: &mut PeerContext, status: u8) -> Vec<u8> {
    let seq = peer.take_sequence();
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_INIT_RES);
    enc.tlv_status(status);
    enc.tlv_peer_type(&peer.peer_type);
    enc.tlv_heartbeat_interval(peer.heartbeat_interval_ms);
    enc.message_block_end();
    enc.into_bytes()
}

/// Build a Peer Update Request, draining whatever peer-level address change
/// is pending (base spec §4.3 "address add/drop operations"). Records the
/// sequence the matching Peer Update Response must echo (base spec §7
/// "Unexpected sequence" error class).
pub fn build_peer_update_request(peer: &mut PeerContext) -> Vec<u8> {
    let seq = peer.take_sequence();
    peer.expected_update_response_sequence = Some(seq);
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_UPDATE_REQ);
    if let Some(pending) = peer.pending_ipv4_addr.take() {
        enc.tlv_ipv4_address(pending.op.to_u8(), pending.addr);
    }
    if let Some(pending) = peer.pending_ipv6_addr.take() {
        enc.tlv_ipv6_address(pending.op.to_u8(), pending.addr);
    }
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_peer_update_response(peer: &mut PeerContext, status: u8) -> Vec<u8> {
    let seq = peer.take_sequence();
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_UPDATE_RES);
    enc.tlv_status(status);
    enc.message_block_end();
    enc.into_bytes()
}

/// Records the sequence the matching Peer Termination Response must echo
/// (base spec §7 "Unexpected sequence" error class).
pub fn build_peer_term_request(peer: &mut PeerContext, status: u8) -> Vec<u8> {
    let seq = peer.take_sequence();
    peer.expected_term_ack_sequence = Some(seq);
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_TERM_REQ);
    enc.tlv_status(status);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_peer_term_response(peer: &mut PeerContext) -> Vec<u8> {
    let seq = peer.take_sequence();
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_TERM_RES);
    enc.tlv_status(crate::wire::tlv::status_code::SUCCESS);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_peer_heartbeat(peer: &mut PeerContext) -> Vec<u8> {
    let seq = peer.take_sequence();
    let mut enc = Encoder::new();
    enc.packet_header(Some(seq), peer.router_id, peer.client_id);
    enc.message_block_start(msg_code::PEER_HEARTBEAT);
    enc.message_block_end();
    enc.into_bytes()
}

// ===== Neighbor messages (base spec §4.4) =====
//
// These take `sequence`/`router_id`/`client_id` as plain values rather than
// `&PeerContext`, and only borrow the `NeighborContext` that lives inside
// `peer.neighbors`: a neighbor builder can't take both a `&mut PeerContext`
// and a `&mut NeighborContext` at once, since the latter borrows from the
// former. Callers do `let seq = peer.take_sequence();` first, then look up
// the neighbor, keeping the two borrows from ever overlapping.

pub fn build_neighbor_up_request(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_UP_REQ);
    enc.tlv_mac_address(neighbor.mac);
    write_link_metrics(&mut enc, neighbor);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_neighbor_up_response(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
    status: u8,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_UP_RES);
    enc.tlv_status(status);
    enc.tlv_mac_address(neighbor.mac);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_neighbor_metrics(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_METRICS);
    enc.tlv_mac_address(neighbor.mac);
    write_link_metrics(&mut enc, neighbor);
    if let (Some(mrw), Some(rrw)) = (neighbor.max_red_window, neighbor.remaining_red_window) {
        enc.tlv_credit_window_status(mrw, rrw);
    }
    if let Some(cgr) = neighbor.credit_grant_req {
        enc.tlv_credit_grant_req(cgr);
    }
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_neighbor_address_request(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &mut NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_ADDRESS_REQ);
    enc.tlv_mac_address(neighbor.mac);
    if let Some(pending) = neighbor.pending_ipv4_addr.take() {
        enc.tlv_ipv4_address(pending.op.to_u8(), pending.addr);
    }
    if let Some(pending) = neighbor.pending_ipv6_addr.take() {
        enc.tlv_ipv6_address(pending.op.to_u8(), pending.addr);
    }
    if let Some((addr, prefix)) = neighbor.ipv4_subnet {
        enc.tlv_ipv4_attached_subnet(addr, prefix);
    }
    if let Some((addr, prefix)) = neighbor.ipv6_subnet {
        enc.tlv_ipv6_attached_subnet(addr, prefix);
    }
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_neighbor_address_response(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
    status: u8,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_ADDRESS_RES);
    enc.tlv_status(status);
    enc.tlv_mac_address(neighbor.mac);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_neighbor_down_request(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
    status: u8,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_DOWN_REQ);
    enc.tlv_status(status);
    enc.tlv_mac_address(neighbor.mac);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_neighbor_down_response(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_DOWN_RES);
    enc.tlv_status(crate::wire::tlv::status_code::SUCCESS);
    enc.tlv_mac_address(neighbor.mac);
    enc.message_block_end();
    enc.into_bytes()
}

/// Build the Credit Grant Request sent when a Credit Request TLV arrives and
/// this radio does support the credit-window sub-protocol (base spec §4.4
/// UPDATE row, `neighbor_update_ack`).
pub fn build_neighbor_credit_grant_request(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_METRICS);
    enc.tlv_mac_address(neighbor.mac);
    if let Some(cgr) = neighbor.credit_grant_req {
        enc.tlv_credit_grant_req(cgr);
    }
    enc.message_block_end();
    enc.into_bytes()
}

/// Build the Credit Reject sent in place of a grant when this radio does not
/// support the credit-window sub-protocol.
pub fn build_neighbor_credit_reject(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::NEIGHBOR_METRICS);
    enc.tlv_mac_address(neighbor.mac);
    enc.tlv_status(crate::wire::tlv::status_code::REQUEST_DENIED);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_link_char_request(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::LINK_CHAR_REQ);
    enc.tlv_mac_address(neighbor.mac);
    write_link_metrics(&mut enc, neighbor);
    enc.message_block_end();
    enc.into_bytes()
}

pub fn build_link_char_response(
    sequence: u16,
    router_id: Option<u32>,
    client_id: Option<u32>,
    neighbor: &NeighborContext,
    status: u8,
) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.packet_header(Some(sequence), router_id, client_id);
    enc.message_block_start(msg_code::LINK_CHAR_RES);
    enc.tlv_status(status);
    enc.tlv_mac_address(neighbor.mac);
    write_link_metrics(&mut enc, neighbor);
    enc.message_block_end();
    enc.into_bytes()
}

fn write_link_metrics(enc: &mut Encoder, neighbor: &NeighborContext) {
    if let Some(v) = neighbor.mdr_rx {
        enc.tlv_mdr_rx(v);
    }
    if let Some(v) = neighbor.mdr_tx {
        enc.tlv_mdr_tx(v);
    }
    if let Some(v) = neighbor.cdr_rx {
        enc.tlv_cdr_rx(v);
    }
    if let Some(v) = neighbor.cdr_tx {
        enc.tlv_cdr_tx(v);
    }
    if let Some(v) = neighbor.latency {
        enc.tlv_latency(v);
    }
    if let Some(v) = neighbor.resources {
        enc.tlv_resources(v);
    }
    if let Some(v) = neighbor.rlq_rx {
        enc.tlv_rlq_rx(v);
    }
    if let Some(v) = neighbor.rlq_tx {
        enc.tlv_rlq_tx(v);
    }
    if let Some(v) = neighbor.mtu {
        enc.tlv_mtu(v);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::wire::bytes::MacAddr;
    use crate::wire::decoder::decode_packet;
    use crate::wire::scratch::{MessageScratchPad, PacketScratchPad};
    use std::sync::Arc;

    #[test]
    fn peer_discovery_decodes_back_to_its_own_code() {
        let bytes = build_peer_discovery();
        let mut packet = PacketScratchPad::default();
        let mut message = MessageScratchPad::default();
        let mut seen = Vec::new();
        decode_packet(&bytes, &mut packet, &mut message, |m| seen.push(m.message_code)).unwrap();
        assert_eq!(seen, vec![msg_code::ATT_PEER_DISCOVERY]);
    }

    #[test]
    fn peer_offer_carries_connection_point_and_heartbeat() {
        let cfg = Arc::new(Config {
            local_ipv4: Some("10.0.0.1".parse().unwrap()),
            ..Config::default()
        });
        let mut peer = PeerContext::new(cfg);
        peer.local_ipv4 = Some("10.0.0.1".parse().unwrap());
        let bytes = build_peer_offer(&mut peer, 854, 854);
        let mut packet = PacketScratchPad::default();
        let mut message = MessageScratchPad::default();
        decode_packet(&bytes, &mut packet, &mut message, |m| {
            assert_eq!(m.message_code, msg_code::PEER_OFFER);
            assert!(m.message.peer_type_present);
            assert!(m.message.ipv4_present);
            assert_eq!(m.message.port, 854);
        })
        .unwrap();
    }

    #[test]
    fn neighbor_up_request_carries_mac() {
        let cfg = Arc::new(Config::default());
        let mut peer = PeerContext::new(cfg);
        let mac = MacAddr([1, 2, 3, 4, 5, 6]);
        let mut neighbor = NeighborContext::new(mac);
        neighbor.mdr_tx = Some(12_000_000);
        let seq = peer.take_sequence();
        let bytes = build_neighbor_up_request(seq, peer.router_id, peer.client_id, &mut neighbor);
        let mut packet = PacketScratchPad::default();
        let mut message = MessageScratchPad::default();
        decode_packet(&bytes, &mut packet, &mut message, |m| {
            assert_eq!(m.message_code, msg_code::NEIGHBOR_UP_REQ);
            assert_eq!(m.message.mac, mac);
            assert!(m.message.mdr_tx_present);
        })
        .unwrap();
    }
}
