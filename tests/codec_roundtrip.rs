// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Integration-level round-trip and FSM coverage across the wire codec,
//! timer wheel, and peer/neighbor state machines.

use dlep_radio::config::Config;
use dlep_radio::fsm::neighbor_fsm::{self, NeighborAction, NeighborEvent};
use dlep_radio::fsm::peer_fsm::{self, PeerAction, PeerEvent};
use dlep_radio::model::neighbor::NeighborContext;
use dlep_radio::model::peer::{PeerContext, PeerState};
use dlep_radio::timer::{TimerKind, TimerWheel};
use dlep_radio::wire::bytes::MacAddr;
use dlep_radio::wire::decoder::decode_packet;
use dlep_radio::wire::messages;
use dlep_radio::wire::scratch::{MessageScratchPad, PacketScratchPad};
use dlep_radio::wire::tlv::msg_code;
use std::sync::Arc;

fn fresh_peer() -> PeerContext {
    PeerContext::new(Arc::new(Config::default()))
}

#[test]
fn peer_init_request_round_trips_sequence_and_router_ids() {
    let mut peer = fresh_peer();
    peer.router_id = Some(0xAABBCCDD);
    peer.client_id = Some(7);
    let bytes = messages::build_peer_init_request(&mut peer);

    let mut packet = PacketScratchPad::default();
    let mut message = MessageScratchPad::default();
    let mut seen_code = None;
    decode_packet(&bytes, &mut packet, &mut message, |m| {
        seen_code = Some(m.message_code);
    })
    .unwrap();

    assert_eq!(seen_code, Some(msg_code::PEER_INIT_REQ));
    assert!(packet.sequence_present);
    assert_eq!(packet.sequence, 1);
    assert!(packet.router_id_present);
    assert_eq!(packet.router_id, 0xAABBCCDD);
    assert!(packet.client_id_present);
    assert_eq!(packet.client_id, 7);
}

#[test]
fn neighbor_metrics_round_trips_every_link_field() {
    let mut peer = fresh_peer();
    let mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x01]);
    let mut neighbor = NeighborContext::new(mac);
    neighbor.mdr_rx = Some(54_000_000);
    neighbor.mdr_tx = Some(54_000_000);
    neighbor.latency = Some(0); // zero must still round-trip as present
    neighbor.resources = Some(100);
    neighbor.rlq_rx = Some(90);
    neighbor.rlq_tx = Some(90);
    neighbor.mtu = Some(1500);

    let seq = peer.take_sequence();
    let bytes = messages::build_neighbor_metrics(seq, peer.router_id, peer.client_id, &neighbor);

    let mut packet = PacketScratchPad::default();
    let mut message = MessageScratchPad::default();
    decode_packet(&bytes, &mut packet, &mut message, |m| {
        assert_eq!(m.message_code, msg_code::NEIGHBOR_METRICS);
        assert!(m.message.mac_present);
        assert_eq!(m.message.mac, mac);
        assert!(m.message.latency_present);
        assert_eq!(m.message.latency, 0);
        assert!(m.message.mtu_present);
        assert_eq!(m.message.mtu, 1500);
    })
    .unwrap();
}

#[test]
fn peer_fsm_drives_discovery_through_in_session() {
    let mut peer = fresh_peer();
    let mut wheel = TimerWheel::<TimerKind>::new();
    assert_eq!(peer.state, PeerState::Discovery);

    let action = peer_fsm::handle_event(&mut peer, &mut wheel, PeerEvent::DiscoverySignalReceived);
    assert!(matches!(action, PeerAction::SendUdp(_)));
    assert_eq!(peer.state, PeerState::Initialization);

    peer.packet_pad.sequence = peer.expected_offer_sequence.unwrap();
    peer.packet_pad.sequence_present = true;
    let action = peer_fsm::handle_event(&mut peer, &mut wheel, PeerEvent::InitRequestReceived);
    assert!(matches!(action, PeerAction::SendTcp(_)));
    assert_eq!(peer.state, PeerState::InSession);

    let action = peer_fsm::handle_event(&mut peer, &mut wheel, PeerEvent::HeartbeatReceived);
    assert!(matches!(action, PeerAction::None));
    assert_eq!(peer.missed_heartbeats, 0);
}

#[test]
fn peer_fsm_terminates_after_missed_heartbeat_threshold() {
    let mut peer = fresh_peer();
    peer.state = PeerState::InSession;
    let mut wheel = TimerWheel::<TimerKind>::new();

    let threshold = peer.config.heartbeat_missed_threshold;
    let mut last_action = PeerAction::None;
    for _ in 0..threshold {
        last_action = peer_fsm::handle_event(&mut peer, &mut wheel, PeerEvent::HeartbeatTimerFired);
    }
    assert_eq!(peer.state, PeerState::Terminating);
    assert!(matches!(last_action, PeerAction::SendTcp(_)));
}

#[test]
fn neighbor_fsm_drives_initializing_through_update() {
    let mut peer = fresh_peer();
    let mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x02]);
    let id = peer.neighbors.insert(NeighborContext::new(mac));
    let mut wheel = TimerWheel::<TimerKind>::new();

    let action = neighbor_fsm::handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
    assert!(matches!(action, NeighborAction::SendTcp(_)));

    let action = neighbor_fsm::handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
    assert!(matches!(action, NeighborAction::None));
    assert_eq!(peer.neighbors.get(id).unwrap().state, dlep_radio::model::neighbor::NeighborState::Update);
}

#[test]
fn neighbor_fsm_down_request_sends_then_removes() {
    let mut peer = fresh_peer();
    let mac = MacAddr([0x02, 0x00, 0x00, 0x00, 0x00, 0x03]);
    let id = peer.neighbors.insert(NeighborContext::new(mac));
    let mut wheel = TimerWheel::<TimerKind>::new();

    let action = neighbor_fsm::handle_event(&mut peer, id, &mut wheel, NeighborEvent::DownRequestReceived);
    assert!(matches!(action, NeighborAction::SendTcpThenRemove(_)));
    if let NeighborAction::SendTcpThenRemove(bytes) = action {
        peer.neighbors.remove(id);
        let mut packet = PacketScratchPad::default();
        let mut message = MessageScratchPad::default();
        decode_packet(&bytes, &mut packet, &mut message, |m| {
            assert_eq!(m.message_code, msg_code::NEIGHBOR_DOWN_RES);
        })
        .unwrap();
    }
    assert!(peer.neighbors.get(id).is_none());
}

#[test]
fn timer_wheel_fires_each_armed_key_once() {
    let mut wheel = TimerWheel::<TimerKind>::new();
    let mut cell = dlep_radio::timer::TimerCell::default();
    wheel.start(&mut cell, TimerKind::PeerHeartbeat, 300, None);

    let mut fired = Vec::new();
    for _ in 0..5 {
        fired.extend(wheel.tick());
    }
    assert_eq!(fired, vec![TimerKind::PeerHeartbeat]);
}
