// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Neighbor finite state machine (base spec §4.4, component C9).
//!
//! `INITIALIZING -> UPDATE -> TERMINATING`, one instance per MAC neighbor,
//! owned by the peer's [`crate::model::neighbor::NeighborStore`]. Address and
//! metric updates happen inside `UPDATE`; the FSM itself doesn't decide
//! removal from the store — it signals [`NeighborAction::RemoveNeighbor`] and
//! leaves the actual `NeighborStore::remove` call to the dispatch loop, which
//! already holds the mutable borrow needed to do it.

use crate::model::neighbor::{NeighborId, NeighborState};
use crate::model::peer::PeerContext;
use crate::timer::{TimerKind, TimerWheel};
use crate::wire::messages;
use crate::wire::tlv::status_code;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborEvent {
    UpRequested,
    UpResponseReceived,
    UpAckTimerFired,
    UpdateIntervalTimerFired,
    UpdateAckReceived,
    AddressChangeRequested,
    AddressResponseReceived,
    UpdateAckTimerFired,
    LinkCharRequestReceived,
    DownRequested,
    DownRequestReceived,
    DownResponseReceived,
    DownAckTimerFired,
}

/// Validate an inbound packet's sequence against an outstanding expectation
/// (base spec §7 "Unexpected sequence" error class), clearing the
/// expectation either way since the outstanding request is now answered.
fn sequence_matches(expected: &mut Option<u16>, present: bool, sequence: u16) -> bool {
    match expected.take() {
        Some(want) => present && sequence == want,
        None => true,
    }
}

pub enum NeighborAction {
    SendTcp(Vec<u8>),
    /// Send a final reply, then remove the neighbor from the store (base
    /// spec §4.4: the Down Response is the last word before teardown).
    SendTcpThenRemove(Vec<u8>),
    RemoveNeighbor,
    None,
}

/// Advance one neighbor's FSM by one event. `id` must already be a live
/// entry in `peer.neighbors`.
pub fn handle_event(
    peer: &mut PeerContext,
    id: NeighborId,
    wheel: &mut TimerWheel<TimerKind>,
    event: NeighborEvent,
) -> NeighborAction {
    let state = match peer.neighbors.get(id) {
        Some(n) => n.state,
        None => return NeighborAction::None,
    };
    crate::trace_wire!(
        crate::logging::DBG_FSM,
        "neighbor fsm: id={:?} state={:?} event={:?}",
        id,
        state,
        event
    );

    match (state, event) {
        (NeighborState::Initializing, NeighborEvent::UpRequested) => {
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let interval = peer.config.neighbor_up_ack_timeout_secs as u64 * 1000;
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            neighbor.expected_init_ack_sequence = Some(seq);
            let bytes = messages::build_neighbor_up_request(seq, router_id, client_id, neighbor);
            wheel.start(&mut neighbor.init_ack_timer, TimerKind::NeighborInitAck(id.0), interval, None);
            NeighborAction::SendTcp(bytes)
        }

        (NeighborState::Initializing, NeighborEvent::UpResponseReceived) => {
            let update_interval = peer.config.neighbor_update_interval_ms as u64;
            let (pad_seq, pad_present) = (peer.packet_pad.sequence, peer.packet_pad.sequence_present);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            if !sequence_matches(&mut neighbor.expected_init_ack_sequence, pad_present, pad_seq) {
                log::warn!("neighbor {:?}: unexpected sequence on up response", id);
            }
            wheel.stop(&mut neighbor.init_ack_timer);
            neighbor.missed_up_acks = 0;
            neighbor.state = NeighborState::Update;
            wheel.start(
                &mut neighbor.update_interval_timer,
                TimerKind::NeighborUpdateInterval(id.0),
                update_interval,
                Some(update_interval),
            );
            NeighborAction::None
        }

        (NeighborState::Initializing, NeighborEvent::UpAckTimerFired) => {
            let threshold = peer.config.neighbor_up_missed_threshold;
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let interval = peer.config.neighbor_up_ack_timeout_secs as u64 * 1000;
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            neighbor.missed_up_acks += 1;
            if neighbor.missed_up_acks >= threshold {
                wheel.stop(&mut neighbor.init_ack_timer);
                NeighborAction::RemoveNeighbor
            } else {
                neighbor.expected_init_ack_sequence = Some(seq);
                let bytes = messages::build_neighbor_up_request(seq, router_id, client_id, neighbor);
                wheel.start(&mut neighbor.init_ack_timer, TimerKind::NeighborInitAck(id.0), interval, None);
                NeighborAction::SendTcp(bytes)
            }
        }

        (NeighborState::Update, NeighborEvent::UpdateIntervalTimerFired) => {
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            neighbor.expected_update_ack_sequence = Some(seq);
            NeighborAction::SendTcp(messages::build_neighbor_metrics(seq, router_id, client_id, neighbor))
        }

        (NeighborState::Update, NeighborEvent::UpdateAckReceived) => {
            let (pad_seq, pad_present) = (peer.packet_pad.sequence, peer.packet_pad.sequence_present);
            let mrw_present = peer.message_pad.mrw_present;
            let mrw = peer.message_pad.mrw;
            let credit_request_present = peer.message_pad.credit_request_present;
            let status_present = peer.message_pad.status_present;
            let status_code_val = peer.message_pad.status_code;
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            if !sequence_matches(&mut neighbor.expected_update_ack_sequence, pad_present, pad_seq) {
                log::warn!("neighbor {:?}: unexpected sequence on update ack", id);
            }
            if mrw_present {
                neighbor.max_red_window = Some(mrw);
                NeighborAction::None
            } else if credit_request_present {
                if neighbor.credit_not_supported {
                    NeighborAction::SendTcp(messages::build_neighbor_credit_reject(seq, router_id, client_id, neighbor))
                } else {
                    NeighborAction::SendTcp(messages::build_neighbor_credit_grant_request(
                        seq, router_id, client_id, neighbor,
                    ))
                }
            } else if status_present {
                neighbor.status_code = Some(status_code_val);
                NeighborAction::None
            } else {
                NeighborAction::None
            }
        }

        (NeighborState::Update, NeighborEvent::AddressChangeRequested) => {
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let timeout = peer.config.neighbor_up_ack_timeout_secs as u64 * 1000;
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            neighbor.expected_address_response_sequence = Some(seq);
            let bytes = messages::build_neighbor_address_request(seq, router_id, client_id, neighbor);
            wheel.start(&mut neighbor.update_ack_timer, TimerKind::NeighborUpdateAck(id.0), timeout, None);
            NeighborAction::SendTcp(bytes)
        }

        (NeighborState::Update, NeighborEvent::AddressResponseReceived) => {
            let (pad_seq, pad_present) = (peer.packet_pad.sequence, peer.packet_pad.sequence_present);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            if !sequence_matches(&mut neighbor.expected_address_response_sequence, pad_present, pad_seq) {
                log::warn!("neighbor {:?}: unexpected sequence on address response", id);
            }
            wheel.stop(&mut neighbor.update_ack_timer);
            neighbor.missed_update_acks = 0;
            NeighborAction::None
        }

        (NeighborState::Update, NeighborEvent::LinkCharRequestReceived) => {
            let cdr_tx = peer.message_pad.cdr_tx;
            let cdr_tx_present = peer.message_pad.cdr_tx_present;
            let latency = peer.message_pad.latency;
            let latency_present = peer.message_pad.latency_present;
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            if cdr_tx_present {
                neighbor.cdr_tx = Some(cdr_tx);
            }
            if latency_present {
                neighbor.latency = Some(latency);
            }
            let bytes = messages::build_link_char_response(seq, router_id, client_id, neighbor, status_code::SUCCESS);
            NeighborAction::SendTcp(bytes)
        }

        (NeighborState::Update, NeighborEvent::UpdateAckTimerFired) => {
            let threshold = peer.config.neighbor_up_missed_threshold;
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            neighbor.missed_update_acks += 1;
            if neighbor.missed_update_acks >= threshold {
                // Address updates aren't fatal to an otherwise-live neighbor;
                // stop retrying and let the next change request try again.
                log::warn!("neighbor {:?}: giving up on address update ack", id);
            }
            NeighborAction::None
        }

        (NeighborState::Initializing, NeighborEvent::DownRequested)
        | (NeighborState::Update, NeighborEvent::DownRequested) => begin_termination(peer, id, wheel, status_code::SUCCESS),

        (_, NeighborEvent::DownRequestReceived) => {
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            wheel.stop(&mut neighbor.init_ack_timer);
            wheel.stop(&mut neighbor.update_ack_timer);
            wheel.stop(&mut neighbor.update_interval_timer);
            wheel.stop(&mut neighbor.term_ack_timer);
            let bytes = messages::build_neighbor_down_response(seq, router_id, client_id, neighbor);
            NeighborAction::SendTcpThenRemove(bytes)
        }

        (NeighborState::Terminating, NeighborEvent::DownResponseReceived) => {
            let (pad_seq, pad_present) = (peer.packet_pad.sequence, peer.packet_pad.sequence_present);
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            if !sequence_matches(&mut neighbor.expected_term_ack_sequence, pad_present, pad_seq) {
                log::warn!("neighbor {:?}: unexpected sequence on down response", id);
            }
            wheel.stop(&mut neighbor.term_ack_timer);
            NeighborAction::RemoveNeighbor
        }

        (NeighborState::Terminating, NeighborEvent::DownAckTimerFired) => {
            let threshold = peer.config.neighbor_down_missed_threshold;
            let seq = peer.take_sequence();
            let (router_id, client_id) = (peer.router_id, peer.client_id);
            let timeout = peer.config.neighbor_down_ack_timeout_secs as u64 * 1000;
            let neighbor = peer.neighbors.get_mut(id).expect("checked above");
            neighbor.missed_down_acks += 1;
            if neighbor.missed_down_acks >= threshold {
                NeighborAction::RemoveNeighbor
            } else {
                neighbor.expected_term_ack_sequence = Some(seq);
                let bytes = messages::build_neighbor_down_request(seq, router_id, client_id, neighbor, status_code::SUCCESS);
                wheel.start(&mut neighbor.term_ack_timer, TimerKind::NeighborTermAck(id.0), timeout, None);
                NeighborAction::SendTcp(bytes)
            }
        }

        (state, event) => {
            log::warn!("neighbor fsm: ignoring event {event:?} in state {state:?}");
            NeighborAction::None
        }
    }
}

fn begin_termination(
    peer: &mut PeerContext,
    id: NeighborId,
    wheel: &mut TimerWheel<TimerKind>,
    status: u8,
) -> NeighborAction {
    let seq = peer.take_sequence();
    let (router_id, client_id) = (peer.router_id, peer.client_id);
    let timeout = peer.config.neighbor_down_ack_timeout_secs as u64 * 1000;
    let neighbor = peer.neighbors.get_mut(id).expect("checked above");
    wheel.stop(&mut neighbor.init_ack_timer);
    wheel.stop(&mut neighbor.update_ack_timer);
    wheel.stop(&mut neighbor.update_interval_timer);
    neighbor.expected_term_ack_sequence = Some(seq);
    let bytes = messages::build_neighbor_down_request(seq, router_id, client_id, neighbor, status);
    wheel.start(&mut neighbor.term_ack_timer, TimerKind::NeighborTermAck(id.0), timeout, None);
    neighbor.state = NeighborState::Terminating;
    NeighborAction::SendTcp(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::neighbor::NeighborContext;
    use crate::wire::bytes::MacAddr;
    use std::sync::Arc;

    fn new_peer_with_neighbor() -> (PeerContext, NeighborId) {
        let mut peer = PeerContext::new(Arc::new(Config::default()));
        let id = peer.neighbors.insert(NeighborContext::new(MacAddr([1, 2, 3, 4, 5, 6])));
        (peer, id)
    }

    #[test]
    fn up_requested_arms_init_ack_timer() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        assert!(matches!(action, NeighborAction::SendTcp(_)));
        assert!(peer.neighbors.get(id).unwrap().init_ack_timer.is_armed());
    }

    #[test]
    fn up_response_moves_to_update_and_arms_interval_timer() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
        let n = peer.neighbors.get(id).unwrap();
        assert_eq!(n.state, NeighborState::Update);
        assert!(!n.init_ack_timer.is_armed());
        assert!(n.update_interval_timer.is_armed());
    }

    #[test]
    fn exhausting_up_ack_retries_removes_neighbor() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        let threshold = peer.config.neighbor_up_missed_threshold;
        for _ in 0..threshold - 1 {
            let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpAckTimerFired);
            assert!(matches!(action, NeighborAction::SendTcp(_)));
        }
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpAckTimerFired);
        assert!(matches!(action, NeighborAction::RemoveNeighbor));
    }

    #[test]
    fn down_requested_from_update_sends_down_request() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::DownRequested);
        assert!(matches!(action, NeighborAction::SendTcp(_)));
        assert_eq!(peer.neighbors.get(id).unwrap().state, NeighborState::Terminating);
    }

    #[test]
    fn credit_window_status_ack_latches_max_red_window() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpdateIntervalTimerFired);
        peer.message_pad.mrw = 42;
        peer.message_pad.mrw_present = true;
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpdateAckReceived);
        assert!(matches!(action, NeighborAction::None));
        assert_eq!(peer.neighbors.get(id).unwrap().max_red_window, Some(42));
    }

    #[test]
    fn credit_request_is_rejected_when_not_supported() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpdateIntervalTimerFired);
        peer.neighbors.get_mut(id).unwrap().credit_not_supported = true;
        peer.message_pad.credit_request_present = true;
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpdateAckReceived);
        assert!(matches!(action, NeighborAction::SendTcp(_)));
    }

    #[test]
    fn credit_request_is_granted_when_supported() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpdateIntervalTimerFired);
        peer.neighbors.get_mut(id).unwrap().credit_grant_req = Some(10);
        peer.message_pad.credit_request_present = true;
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpdateAckReceived);
        assert!(matches!(action, NeighborAction::SendTcp(_)));
    }

    #[test]
    fn link_char_request_copies_metrics_and_replies() {
        let (mut peer, id) = new_peer_with_neighbor();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpRequested);
        handle_event(&mut peer, id, &mut wheel, NeighborEvent::UpResponseReceived);
        peer.message_pad.cdr_tx = 5_000_000;
        peer.message_pad.cdr_tx_present = true;
        peer.message_pad.latency = 10;
        peer.message_pad.latency_present = true;
        let action = handle_event(&mut peer, id, &mut wheel, NeighborEvent::LinkCharRequestReceived);
        assert!(matches!(action, NeighborAction::SendTcp(_)));
        let n = peer.neighbors.get(id).unwrap();
        assert_eq!(n.cdr_tx, Some(5_000_000));
        assert_eq!(n.latency, Some(10));
    }
}
