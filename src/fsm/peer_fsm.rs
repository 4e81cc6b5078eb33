// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Peer finite state machine (base spec §4.3, component C8).
//!
//! `DISCOVERY -> INITIALIZATION -> IN_SESSION -> TERMINATING -> RESET(->
//! DISCOVERY)`. The radio endpoint is the *responder* side of discovery: it
//! waits for a UDP Peer Discovery signal and answers with a Peer Offer, then
//! waits for the router to open the TCP session and complete initialization.

use crate::model::peer::{PeerContext, PeerState};
use crate::timer::{TimerKind, TimerWheel};
use crate::wire::messages;
use crate::wire::tlv::status_code;

/// Inputs the dispatch loop feeds into the peer FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerEvent {
    DiscoverySignalReceived,
    InitRequestReceived,
    InitResponseReceived,
    UpdateRequestReceived,
    UpdateResponseReceived,
    TermRequestReceived,
    TermResponseReceived,
    HeartbeatReceived,
    OfferTimerFired,
    HeartbeatTimerFired,
    TermAckTimerFired,
    OperatorTerminateRequested,
}

/// Validate an inbound packet's sequence against an outstanding expectation
/// (base spec §7 "Unexpected sequence" error class). The expectation is
/// one-shot: it is cleared whether or not it matches, since the outstanding
/// request it correlated with has now been answered (or answered wrongly).
fn check_expected_sequence(expected: &mut Option<u16>, pad: &crate::wire::scratch::PacketScratchPad) -> bool {
    match expected.take() {
        Some(want) => pad.sequence_present && pad.sequence == want,
        None => true,
    }
}

/// What the FSM wants the dispatch loop to do in response to an event.
pub enum PeerAction {
    SendUdp(Vec<u8>),
    SendTcp(Vec<u8>),
    /// The TCP session should be torn down (RESET completed).
    CloseSession,
    None,
}

/// Advance the peer FSM by one event. Timer arm/cancel and sequence
/// allocation happen here, alongside the state transition itself, so a
/// caller never has to remember to pair the two (base spec §4.5 "synchronous
/// with the dispatch loop").
pub fn handle_event(peer: &mut PeerContext, wheel: &mut TimerWheel<TimerKind>, event: PeerEvent) -> PeerAction {
    crate::trace_wire!(
        crate::logging::DBG_FSM,
        "peer fsm: state={:?} event={:?}",
        peer.state,
        event
    );
    match (peer.state, event) {
        (PeerState::Discovery, PeerEvent::DiscoverySignalReceived) => {
            let udp_port = peer.config.local_udp_port;
            let tcp_port = peer.config.local_tcp_port;
            let bytes = messages::build_peer_offer(peer, udp_port, tcp_port);
            wheel.start(
                &mut peer.offer_timer,
                TimerKind::PeerOffer,
                (peer.config.peer_offer_interval_secs as u64) * 1000,
                None,
            );
            peer.state = PeerState::Initialization;
            PeerAction::SendUdp(bytes)
        }

        (PeerState::Discovery, PeerEvent::InitRequestReceived)
        | (PeerState::Initialization, PeerEvent::InitRequestReceived) => {
            wheel.stop(&mut peer.offer_timer);
            let status = if check_expected_sequence(&mut peer.expected_offer_sequence, &peer.packet_pad) {
                status_code::SUCCESS
            } else {
                log::warn!("peer fsm: unexpected sequence on init request");
                status_code::MSG_UNEXPECTED
            };
            let resp = messages::build_peer_init_response(peer, status);
            if status == status_code::SUCCESS {
                wheel.start(
                    &mut peer.heartbeat_timer,
                    TimerKind::PeerHeartbeat,
                    peer.heartbeat_interval_ms as u64,
                    Some(peer.heartbeat_interval_ms as u64),
                );
                peer.state = PeerState::InSession;
            }
            PeerAction::SendTcp(resp)
        }

        (PeerState::Discovery, PeerEvent::InitResponseReceived)
        | (PeerState::Initialization, PeerEvent::InitResponseReceived) => {
            wheel.stop(&mut peer.offer_timer);
            wheel.start(
                &mut peer.heartbeat_timer,
                TimerKind::PeerHeartbeat,
                peer.heartbeat_interval_ms as u64,
                Some(peer.heartbeat_interval_ms as u64),
            );
            peer.state = PeerState::InSession;
            PeerAction::None
        }

        (PeerState::Initialization, PeerEvent::OfferTimerFired) => {
            // The router never opened a session off our offer; give up and
            // go back to listening for a fresh discovery.
            peer.reset_to_discovery();
            PeerAction::None
        }

        (PeerState::InSession, PeerEvent::HeartbeatReceived) => {
            peer.missed_heartbeats = 0;
            PeerAction::None
        }

        (PeerState::InSession, PeerEvent::HeartbeatTimerFired) => {
            peer.missed_heartbeats += 1;
            if peer.missed_heartbeats >= peer.config.heartbeat_missed_threshold {
                begin_termination(peer, wheel, status_code::MSG_TIMEOUT)
            } else {
                PeerAction::SendTcp(messages::build_peer_heartbeat(peer))
            }
        }

        (PeerState::InSession, PeerEvent::UpdateRequestReceived) => {
            PeerAction::SendTcp(messages::build_peer_update_response(peer, status_code::SUCCESS))
        }

        (PeerState::InSession, PeerEvent::UpdateResponseReceived) => {
            if check_expected_sequence(&mut peer.expected_update_response_sequence, &peer.packet_pad) {
                peer.status_code = peer.message_pad.status_code;
            } else {
                log::warn!("peer fsm: unexpected sequence on update response");
            }
            PeerAction::None
        }

        (PeerState::InSession, PeerEvent::OperatorTerminateRequested) => {
            begin_termination(peer, wheel, status_code::SUCCESS)
        }

        (PeerState::InSession, PeerEvent::TermRequestReceived) => {
            wheel.stop(&mut peer.heartbeat_timer);
            let resp = messages::build_peer_term_response(peer);
            peer.reset_to_discovery();
            PeerAction::SendTcp(resp)
        }

        (PeerState::Terminating, PeerEvent::TermRequestReceived) => {
            // Simultaneous termination: answer the router's request too.
            wheel.stop(&mut peer.term_ack_timer);
            let resp = messages::build_peer_term_response(peer);
            peer.reset_to_discovery();
            PeerAction::SendTcp(resp)
        }

        (PeerState::Terminating, PeerEvent::TermResponseReceived) => {
            if !check_expected_sequence(&mut peer.expected_term_ack_sequence, &peer.packet_pad) {
                log::warn!("peer fsm: unexpected sequence on term response");
            }
            wheel.stop(&mut peer.term_ack_timer);
            peer.reset_to_discovery();
            PeerAction::CloseSession
        }

        (PeerState::Terminating, PeerEvent::TermAckTimerFired) => {
            peer.missed_term_acks += 1;
            if peer.missed_term_acks >= peer.config.peer_term_missed_threshold {
                peer.reset_to_discovery();
                PeerAction::CloseSession
            } else {
                let req = messages::build_peer_term_request(peer, status_code::MSG_TIMEOUT);
                wheel.start(
                    &mut peer.term_ack_timer,
                    TimerKind::PeerTermAck,
                    (peer.config.peer_term_ack_timeout_secs as u64) * 1000,
                    None,
                );
                PeerAction::SendTcp(req)
            }
        }

        (state, event) => {
            log::warn!("peer fsm: ignoring event {event:?} in state {state:?}");
            PeerAction::None
        }
    }
}

fn begin_termination(peer: &mut PeerContext, wheel: &mut TimerWheel<TimerKind>, status: u8) -> PeerAction {
    wheel.stop(&mut peer.heartbeat_timer);
    let req = messages::build_peer_term_request(peer, status);
    wheel.start(
        &mut peer.term_ack_timer,
        TimerKind::PeerTermAck,
        (peer.config.peer_term_ack_timeout_secs as u64) * 1000,
        None,
    );
    peer.state = PeerState::Terminating;
    PeerAction::SendTcp(req)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::timer::TimerWheel;
    use std::sync::Arc;

    fn new_peer() -> PeerContext {
        PeerContext::new(Arc::new(Config::default()))
    }

    #[test]
    fn discovery_signal_sends_offer_and_enters_initialization() {
        let mut peer = new_peer();
        let mut wheel = TimerWheel::new();
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::DiscoverySignalReceived);
        assert!(matches!(action, PeerAction::SendUdp(_)));
        assert_eq!(peer.state, PeerState::Initialization);
        assert!(peer.offer_timer.is_armed());
    }

    #[test]
    fn init_request_enters_session_and_arms_heartbeat() {
        let mut peer = new_peer();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, &mut wheel, PeerEvent::DiscoverySignalReceived);
        peer.packet_pad.sequence = peer.expected_offer_sequence.unwrap();
        peer.packet_pad.sequence_present = true;
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::InitRequestReceived);
        assert!(matches!(action, PeerAction::SendTcp(_)));
        assert_eq!(peer.state, PeerState::InSession);
        assert!(!peer.offer_timer.is_armed());
        assert!(peer.heartbeat_timer.is_armed());
    }

    #[test]
    fn repeated_missed_heartbeats_trigger_termination() {
        let mut peer = new_peer();
        peer.state = PeerState::InSession;
        let mut wheel = TimerWheel::new();
        for _ in 0..peer.config.heartbeat_missed_threshold - 1 {
            let action = handle_event(&mut peer, &mut wheel, PeerEvent::HeartbeatTimerFired);
            assert!(matches!(action, PeerAction::SendTcp(_)));
            assert_eq!(peer.state, PeerState::InSession);
        }
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::HeartbeatTimerFired);
        assert!(matches!(action, PeerAction::SendTcp(_)));
        assert_eq!(peer.state, PeerState::Terminating);
    }

    #[test]
    fn term_response_resets_to_discovery() {
        let mut peer = new_peer();
        peer.state = PeerState::Terminating;
        let mut wheel = TimerWheel::new();
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::TermResponseReceived);
        assert!(matches!(action, PeerAction::CloseSession));
        assert_eq!(peer.state, PeerState::Discovery);
    }

    #[test]
    fn terminating_term_request_also_resets_to_discovery() {
        let mut peer = new_peer();
        peer.state = PeerState::Terminating;
        let mut wheel = TimerWheel::new();
        wheel.start(&mut peer.term_ack_timer, TimerKind::PeerTermAck, 1000, None);
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::TermRequestReceived);
        assert!(matches!(action, PeerAction::SendTcp(_)));
        assert_eq!(peer.state, PeerState::Discovery);
        assert!(!peer.term_ack_timer.is_armed());
    }

    #[test]
    fn discovery_state_init_request_enters_session_directly() {
        let mut peer = new_peer();
        let mut wheel = TimerWheel::new();
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::InitRequestReceived);
        assert!(matches!(action, PeerAction::SendTcp(_)));
        assert_eq!(peer.state, PeerState::InSession);
        assert!(peer.heartbeat_timer.is_armed());
    }

    #[test]
    fn init_request_with_wrong_sequence_is_rejected() {
        let mut peer = new_peer();
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, &mut wheel, PeerEvent::DiscoverySignalReceived);
        peer.packet_pad.sequence = peer.expected_offer_sequence.unwrap().wrapping_add(1);
        peer.packet_pad.sequence_present = true;
        handle_event(&mut peer, &mut wheel, PeerEvent::InitRequestReceived);
        assert_eq!(peer.state, PeerState::Initialization);
        assert!(!peer.heartbeat_timer.is_armed());
    }

    #[test]
    fn update_response_latches_status_code() {
        let mut peer = new_peer();
        peer.state = PeerState::InSession;
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, &mut wheel, PeerEvent::UpdateRequestReceived);
        let seq = peer.take_sequence();
        peer.expected_update_response_sequence = Some(seq);
        peer.packet_pad.sequence = seq;
        peer.packet_pad.sequence_present = true;
        peer.message_pad.status_code = status_code::SUCCESS;
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::UpdateResponseReceived);
        assert!(matches!(action, PeerAction::None));
        assert_eq!(peer.status_code, status_code::SUCCESS);
        assert!(peer.expected_update_response_sequence.is_none());
    }

    #[test]
    fn term_ack_timeout_exhausting_retries_gives_up() {
        let mut peer = new_peer();
        peer.state = PeerState::InSession;
        let mut wheel = TimerWheel::new();
        handle_event(&mut peer, &mut wheel, PeerEvent::OperatorTerminateRequested);
        assert_eq!(peer.state, PeerState::Terminating);
        for _ in 0..peer.config.peer_term_missed_threshold - 1 {
            let action = handle_event(&mut peer, &mut wheel, PeerEvent::TermAckTimerFired);
            assert!(matches!(action, PeerAction::SendTcp(_)));
        }
        let action = handle_event(&mut peer, &mut wheel, PeerEvent::TermAckTimerFired);
        assert!(matches!(action, PeerAction::CloseSession));
        assert_eq!(peer.state, PeerState::Discovery);
    }
}
