// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Peer context and store (base spec §3 Data Model, §4.3 Peer FSM).

use crate::config::Config;
use crate::model::neighbor::NeighborStore;
use crate::timer::TimerCell;
use crate::wire::scratch::{MessageScratchPad, PacketScratchPad};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;

/// Peer FSM states (base spec §4.3): `DISCOVERY -> INITIALIZATION ->
/// IN_SESSION -> TERMINATING -> RESET(-> DISCOVERY)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    Discovery,
    Initialization,
    InSession,
    Terminating,
    Reset,
}

/// A pending peer-level address change, queued until the next Update Request
/// (base spec §4.3 "address add/drop operations").
#[derive(Debug, Clone, Copy)]
pub struct PendingAddr<A> {
    pub op: crate::wire::bytes::AddrOp,
    pub addr: A,
}

/// All state the radio endpoint keeps for its one DLEP session with a
/// router. Stored in a [`PeerStore`] arena rather than owned directly by the
/// dispatch loop, per the base spec's "linked-list stores -> indexed arenas"
/// redesign note; in practice at most one slot is ever occupied (base spec
/// §9 open question, accepted as a simplification).
pub struct PeerContext {
    pub config: Arc<Config>,

    pub router_id: Option<u32>,
    pub client_id: Option<u32>,
    pub session_addr: Option<SocketAddr>,

    pub local_ipv4: Option<Ipv4Addr>,
    pub local_ipv6: Option<Ipv6Addr>,
    pub router_ipv4: Option<Ipv4Addr>,
    pub router_ipv6: Option<Ipv6Addr>,

    pub peer_type: String,
    pub heartbeat_interval_ms: u32,
    pub status_code: u8,

    /// Outbound packet sequence counter (base spec packet header extension).
    pub next_sequence: u16,

    pub missed_offer_acks: u32,
    pub missed_heartbeats: u32,
    pub missed_term_acks: u32,

    /// Sequence number the outstanding Peer Offer expects to be echoed by
    /// the eventual Peer Initialization Request (base spec §7 "Unexpected
    /// sequence" error class).
    pub expected_offer_sequence: Option<u16>,
    /// Sequence number the outstanding Peer Termination expects its
    /// Peer Termination Response to echo.
    pub expected_term_ack_sequence: Option<u16>,
    /// Sequence number the outstanding Peer Update Request expects its
    /// Peer Update Response to echo.
    pub expected_update_response_sequence: Option<u16>,

    pub pending_ipv4_addr: Option<PendingAddr<Ipv4Addr>>,
    pub pending_ipv6_addr: Option<PendingAddr<Ipv6Addr>>,

    pub link_mdr_tx: Option<u64>,
    pub link_mdr_rx: Option<u64>,
    pub link_cdr_tx: Option<u64>,
    pub link_cdr_rx: Option<u64>,
    pub link_latency: Option<u64>,
    pub link_resources: Option<u8>,
    pub link_rlq_tx: Option<u8>,
    pub link_rlq_rx: Option<u8>,
    pub mtu: Option<u16>,

    pub state: PeerState,

    pub offer_timer: TimerCell,
    pub heartbeat_timer: TimerCell,
    pub term_ack_timer: TimerCell,

    pub neighbors: NeighborStore,

    /// Scratch pads owned by the peer so decode and FSM dispatch can share
    /// them without per-message allocation (base spec §3 "sole decode ->
    /// handler data channel").
    pub packet_pad: PacketScratchPad,
    pub message_pad: MessageScratchPad,
}

impl PeerContext {
    pub fn new(config: Arc<Config>) -> Self {
        let peer_type = config.local_peer_type.clone();
        let heartbeat_interval_ms = config.heartbeat_interval_secs.saturating_mul(1000);
        Self {
            local_ipv4: config.local_ipv4,
            local_ipv6: config.local_ipv6,
            router_ipv4: config.router_ipv4,
            router_ipv6: config.router_ipv6,
            config,
            router_id: None,
            client_id: None,
            session_addr: None,
            peer_type,
            heartbeat_interval_ms,
            status_code: crate::wire::tlv::status_code::SUCCESS,
            next_sequence: 0,
            missed_offer_acks: 0,
            missed_heartbeats: 0,
            missed_term_acks: 0,
            expected_offer_sequence: None,
            expected_term_ack_sequence: None,
            expected_update_response_sequence: None,
            pending_ipv4_addr: None,
            pending_ipv6_addr: None,
            link_mdr_tx: None,
            link_mdr_rx: None,
            link_cdr_tx: None,
            link_cdr_rx: None,
            link_latency: None,
            link_resources: None,
            link_rlq_tx: None,
            link_rlq_rx: None,
            mtu: None,
            state: PeerState::Discovery,
            offer_timer: TimerCell::default(),
            heartbeat_timer: TimerCell::default(),
            term_ack_timer: TimerCell::default(),
            neighbors: NeighborStore::new(),
            packet_pad: PacketScratchPad::default(),
            message_pad: MessageScratchPad::default(),
        }
    }

    /// Allocate and return the next outbound sequence number. Skips 0 on
    /// wrap so that 0 never repeats as a live sequence value.
    pub fn take_sequence(&mut self) -> u16 {
        let seq = self.next_sequence;
        self.next_sequence = self.next_sequence.wrapping_add(1);
        if self.next_sequence == 0 {
            self.next_sequence = 1;
        }
        seq
    }

    /// Reset session-scoped state back to a fresh DISCOVERY posture, keeping
    /// immutable config in place (base spec §4.3 RESET transition).
    pub fn reset_to_discovery(&mut self) {
        self.router_id = None;
        self.client_id = None;
        self.session_addr = None;
        self.missed_offer_acks = 0;
        self.missed_heartbeats = 0;
        self.missed_term_acks = 0;
        self.expected_offer_sequence = None;
        self.expected_term_ack_sequence = None;
        self.expected_update_response_sequence = None;
        self.pending_ipv4_addr = None;
        self.pending_ipv6_addr = None;
        self.neighbors.clear();
        self.state = PeerState::Discovery;
    }
}

/// Arena of peer contexts, indexed by stable integer id. The base spec
/// models this as a replacement for the original implementation's
/// linked-list peer table; this build only ever populates slot 0; the arena
/// shape is kept so a future multi-peer radio could extend it without
/// reworking callers (base spec §9 redesign note).
#[derive(Default)]
pub struct PeerStore {
    slots: Vec<Option<PeerContext>>,
}

/// Stable handle into a [`PeerStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerId(pub u32);

impl PeerStore {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub fn insert(&mut self, ctx: PeerContext) -> PeerId {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(ctx);
                return PeerId(i as u32);
            }
        }
        self.slots.push(Some(ctx));
        PeerId((self.slots.len() - 1) as u32)
    }

    pub fn get(&self, id: PeerId) -> Option<&PeerContext> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: PeerId) -> Option<&mut PeerContext> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, id: PeerId) -> Option<PeerContext> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.take())
    }

    /// Iterate live peers. In this build, at most one entry is ever live.
    pub fn iter(&self) -> impl Iterator<Item = (PeerId, &PeerContext)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|ctx| (PeerId(i as u32), ctx)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (PeerId, &mut PeerContext)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|ctx| (PeerId(i as u32), ctx)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_remove_frees_slot_for_reuse() {
        let mut store = PeerStore::new();
        let cfg = Arc::new(Config::default());
        let id = store.insert(PeerContext::new(cfg.clone()));
        assert!(store.get(id).is_some());
        store.remove(id);
        assert!(store.get(id).is_none());
        let id2 = store.insert(PeerContext::new(cfg));
        assert_eq!(id2, id, "freed slot should be reused");
    }

    #[test]
    fn sequence_wraps_but_never_repeats_zero() {
        let cfg = Arc::new(Config::default());
        let mut ctx = PeerContext::new(cfg);
        ctx.next_sequence = u16::MAX;
        assert_eq!(ctx.take_sequence(), u16::MAX);
        assert_eq!(ctx.take_sequence(), 1);
    }

    #[test]
    fn reset_clears_session_but_keeps_config() {
        let cfg = Arc::new(Config::default());
        let mut ctx = PeerContext::new(cfg);
        ctx.router_id = Some(7);
        ctx.missed_heartbeats = 2;
        ctx.reset_to_discovery();
        assert_eq!(ctx.router_id, None);
        assert_eq!(ctx.missed_heartbeats, 0);
        assert_eq!(ctx.state, PeerState::Discovery);
    }
}
