// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Neighbor context and store (base spec §3 Data Model, §4.4 Neighbor FSM).

use crate::model::peer::PendingAddr;
use crate::timer::TimerCell;
use crate::wire::bytes::MacAddr;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Neighbor FSM states (base spec §4.4): `INITIALIZING -> UPDATE -> TERMINATING`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NeighborState {
    Initializing,
    Update,
    Terminating,
}

/// One destination reachable over the radio link (base spec §3, per-MAC
/// neighbor). Owned directly by the peer's [`NeighborStore`] rather than
/// linked from a global table, since a neighbor cannot outlive its peer.
pub struct NeighborContext {
    pub mac: MacAddr,

    pub ipv4: Option<Ipv4Addr>,
    pub ipv6: Option<Ipv6Addr>,
    pub ipv4_subnet: Option<(Ipv4Addr, u8)>,
    pub ipv6_subnet: Option<(Ipv6Addr, u8)>,
    pub pending_ipv4_addr: Option<PendingAddr<Ipv4Addr>>,
    pub pending_ipv6_addr: Option<PendingAddr<Ipv6Addr>>,

    pub mdr_tx: Option<u64>,
    pub mdr_rx: Option<u64>,
    pub cdr_tx: Option<u64>,
    pub cdr_rx: Option<u64>,
    pub latency: Option<u64>,
    pub resources: Option<u8>,
    pub rlq_tx: Option<u8>,
    pub rlq_rx: Option<u8>,
    pub mtu: Option<u16>,

    /// Credit window fields (base spec credit-window TLVs); `None` until a
    /// Credit Window Status TLV is seen, matching the codec's
    /// present/absent distinction for zero-valued fields.
    pub max_red_window: Option<u16>,
    pub remaining_red_window: Option<u16>,
    pub credit_grant_req: Option<u16>,
    pub credit_not_supported: bool,

    /// Status last latched from a neighbor update ack that carried a bare
    /// status TLV (base spec §4.4 `neighbor_update_ack`).
    pub status_code: Option<u8>,

    pub next_sequence: u16,
    pub missed_up_acks: u32,
    pub missed_update_acks: u32,
    pub missed_down_acks: u32,

    /// Expected-sequence fields correlating an outstanding request with its
    /// eventual response (base spec §7 "Unexpected sequence" error class).
    /// No entry for Link Characteristics Request: this endpoint only ever
    /// answers that message, never sends it.
    pub expected_init_ack_sequence: Option<u16>,
    pub expected_update_ack_sequence: Option<u16>,
    pub expected_address_response_sequence: Option<u16>,
    pub expected_term_ack_sequence: Option<u16>,

    pub state: NeighborState,

    pub init_ack_timer: TimerCell,
    pub update_ack_timer: TimerCell,
    pub update_interval_timer: TimerCell,
    pub term_ack_timer: TimerCell,
}

impl NeighborContext {
    pub fn new(mac: MacAddr) -> Self {
        Self {
            mac,
            ipv4: None,
            ipv6: None,
            ipv4_subnet: None,
            ipv6_subnet: None,
            pending_ipv4_addr: None,
            pending_ipv6_addr: None,
            mdr_tx: None,
            mdr_rx: None,
            cdr_tx: None,
            cdr_rx: None,
            latency: None,
            resources: None,
            rlq_tx: None,
            rlq_rx: None,
            mtu: None,
            max_red_window: None,
            remaining_red_window: None,
            credit_grant_req: None,
            credit_not_supported: false,
            status_code: None,
            next_sequence: 0,
            missed_up_acks: 0,
            missed_update_acks: 0,
            missed_down_acks: 0,
            expected_init_ack_sequence: None,
            expected_update_ack_sequence: None,
            expected_address_response_sequence: None,
            expected_term_ack_sequence: None,
            state: NeighborState::Initializing,
            init_ack_timer: TimerCell::default(),
            update_ack_timer: TimerCell::default(),
            update_interval_timer: TimerCell::default(),
            term_ack_timer: TimerCell::default(),
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
}

/// Stable handle into a [`NeighborStore`], reused by [`crate::timer::TimerKind`]
/// variants to identify which neighbor a fired timer belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NeighborId(pub u32);

/// Per-peer arena of neighbor contexts, keyed by stable integer id and
/// enforcing MAC uniqueness (base spec §4.4 "per-MAC-neighbor").
#[derive(Default)]
pub struct NeighborStore {
    slots: Vec<Option<NeighborContext>>,
}

impl NeighborStore {
    pub fn new() -> Self {
        Self { slots: Vec::new() }
    }

    /// Look up a neighbor by MAC address, the key the wire protocol itself
    /// uses to name a neighbor.
    pub fn find_by_mac(&self, mac: MacAddr) -> Option<NeighborId> {
        self.slots.iter().enumerate().find_map(|(i, s)| match s {
            Some(ctx) if ctx.mac == mac => Some(NeighborId(i as u32)),
            _ => None,
        })
    }

    pub fn insert(&mut self, ctx: NeighborContext) -> NeighborId {
        debug_assert!(
            self.find_by_mac(ctx.mac).is_none(),
            "duplicate neighbor MAC {}",
            ctx.mac
        );
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(ctx);
                return NeighborId(i as u32);
            }
        }
        self.slots.push(Some(ctx));
        NeighborId((self.slots.len() - 1) as u32)
    }

    pub fn get(&self, id: NeighborId) -> Option<&NeighborContext> {
        self.slots.get(id.0 as usize).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: NeighborId) -> Option<&mut NeighborContext> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.as_mut())
    }

    pub fn remove(&mut self, id: NeighborId) -> Option<NeighborContext> {
        self.slots.get_mut(id.0 as usize).and_then(|s| s.take())
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (NeighborId, &NeighborContext)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|ctx| (NeighborId(i as u32), ctx)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (NeighborId, &mut NeighborContext)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| s.as_mut().map(|ctx| (NeighborId(i as u32), ctx)))
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_by_mac_roundtrip() {
        let mut store = NeighborStore::new();
        let mac = MacAddr([1, 2, 3, 4, 5, 6]);
        let id = store.insert(NeighborContext::new(mac));
        assert_eq!(store.find_by_mac(mac), Some(id));
        assert_eq!(store.find_by_mac(MacAddr::ZERO), None);
    }

    #[test]
    fn remove_then_reuses_slot() {
        let mut store = NeighborStore::new();
        let mac_a = MacAddr([1, 0, 0, 0, 0, 0]);
        let mac_b = MacAddr([2, 0, 0, 0, 0, 0]);
        let id_a = store.insert(NeighborContext::new(mac_a));
        store.remove(id_a);
        let id_b = store.insert(NeighborContext::new(mac_b));
        assert_eq!(id_a, id_b);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn clear_empties_store() {
        let mut store = NeighborStore::new();
        store.insert(NeighborContext::new(MacAddr([9, 9, 9, 9, 9, 9])));
        store.clear();
        assert!(store.is_empty());
    }
}
