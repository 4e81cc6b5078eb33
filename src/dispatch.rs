// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Readiness-multiplexed dispatch loop (base spec §4.5, component C12).
//!
//! One [`mio::Poll`] multiplexes the UDP discovery socket, the TCP session
//! listener, the (at most one) accepted session stream, the operator CLI,
//! and the timing wheel's tick. There is exactly one thread: decode, FSM
//! transition, and timer expiry all happen on it, so a fired timer is never
//! concurrent with a message being dispatched (base spec §4.5).

use crate::cli::{self, CliCommand};
use crate::config::Config;
use crate::fsm::neighbor_fsm::{self, NeighborAction, NeighborEvent};
use crate::fsm::peer_fsm::{self, PeerAction, PeerEvent};
use crate::model::neighbor::NeighborId;
use crate::model::peer::{PeerContext, PeerState, PeerStore};
use crate::timer::{TimerKind, TimerWheel, RESOLUTION_MS};
use crate::transport::tcp::{self, FrameReader};
use crate::transport::udp::UdpTransport;
use crate::wire::decoder::decode_packet;
use crate::wire::scratch::{MessageScratchPad, PacketScratchPad};
use crate::wire::tlv::msg_code;
use mio::net::TcpListener;
use mio::{Events, Interest, Poll, Token, Waker};
use std::io::BufRead;
use std::net::{IpAddr, SocketAddr};
use std::sync::mpsc::{channel, Receiver, TryRecvError};
use std::sync::Arc;
use std::thread;

const UDP_TOKEN: Token = Token(0);
const LISTENER_TOKEN: Token = Token(1);
const SESSION_TOKEN: Token = Token(2);
const STDIN_TOKEN: Token = Token(3);

const MAX_EVENTS: usize = 64;

/// Owns every piece of live state the dispatch loop touches.
pub struct Dispatcher {
    poll: Poll,
    udp: UdpTransport,
    listener: TcpListener,
    session: Option<(mio::net::TcpStream, SocketAddr, FrameReader)>,
    stdin_rx: Receiver<String>,
    _waker: Arc<Waker>,
    peers: PeerStore,
    wheel: TimerWheel<TimerKind>,
    config: Arc<Config>,
}

impl Dispatcher {
    pub fn new(config: Arc<Config>) -> std::io::Result<Self> {
        let poll = Poll::new()?;

        let udp_addr = SocketAddr::new(
            config.local_ipv4.map(IpAddr::V4).unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
            config.local_udp_port,
        );
        let mut udp = UdpTransport::bind(udp_addr)?;
        poll.registry().register(&mut udp.socket, UDP_TOKEN, Interest::READABLE)?;

        let tcp_addr = SocketAddr::new(
            config.local_ipv4.map(IpAddr::V4).unwrap_or(IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)),
            config.local_tcp_port,
        );
        let mut listener = tcp::bind_listener(tcp_addr)?;
        poll.registry().register(&mut listener, LISTENER_TOKEN, Interest::READABLE)?;

        let waker = Arc::new(Waker::new(poll.registry(), STDIN_TOKEN)?);
        let stdin_rx = spawn_stdin_reader(Arc::clone(&waker));

        let mut peers = PeerStore::new();
        peers.insert(PeerContext::new(Arc::clone(&config)));

        Ok(Self {
            poll,
            udp,
            listener,
            session: None,
            stdin_rx,
            _waker: waker,
            peers,
            wheel: TimerWheel::new(),
            config,
        })
    }

    /// Drive the loop until the operator CLI requests shutdown or stdin closes.
    pub fn run(mut self) -> std::io::Result<()> {
        let mut events = Events::with_capacity(MAX_EVENTS);
        loop {
            if let Err(e) = self.poll.poll(&mut events, Some(std::time::Duration::from_millis(RESOLUTION_MS))) {
                if e.kind() != std::io::ErrorKind::Interrupted {
                    log::warn!("poll error: {e}");
                }
                events.clear();
            }

            for event in events.iter() {
                match event.token() {
                    UDP_TOKEN => self.handle_udp_readable(),
                    LISTENER_TOKEN => self.handle_accept(),
                    SESSION_TOKEN => self.handle_session_readable(),
                    STDIN_TOKEN => {
                        if !self.drain_stdin() {
                            return Ok(());
                        }
                    }
                    _ => {}
                }
            }

            self.tick_timers();
        }
    }

    fn handle_udp_readable(&mut self) {
        let mut buf = [0u8; 2048];
        loop {
            match self.udp.recv_from(&mut buf) {
                Ok(Some((n, from))) => self.on_udp_datagram(&buf[..n], from),
                Ok(None) => break,
                Err(e) => {
                    log::warn!("udp recv error: {e}");
                    break;
                }
            }
        }
    }

    fn on_udp_datagram(&mut self, data: &[u8], from: SocketAddr) {
        let Some((_, peer)) = self.peers.iter_mut().next() else { return };
        let mut packet = PacketScratchPad::default();
        let mut message = MessageScratchPad::default();
        let mut codes = Vec::new();
        if let Err(e) = decode_packet(data, &mut packet, &mut message, |m| codes.push(m.message_code)) {
            log::debug!("discarding malformed udp datagram from {from}: {e}");
            return;
        }
        for code in codes {
            if code == msg_code::ATT_PEER_DISCOVERY {
                let action = peer_fsm::handle_event(peer, &mut self.wheel, PeerEvent::DiscoverySignalReceived);
                self.apply_peer_action(action, Some(from));
            }
        }
    }

    fn handle_accept(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut stream, addr)) => {
                    if self.session.is_some() {
                        log::warn!("rejecting second tcp session from {addr}: one peer already active");
                        continue;
                    }
                    if let Err(e) = self.poll.registry().register(&mut stream, SESSION_TOKEN, Interest::READABLE) {
                        log::warn!("failed to register session socket: {e}");
                        continue;
                    }
                    let _ = stream.set_nodelay(true);
                    self.session = Some((stream, addr, FrameReader::new()));
                    log::info!("accepted tcp session from {addr}");
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    log::warn!("tcp accept error: {e}");
                    break;
                }
            }
        }
    }

    fn handle_session_readable(&mut self) {
        let Some((stream, addr, reader)) = self.session.as_mut() else { return };
        let addr = *addr;
        match reader.fill(stream) {
            Ok(true) => {}
            Ok(false) => {
                log::info!("tcp session from {addr} closed by peer");
                self.close_session();
                return;
            }
            Err(e) => {
                log::warn!("tcp session read error: {e}");
                self.close_session();
                return;
            }
        }
        loop {
            let frame = match self.session.as_mut().unwrap().2.next_frame() {
                Ok(Some(f)) => f,
                Ok(None) => break,
                Err(e) => {
                    log::warn!("tcp frame error from {addr}: {e}");
                    self.close_session();
                    return;
                }
            };
            self.on_session_frame(&frame, addr);
        }
    }

    fn on_session_frame(&mut self, data: &[u8], from: SocketAddr) {
        let Some((_, peer)) = self.peers.iter_mut().next() else { return };
        peer.session_addr.get_or_insert(from);
        let mut packet = PacketScratchPad::default();
        let mut message = MessageScratchPad::default();
        let mut decoded: Vec<(PacketScratchPad, MessageScratchPad)> = Vec::new();
        if let Err(e) = decode_packet(data, &mut packet, &mut message, |m| {
            decoded.push((m.packet.clone(), m.message.clone()));
        }) {
            log::debug!("discarding malformed session frame: {e}");
            return;
        }
        for (packet, message) in decoded {
            self.dispatch_session_message(packet, message);
        }
    }

    /// Populate the peer's scratch pads from the decoded message before
    /// routing it, the sole channel between decode and FSM dispatch (base
    /// spec §3 "sole decode -> handler data channel").
    fn dispatch_session_message(&mut self, packet: PacketScratchPad, message: MessageScratchPad) {
        let Some((_, peer)) = self.peers.iter_mut().next() else { return };
        let code = message.message_code;
        let mac = message.mac;
        let mac_present = message.mac_present;
        peer.packet_pad = packet;
        peer.message_pad = message;

        let event = match code {
            msg_code::PEER_INIT_REQ => Some(PeerEvent::InitRequestReceived),
            msg_code::PEER_INIT_RES => Some(PeerEvent::InitResponseReceived),
            msg_code::PEER_UPDATE_REQ => Some(PeerEvent::UpdateRequestReceived),
            msg_code::PEER_UPDATE_RES => Some(PeerEvent::UpdateResponseReceived),
            msg_code::PEER_TERM_REQ => Some(PeerEvent::TermRequestReceived),
            msg_code::PEER_TERM_RES => Some(PeerEvent::TermResponseReceived),
            msg_code::PEER_HEARTBEAT => Some(PeerEvent::HeartbeatReceived),
            _ => None,
        };
        if let Some(event) = event {
            let action = peer_fsm::handle_event(peer, &mut self.wheel, event);
            self.apply_peer_action(action, None);
            return;
        }

        if !mac_present {
            return;
        }
        let Some(id) = peer.neighbors.find_by_mac(mac) else { return };
        let neighbor_state = peer.neighbors.get(id).expect("just looked up").state;
        let neighbor_event = match code {
            msg_code::NEIGHBOR_UP_RES => {
                if neighbor_state == crate::model::neighbor::NeighborState::Update {
                    Some(NeighborEvent::UpdateAckReceived)
                } else {
                    Some(NeighborEvent::UpResponseReceived)
                }
            }
            msg_code::NEIGHBOR_DOWN_REQ => Some(NeighborEvent::DownRequestReceived),
            msg_code::NEIGHBOR_DOWN_RES => Some(NeighborEvent::DownResponseReceived),
            msg_code::NEIGHBOR_ADDRESS_RES => Some(NeighborEvent::AddressResponseReceived),
            msg_code::LINK_CHAR_REQ => Some(NeighborEvent::LinkCharRequestReceived),
            _ => None,
        };
        if let Some(event) = neighbor_event {
            let action = neighbor_fsm::handle_event(peer, id, &mut self.wheel, event);
            self.apply_neighbor_action(id, action);
        }
    }

    fn apply_peer_action(&mut self, action: PeerAction, udp_dest: Option<SocketAddr>) {
        match action {
            PeerAction::SendUdp(bytes) => {
                let dest = udp_dest.or_else(|| {
                    self.config
                        .router_ipv4
                        .map(|a| SocketAddr::new(IpAddr::V4(a), self.config.router_udp_port))
                });
                if let Some(dest) = dest {
                    if let Err(e) = self.udp.send_to(&bytes, dest) {
                        log::warn!("udp send error: {e}");
                    }
                }
            }
            PeerAction::SendTcp(bytes) => self.write_session(&bytes),
            PeerAction::CloseSession => self.close_session(),
            PeerAction::None => {}
        }
    }

    fn apply_neighbor_action(&mut self, id: NeighborId, action: NeighborAction) {
        match action {
            NeighborAction::SendTcp(bytes) => self.write_session(&bytes),
            NeighborAction::SendTcpThenRemove(bytes) => {
                self.write_session(&bytes);
                if let Some((_, peer)) = self.peers.iter_mut().next() {
                    peer.neighbors.remove(id);
                }
            }
            NeighborAction::RemoveNeighbor => {
                if let Some((_, peer)) = self.peers.iter_mut().next() {
                    peer.neighbors.remove(id);
                }
            }
            NeighborAction::None => {}
        }
    }

    fn write_session(&mut self, bytes: &[u8]) {
        if let Some((stream, addr, _)) = self.session.as_mut() {
            if let Err(e) = tcp::write_frame(stream, bytes) {
                log::warn!("tcp write error to {addr}: {e}");
                self.close_session();
            }
        }
    }

    fn close_session(&mut self) {
        if let Some((mut stream, _, _)) = self.session.take() {
            let _ = self.poll.registry().deregister(&mut stream);
        }
    }

    fn tick_timers(&mut self) {
        let fired = self.wheel.tick();
        for kind in fired {
            self.handle_timer(kind);
        }
    }

    fn handle_timer(&mut self, kind: TimerKind) {
        let Some((_, peer)) = self.peers.iter_mut().next() else { return };
        match kind {
            TimerKind::PeerOffer => {
                let action = peer_fsm::handle_event(peer, &mut self.wheel, PeerEvent::OfferTimerFired);
                self.apply_peer_action(action, None);
            }
            TimerKind::PeerHeartbeat => {
                let action = peer_fsm::handle_event(peer, &mut self.wheel, PeerEvent::HeartbeatTimerFired);
                self.apply_peer_action(action, None);
            }
            TimerKind::PeerTermAck => {
                let action = peer_fsm::handle_event(peer, &mut self.wheel, PeerEvent::TermAckTimerFired);
                self.apply_peer_action(action, None);
            }
            TimerKind::NeighborInitAck(id) => {
                let action = neighbor_fsm::handle_event(peer, NeighborId(id), &mut self.wheel, NeighborEvent::UpAckTimerFired);
                self.apply_neighbor_action(NeighborId(id), action);
            }
            TimerKind::NeighborUpdateAck(id) => {
                let action =
                    neighbor_fsm::handle_event(peer, NeighborId(id), &mut self.wheel, NeighborEvent::UpdateAckTimerFired);
                self.apply_neighbor_action(NeighborId(id), action);
            }
            TimerKind::NeighborUpdateInterval(id) => {
                let action = neighbor_fsm::handle_event(
                    peer,
                    NeighborId(id),
                    &mut self.wheel,
                    NeighborEvent::UpdateIntervalTimerFired,
                );
                self.apply_neighbor_action(NeighborId(id), action);
            }
            TimerKind::NeighborTermAck(id) => {
                let action = neighbor_fsm::handle_event(peer, NeighborId(id), &mut self.wheel, NeighborEvent::DownAckTimerFired);
                self.apply_neighbor_action(NeighborId(id), action);
            }
        }
    }

    /// Drain every pending CLI line. Returns `false` if the operator asked
    /// to quit.
    fn drain_stdin(&mut self) -> bool {
        loop {
            match self.stdin_rx.try_recv() {
                Ok(line) => {
                    if !self.run_cli_line(&line) {
                        return false;
                    }
                }
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Disconnected) => return false,
            }
        }
    }

    fn run_cli_line(&mut self, line: &str) -> bool {
        match cli::parse_line(line) {
            Ok(CliCommand::Quit) => false,
            Ok(CliCommand::Status) => {
                if let Some((_, peer)) = self.peers.iter().next() {
                    println!("peer state: {:?}, neighbors: {}", peer.state, peer.neighbors.len());
                }
                true
            }
            Ok(CliCommand::Terminate) => {
                if let Some((_, peer)) = self.peers.iter_mut().next() {
                    if peer.state == PeerState::InSession {
                        let action = peer_fsm::handle_event(peer, &mut self.wheel, PeerEvent::OperatorTerminateRequested);
                        self.apply_peer_action(action, None);
                    }
                }
                true
            }
            Ok(CliCommand::NeighborUp(mac)) => {
                if let Some((_, peer)) = self.peers.iter_mut().next() {
                    let id = peer.neighbors.insert(crate::model::neighbor::NeighborContext::new(mac));
                    let action = neighbor_fsm::handle_event(peer, id, &mut self.wheel, NeighborEvent::UpRequested);
                    self.apply_neighbor_action(id, action);
                }
                true
            }
            Ok(CliCommand::NeighborDown(mac)) => {
                if let Some((_, peer)) = self.peers.iter_mut().next() {
                    if let Some(id) = peer.neighbors.find_by_mac(mac) {
                        let action = neighbor_fsm::handle_event(peer, id, &mut self.wheel, NeighborEvent::DownRequested);
                        self.apply_neighbor_action(id, action);
                    }
                }
                true
            }
            Err(e) => {
                println!("error: {e}");
                true
            }
        }
    }
}

fn spawn_stdin_reader(waker: Arc<Waker>) -> Receiver<String> {
    let (tx, rx) = channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        let mut handle = stdin.lock();
        loop {
            line.clear();
            match handle.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    let trimmed = line.trim_end().to_string();
                    if tx.send(trimmed).is_err() {
                        break;
                    }
                    if waker.wake().is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
        let _ = waker.wake();
    });
    rx
}
