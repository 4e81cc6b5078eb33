// SPDX-License-Identifier: Apache-2.0 OR MIT

//! UDP transport for Peer Discovery / Peer Offer signals (base spec §4.1,
//! component C11). Unicast only — the base spec's distillation of the
//! discovery phase names configured local/router addresses rather than a
//! multicast group, so this does not join one.

use mio::net::UdpSocket as MioUdpSocket;
use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};

/// A bound, non-blocking UDP socket ready for [`mio`] registration.
pub struct UdpTransport {
    pub socket: MioUdpSocket,
}

impl UdpTransport {
    /// Bind to `local_addr` with `SO_REUSEADDR` set, matching the discovery
    /// socket's need to survive quick radio restarts without waiting out a
    /// TIME_WAIT-like hold on the port.
    pub fn bind(local_addr: SocketAddr) -> std::io::Result<Self> {
        let domain = if local_addr.is_ipv6() { Domain::IPV6 } else { Domain::IPV4 };
        let sock = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP))?;
        sock.set_reuse_address(true)?;
        sock.set_nonblocking(true)?;
        sock.bind(&local_addr.into())?;
        let std_socket: UdpSocket = sock.into();
        let socket = MioUdpSocket::from_std(std_socket);
        log::debug!("udp transport bound to {local_addr}");
        Ok(Self { socket })
    }

    pub fn send_to(&self, buf: &[u8], dest: SocketAddr) -> std::io::Result<usize> {
        crate::trace_wire!(crate::logging::DBG_BUILD, "udp send {} bytes to {dest}", buf.len());
        self.socket.send_to(buf, dest)
    }

    /// Receive one datagram. Returns `Ok(None)` on `WouldBlock`, matching the
    /// readiness-driven dispatch loop's expectation that a spurious wakeup
    /// does not need special-casing.
    pub fn recv_from(&self, buf: &mut [u8]) -> std::io::Result<Option<(usize, SocketAddr)>> {
        match self.socket.recv_from(buf) {
            Ok((n, addr)) => Ok(Some((n, addr))),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }
}
