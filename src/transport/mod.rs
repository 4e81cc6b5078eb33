// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Transport bindings (base spec §4.1, component C11): UDP for discovery
//! signals, TCP for the session phase.

pub mod tcp;
pub mod udp;

pub use tcp::FrameReader;
pub use udp::UdpTransport;
