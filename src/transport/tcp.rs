// SPDX-License-Identifier: Apache-2.0 OR MIT

//! TCP transport for the session-phase message exchange (base spec §4.1,
//! component C11).
//!
//! TCP is a stream protocol without message boundaries, but the base spec's
//! wire format only self-delimits within a packet (each message block
//! carries its own length) and relies on UDP's datagram boundaries between
//! packets. Over a stream transport that boundary has to be made explicit,
//! so each packet written to the session socket is wrapped in a 4-octet
//! big-endian length prefix — a framing concern the DLEP TLV codec itself
//! has no opinion about, resolved the way the teacher's TCP transport
//! frames its own otherwise-unframed wire format.

use mio::net::{TcpListener, TcpStream};
use std::io::{self, ErrorKind, Read, Write};
use std::net::SocketAddr;

pub const FRAME_HEADER_SIZE: usize = 4;
/// A session message is a handful of TLVs; this is generous headroom against
/// a corrupt or hostile length prefix, not a protocol limit.
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

pub fn bind_listener(local_addr: SocketAddr) -> io::Result<TcpListener> {
    let listener = TcpListener::bind(local_addr)?;
    log::debug!("tcp listener bound to {local_addr}");
    Ok(listener)
}

/// Prefix a packet with its 4-octet big-endian length.
pub fn encode_frame(payload: &[u8]) -> Vec<u8> {
    let mut framed = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    framed.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    framed.extend_from_slice(payload);
    framed
}

/// Incrementally reassembles length-prefixed frames out of a non-blocking
/// TCP stream's readable bytes.
#[derive(Default)]
pub struct FrameReader {
    buf: Vec<u8>,
}

impl FrameReader {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Pull everything currently readable from `stream` into the internal
    /// buffer. Returns `Ok(false)` on a clean peer-initiated close.
    pub fn fill(&mut self, stream: &mut TcpStream) -> io::Result<bool> {
        let mut tmp = [0u8; 4096];
        loop {
            match stream.read(&mut tmp) {
                Ok(0) => return Ok(false),
                Ok(n) => self.buf.extend_from_slice(&tmp[..n]),
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
    }

    /// Pop one fully-received frame's payload, if the buffer holds one.
    pub fn next_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        if self.buf.len() < FRAME_HEADER_SIZE {
            return Ok(None);
        }
        let len = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]) as usize;
        if len > MAX_FRAME_SIZE {
            return Err(io::Error::new(ErrorKind::InvalidData, format!("frame length {len} exceeds {MAX_FRAME_SIZE}")));
        }
        if self.buf.len() < FRAME_HEADER_SIZE + len {
            return Ok(None);
        }
        let payload = self.buf[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + len].to_vec();
        self.buf.drain(..FRAME_HEADER_SIZE + len);
        Ok(Some(payload))
    }
}

/// Write a framed packet, looping past `WouldBlock` and short writes. Good
/// enough for the low message rate and small payloads this protocol moves;
/// a saturated outbound socket is not a case the base spec asks us to cover.
pub fn write_frame(stream: &mut TcpStream, payload: &[u8]) -> io::Result<()> {
    let framed = encode_frame(payload);
    let mut written = 0;
    while written < framed.len() {
        match stream.write(&framed[written..]) {
            Ok(0) => return Err(io::Error::new(ErrorKind::WriteZero, "tcp write returned 0")),
            Ok(n) => written += n,
            Err(e) if e.kind() == ErrorKind::WouldBlock => continue,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_reader_reassembles_split_writes() {
        let mut reader = FrameReader::new();
        let payload = b"hello dlep".to_vec();
        let framed = encode_frame(&payload);
        reader.buf.extend_from_slice(&framed[..3]);
        assert!(reader.next_frame().unwrap().is_none());
        reader.buf.extend_from_slice(&framed[3..]);
        assert_eq!(reader.next_frame().unwrap(), Some(payload));
    }

    #[test]
    fn oversized_frame_length_is_rejected() {
        let mut reader = FrameReader::new();
        reader.buf.extend_from_slice(&((MAX_FRAME_SIZE as u32) + 1).to_be_bytes());
        assert!(reader.next_frame().is_err());
    }

    #[test]
    fn two_frames_back_to_back_both_pop() {
        let mut reader = FrameReader::new();
        reader.buf.extend_from_slice(&encode_frame(b"one"));
        reader.buf.extend_from_slice(&encode_frame(b"two"));
        assert_eq!(reader.next_frame().unwrap(), Some(b"one".to_vec()));
        assert_eq!(reader.next_frame().unwrap(), Some(b"two".to_vec()));
    }
}
