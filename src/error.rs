// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Crate-wide error types.

use std::fmt;

/// Decode-time wire-format violations (base spec §4.1 / §7).
///
/// These never propagate past the point of decode: the dispatch loop catches
/// them, discards the offending packet, and emits a debug trace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// A TLV's declared length runs past the end of the enclosing message block.
    InvalidTlvLength { code: u16, len: u16, remaining: u16 },
    /// A TLV code is required in this context but has no registered parser.
    UnknownTlvCode(u16),
    /// A message block's declared length doesn't fit inside the packet.
    InvalidMessageLength { declared: u16, remaining: usize },
    /// The 4-octet "DLEP" magic was expected but not found.
    MagicMismatch,
    /// The buffer ended before a fixed-size field could be read.
    Truncated { wanted: usize, have: usize },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTlvLength {
                code,
                len,
                remaining,
            } => write!(
                f,
                "TLV {code} declares length {len} but only {remaining} bytes remain in message block"
            ),
            Self::UnknownTlvCode(code) => write!(f, "unknown TLV code {code}"),
            Self::InvalidMessageLength { declared, remaining } => write!(
                f,
                "message block declares length {declared} but packet has {remaining} bytes remaining"
            ),
            Self::MagicMismatch => write!(f, "expected DLEP signal magic, not found"),
            Self::Truncated { wanted, have } => {
                write!(f, "buffer truncated: wanted {wanted} bytes, have {have}")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Top-level error type for the radio endpoint.
#[derive(Debug)]
pub enum DlepError {
    Io(std::io::Error),
    Config(String),
    Codec(CodecError),
    Addr(std::net::AddrParseError),
}

impl fmt::Display for DlepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Config(s) => write!(f, "configuration error: {s}"),
            Self::Codec(e) => write!(f, "codec error: {e}"),
            Self::Addr(e) => write!(f, "address parse error: {e}"),
        }
    }
}

impl std::error::Error for DlepError {}

impl From<std::io::Error> for DlepError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<CodecError> for DlepError {
    fn from(e: CodecError) -> Self {
        Self::Codec(e)
    }
}

impl From<std::net::AddrParseError> for DlepError {
    fn from(e: std::net::AddrParseError) -> Self {
        Self::Addr(e)
    }
}
