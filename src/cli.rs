// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Operator command-line surface (base spec §6, expanded in SPEC_FULL.md
//! §13). A small hand-rolled tokenizer for the interactive stdin command
//! language — distinct from the process argv flags in [`crate::main`], which
//! are parsed with `clap` since that's the concern `clap` actually covers.

use crate::wire::bytes::MacAddr;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    /// `status` — print the current peer/neighbor state.
    Status,
    /// `terminate` — operator-initiated peer termination.
    Terminate,
    /// `neighbor up <mac>` — bring up a neighbor by MAC address.
    NeighborUp(MacAddr),
    /// `neighbor down <mac>` — tear down a neighbor by MAC address.
    NeighborDown(MacAddr),
    /// `quit` / `exit` — shut the process down.
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliParseError(String);

impl fmt::Display for CliParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for CliParseError {}

/// Parse one line of operator input. Blank lines and lines starting with
/// `#` are treated as no-ops by the caller before this is reached; this
/// parser only handles the command grammar itself.
pub fn parse_line(line: &str) -> Result<CliCommand, CliParseError> {
    let mut tokens = line.split_whitespace();
    let Some(cmd) = tokens.next() else {
        return Ok(CliCommand::Status);
    };
    match cmd {
        "status" => Ok(CliCommand::Status),
        "terminate" => Ok(CliCommand::Terminate),
        "quit" | "exit" => Ok(CliCommand::Quit),
        "neighbor" => {
            let sub = tokens.next().ok_or_else(|| CliParseError("neighbor: expected 'up' or 'down'".into()))?;
            let mac_str = tokens
                .next()
                .ok_or_else(|| CliParseError("neighbor: expected a MAC address".into()))?;
            let mac: MacAddr = mac_str
                .parse()
                .map_err(|_| CliParseError(format!("neighbor: invalid MAC address {mac_str:?}")))?;
            match sub {
                "up" => Ok(CliCommand::NeighborUp(mac)),
                "down" => Ok(CliCommand::NeighborDown(mac)),
                other => Err(CliParseError(format!("neighbor: unknown subcommand {other:?}"))),
            }
        }
        other => Err(CliParseError(format!("unknown command {other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_line_is_status() {
        assert_eq!(parse_line("").unwrap(), CliCommand::Status);
        assert_eq!(parse_line("   ").unwrap(), CliCommand::Status);
    }

    #[test]
    fn neighbor_up_parses_mac() {
        let cmd = parse_line("neighbor up 01:02:03:04:05:06").unwrap();
        assert_eq!(cmd, CliCommand::NeighborUp(MacAddr([1, 2, 3, 4, 5, 6])));
    }

    #[test]
    fn neighbor_down_parses_mac() {
        let cmd = parse_line("neighbor down aa:bb:cc:dd:ee:ff").unwrap();
        assert_eq!(cmd, CliCommand::NeighborDown(MacAddr([0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff])));
    }

    #[test]
    fn neighbor_missing_mac_is_an_error() {
        assert!(parse_line("neighbor up").is_err());
    }

    #[test]
    fn unknown_command_is_an_error() {
        assert!(parse_line("frobnicate").is_err());
    }

    #[test]
    fn quit_and_exit_both_work() {
        assert_eq!(parse_line("quit").unwrap(), CliCommand::Quit);
        assert_eq!(parse_line("exit").unwrap(), CliCommand::Quit);
    }
}
