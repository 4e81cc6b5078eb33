// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Configuration (base spec §6, expanded in SPEC_FULL.md §12).
//!
//! A line-oriented `key = value` text file, in the manner the base spec's
//! external config loader consumes. Parsing and validation follow the same
//! shape as the teacher's `ServerConfig` (explicit `validate()`, explicit
//! `Default`), adapted to a plain-text format instead of JSON since that is
//! what base spec §6 names.

use crate::error::DlepError;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::time::Duration;

/// Immutable radio-endpoint configuration (base spec §3 "link to immutable
/// configuration").
#[derive(Debug, Clone)]
pub struct Config {
    pub local_udp_port: u16,
    pub router_udp_port: u16,
    pub local_tcp_port: u16,
    pub router_tcp_port: u16,

    pub local_ipv4: Option<Ipv4Addr>,
    pub router_ipv4: Option<Ipv4Addr>,
    pub local_ipv6: Option<Ipv6Addr>,
    pub router_ipv6: Option<Ipv6Addr>,

    pub local_peer_type: String,

    pub heartbeat_interval_secs: u32,
    pub heartbeat_missed_threshold: u32,
    pub peer_offer_interval_secs: u32,
    pub peer_term_ack_timeout_secs: u32,
    pub peer_term_missed_threshold: u32,
    pub neighbor_up_ack_timeout_secs: u32,
    pub neighbor_up_missed_threshold: u32,
    pub neighbor_update_interval_ms: u32,
    pub neighbor_down_ack_timeout_secs: u32,
    pub neighbor_down_missed_threshold: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            local_udp_port: 854,
            router_udp_port: 854,
            local_tcp_port: 854,
            router_tcp_port: 854,
            local_ipv4: None,
            router_ipv4: None,
            local_ipv6: None,
            router_ipv6: None,
            local_peer_type: "dlep-radio".to_string(),
            heartbeat_interval_secs: 5,
            heartbeat_missed_threshold: 3,
            peer_offer_interval_secs: 60,
            peer_term_ack_timeout_secs: 5,
            peer_term_missed_threshold: 3,
            neighbor_up_ack_timeout_secs: 5,
            neighbor_up_missed_threshold: 3,
            neighbor_update_interval_ms: 1000,
            neighbor_down_ack_timeout_secs: 5,
            neighbor_down_missed_threshold: 3,
        }
    }
}

impl Config {
    /// Load a `key = value` config file. Unknown keys are ignored (forward
    /// compatible, matching the TLV decoder's treatment of unknown codes);
    /// missing keys fall back to [`Config::default`].
    pub fn from_file(path: &Path) -> Result<Self, DlepError> {
        let content = std::fs::read_to_string(path)?;
        let mut cfg = Self::default();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(DlepError::Config(format!(
                    "line {}: expected 'key = value', got {line:?}",
                    lineno + 1
                )));
            };
            let key = key.trim();
            let value = value.trim();
            cfg.apply(key, value)
                .map_err(|e| DlepError::Config(format!("line {}: {e}", lineno + 1)))?;
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply(&mut self, key: &str, value: &str) -> Result<(), String> {
        macro_rules! parse {
            ($field:expr) => {
                value.parse().map_err(|_| format!("invalid value for {key}: {value:?}"))?
            };
        }
        match key {
            "local_udp_port" => self.local_udp_port = parse!(u16),
            "router_udp_port" => self.router_udp_port = parse!(u16),
            "local_tcp_port" => self.local_tcp_port = parse!(u16),
            "router_tcp_port" => self.router_tcp_port = parse!(u16),
            "local_ipv4" => self.local_ipv4 = Some(parse!(Ipv4Addr)),
            "router_ipv4" => self.router_ipv4 = Some(parse!(Ipv4Addr)),
            "local_ipv6" => self.local_ipv6 = Some(parse!(Ipv6Addr)),
            "router_ipv6" => self.router_ipv6 = Some(parse!(Ipv6Addr)),
            "local_peer_type" => self.local_peer_type = value.to_string(),
            "heartbeat_interval_secs" => self.heartbeat_interval_secs = parse!(u32),
            "heartbeat_missed_threshold" => self.heartbeat_missed_threshold = parse!(u32),
            "peer_offer_interval_secs" => self.peer_offer_interval_secs = parse!(u32),
            "peer_term_ack_timeout_secs" => self.peer_term_ack_timeout_secs = parse!(u32),
            "peer_term_missed_threshold" => self.peer_term_missed_threshold = parse!(u32),
            "neighbor_up_ack_timeout_secs" => self.neighbor_up_ack_timeout_secs = parse!(u32),
            "neighbor_up_missed_threshold" => self.neighbor_up_missed_threshold = parse!(u32),
            "neighbor_update_interval_ms" => self.neighbor_update_interval_ms = parse!(u32),
            "neighbor_down_ack_timeout_secs" => self.neighbor_down_ack_timeout_secs = parse!(u32),
            "neighbor_down_missed_threshold" => self.neighbor_down_missed_threshold = parse!(u32),
            _ => {
                log::debug!("ignoring unknown config key {key:?}");
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), DlepError> {
        if self.local_udp_port == 0 || self.local_tcp_port == 0 {
            return Err(DlepError::Config("local ports cannot be 0".into()));
        }
        if self.local_peer_type.as_bytes().len() > crate::wire::tlv::PEER_TYPE_MAX_LEN {
            return Err(DlepError::Config(format!(
                "local_peer_type exceeds {} octets",
                crate::wire::tlv::PEER_TYPE_MAX_LEN
            )));
        }
        if self.heartbeat_missed_threshold == 0
            || self.peer_term_missed_threshold == 0
            || self.neighbor_up_missed_threshold == 0
            || self.neighbor_down_missed_threshold == 0
        {
            return Err(DlepError::Config("missed-ack thresholds must be >= 1".into()));
        }
        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs as u64)
    }

    pub fn neighbor_update_interval(&self) -> Duration {
        Duration::from_millis(self.neighbor_update_interval_ms as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn from_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dlep.conf");
        std::fs::write(
            &path,
            "local_udp_port = 854\nrouter_udp_port = 854\nheartbeat_interval_secs = 5\n# comment\n\nlocal_peer_type = radio-1\n",
        )
        .unwrap();
        let cfg = Config::from_file(&path).unwrap();
        assert_eq!(cfg.local_udp_port, 854);
        assert_eq!(cfg.local_peer_type, "radio-1");
    }

    #[test]
    fn rejects_local_port_zero() {
        let mut cfg = Config::default();
        cfg.local_udp_port = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_peer_type_over_160() {
        let mut cfg = Config::default();
        cfg.local_peer_type = "x".repeat(161);
        assert!(cfg.validate().is_err());
    }
}
