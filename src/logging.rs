// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Logging initialization and the runtime debug-flags bitmask.
//!
//! Everyday logging goes through the `log` facade (`log::{trace,debug,info,
//! warn,error}!`), initialized once from `main` via [`init`]. The `-d <hex>`
//! CLI flag additionally sets a bitmask consulted by [`trace_wire!`] for
//! packet/TLV-level dumps that are too noisy to want on by default even at
//! `trace` level.

use std::sync::atomic::{AtomicU32, Ordering};

/// Dump every TLV as it is decoded.
pub const DBG_TLV: u32 = 1 << 0;
/// Dump every outbound message as it is built.
pub const DBG_BUILD: u32 = 1 << 1;
/// Trace every FSM transition (peer and neighbor).
pub const DBG_FSM: u32 = 1 << 2;
/// Trace every timer arm/stop/fire.
pub const DBG_TIMER: u32 = 1 << 3;

static DEBUG_FLAGS: AtomicU32 = AtomicU32::new(0);

/// Parse a `-d` hex argument (with or without a leading `0x`) into a bitmask.
pub fn parse_debug_flags(arg: &str) -> u32 {
    let trimmed = arg.trim_start_matches("0x").trim_start_matches("0X");
    u32::from_str_radix(trimmed, 16).unwrap_or(0)
}

/// Install the process-wide debug-flags bitmask (called once from `main`).
pub fn set_debug_flags(flags: u32) {
    DEBUG_FLAGS.store(flags, Ordering::Relaxed);
}

/// Check whether a given debug flag is currently enabled.
pub fn flag_enabled(flag: u32) -> bool {
    DEBUG_FLAGS.load(Ordering::Relaxed) & flag != 0
}

/// Initialize the `log` backend. Honors `RUST_LOG` if set, otherwise falls
/// back to `level`.
pub fn init(level: log::LevelFilter) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    if std::env::var("RUST_LOG").is_ok() {
        builder.parse_env("RUST_LOG");
    }
    let _ = builder.try_init();
}

/// Trace a wire-level event, gated on a debug flag rather than just the
/// global log level — these are verbose enough that `trace` level alone
/// would drown out everything else.
#[macro_export]
macro_rules! trace_wire {
    ($flag:expr, $($arg:tt)*) => {
        if $crate::logging::flag_enabled($flag) {
            log::trace!($($arg)*);
        }
    };
}
