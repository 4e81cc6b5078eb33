// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Radio-side endpoint of the Dynamic Link Exchange Protocol (DLEP).
//!
//! The binary entry point lives in `main.rs`; this crate root exists so the
//! wire codec, FSMs, and timer wheel can be exercised directly from
//! integration tests under `tests/`.

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod fsm;
#[cfg(feature = "fuzz")]
pub mod fuzz;
pub mod logging;
pub mod model;
pub mod timer;
pub mod transport;
pub mod wire;

pub use config::Config;
pub use dispatch::Dispatcher;
pub use error::DlepError;
