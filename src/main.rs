// SPDX-License-Identifier: Apache-2.0 OR MIT

//! DLEP radio-side endpoint.
//!
//! ```bash
//! # Run with defaults (port 854, no config file)
//! dlep-radio
//!
//! # Load a config file and enable TLV/build/FSM tracing
//! dlep-radio -f /etc/dlep-radio.conf -d 0x7 -v
//! ```

use clap::Parser;
use dlep_radio::config::Config;
use dlep_radio::dispatch::Dispatcher;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "dlep-radio")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Debug bitmask, hex (e.g. 0x7 for DBG_TLV|DBG_BUILD|DBG_FSM)
    #[arg(short = 'd', long, default_value = "0")]
    debug_flags: String,

    /// Config file (line-oriented `key = value` text)
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Increase log verbosity (info -> debug -> trace)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> ExitCode {
    let args = Args::parse();

    let level = match args.verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    dlep_radio::logging::init(level);
    dlep_radio::logging::set_debug_flags(dlep_radio::logging::parse_debug_flags(&args.debug_flags));

    let config = match &args.config {
        Some(path) => Config::from_file(path),
        None => Config::default().validate().map(|()| Config::default()),
    };
    let config = match config {
        Ok(c) => c,
        Err(e) => {
            log::error!("configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    log::info!(
        "dlep-radio v{} starting, udp={} tcp={}",
        env!("CARGO_PKG_VERSION"),
        config.local_udp_port,
        config.local_tcp_port
    );

    let dispatcher = match Dispatcher::new(Arc::new(config)) {
        Ok(d) => d,
        Err(e) => {
            log::error!("failed to initialize dispatcher: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = dispatcher.run() {
        log::error!("dispatch loop exited with error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
