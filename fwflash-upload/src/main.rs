// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware flashing tool for BIN, ELF64 and Intel HEX images.
//!
//! Usage:
//!   fwflash inspect firmware.hex
//!   fwflash --port /dev/ttyUSB0 info
//!   fwflash --port /dev/ttyUSB0 flash firmware.elf
//!   fwflash --emulate flash firmware.bin

mod cli;
mod commands;
mod transport;

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let args = cli::Cli::parse();

    // RUST_LOG still wins over -v
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    cli::run(args)
}
