// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command-line interface definitions.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_num::maybe_hex;
use serialport::{DataBits, Parity, StopBits};

use fwflash_common::{
    DeviceInfo, FlashOptions, FlashProtocol, HexChecksum, LoopbackTransport, MemoryTarget,
    ParserConfig, Transport, BIN_BASE_ADDR, DEFAULT_CHUNK_SIZE,
};

use crate::commands;
use crate::transport::{PortConfig, SerialTransport};

/// Device identity reported by `--emulate`.
const EMULATED_DEVICE: DeviceInfo = DeviceInfo {
    chip_id: 0x4657_0001,
    flash_size: 1024 * 1024,
    ram_size: 256 * 1024,
};

/// Command-line arguments.
#[derive(Parser)]
#[command(name = "fwflash")]
#[command(about = "Flash BIN, ELF64 and Intel HEX firmware images over a serial link")]
pub struct Cli {
    /// Serial port (e.g., /dev/ttyUSB0)
    #[arg(short, long, global = true)]
    pub port: Option<String>,

    /// Talk to an in-process emulated device instead of a serial port
    #[arg(long, global = true, conflicts_with = "port")]
    pub emulate: bool,

    #[command(flatten)]
    pub serial: SerialArgs,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

/// Serial line settings.
#[derive(Args)]
pub struct SerialArgs {
    /// Baud rate
    #[arg(long, default_value_t = 115_200, global = true)]
    pub baud: u32,

    /// Data bits per character
    #[arg(long, default_value_t = 8, value_parser = clap::value_parser!(u8).range(5..=8), global = true)]
    pub data_bits: u8,

    #[arg(long, value_enum, default_value_t = ParityArg::None, global = true)]
    pub parity: ParityArg,

    /// Stop bits
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u8).range(1..=2), global = true)]
    pub stop_bits: u8,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum ParityArg {
    None,
    Odd,
    Even,
}

impl SerialArgs {
    pub fn port_config(&self) -> PortConfig {
        PortConfig {
            baud_rate: self.baud,
            data_bits: match self.data_bits {
                5 => DataBits::Five,
                6 => DataBits::Six,
                7 => DataBits::Seven,
                _ => DataBits::Eight,
            },
            parity: match self.parity {
                ParityArg::None => Parity::None,
                ParityArg::Odd => Parity::Odd,
                ParityArg::Even => Parity::Even,
            },
            stop_bits: if self.stop_bits == 2 {
                StopBits::Two
            } else {
                StopBits::One
            },
        }
    }
}

/// How firmware files are interpreted.
#[derive(Args)]
pub struct ImageArgs {
    /// Firmware file (.bin, .elf or .hex)
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Load address for raw .bin files
    #[arg(long, default_value_t = BIN_BASE_ADDR, value_parser = maybe_hex::<u64>)]
    pub base: u64,

    /// Accept Intel HEX records with bad checksums
    #[arg(long)]
    pub lenient_hex: bool,
}

impl ImageArgs {
    pub fn parser_config(&self) -> ParserConfig {
        ParserConfig {
            bin_base_address: self.base,
            hex_checksum: if self.lenient_hex {
                HexChecksum::Ignore
            } else {
                HexChecksum::Validate
            },
        }
    }
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// List available serial ports
    Ports,

    /// Parse a firmware file and print its segments
    Inspect {
        #[command(flatten)]
        image: ImageArgs,
    },

    /// Query chip id, flash size and RAM size
    Info,

    /// Erase, write and verify every segment of a firmware file
    Flash {
        #[command(flatten)]
        image: ImageArgs,

        /// Maximum bytes per WRITE command
        #[arg(short, long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Skip the CRC check after writing each segment
        #[arg(long)]
        no_verify: bool,

        /// Leave the device in flashing mode when done
        #[arg(long)]
        no_reset: bool,
    },

    /// Erase a flash region
    Erase {
        #[arg(short, long, value_parser = maybe_hex::<u32>)]
        address: u32,

        #[arg(short, long, value_parser = maybe_hex::<u32>)]
        size: u32,
    },

    /// Print the device CRC-32 of a flash region
    Verify {
        #[arg(short, long, value_parser = maybe_hex::<u32>)]
        address: u32,

        #[arg(short, long, value_parser = maybe_hex::<u32>)]
        size: u32,
    },

    /// Reboot the device
    Reset,
}

/// Open a protocol session on the serial port or the emulated device.
fn open_session(cli: &Cli) -> Result<FlashProtocol<Box<dyn Transport>>> {
    let transport: Box<dyn Transport> = if cli.emulate {
        log::info!("Using emulated device");
        let target = MemoryTarget::new(EMULATED_DEVICE, BIN_BASE_ADDR as u32);
        Box::new(LoopbackTransport::new(target))
    } else {
        let Some(port) = &cli.port else {
            bail!("No serial port given (use --port, or --emulate)");
        };
        Box::new(SerialTransport::open(port, &cli.serial.port_config())?)
    };
    Ok(FlashProtocol::new(transport)?)
}

/// Execute the parsed CLI command.
pub fn run(cli: Cli) -> Result<()> {
    let session = || open_session(&cli);

    match &cli.command {
        Commands::Ports => commands::ports(),
        Commands::Inspect { image } => commands::inspect(&image.file, &image.parser_config()),
        Commands::Info => commands::info(&mut session()?),
        Commands::Flash {
            image,
            chunk_size,
            no_verify,
            no_reset,
        } => {
            let options = FlashOptions {
                chunk_size: *chunk_size,
                verify: !no_verify,
                reset: !no_reset,
            };
            commands::flash(
                &mut session()?,
                &image.file,
                &image.parser_config(),
                &options,
            )
        }
        Commands::Erase { address, size } => commands::erase(&mut session()?, *address, *size),
        Commands::Verify { address, size } => commands::verify(&mut session()?, *address, *size),
        Commands::Reset => commands::reset(&mut session()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_hex_arguments() {
        let cli = Cli::try_parse_from([
            "fwflash", "--port", "/dev/ttyUSB0", "erase", "--address", "0x40001000", "--size",
            "4096",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Erase {
                address: 0x4000_1000,
                size: 4096
            }
        ));
    }

    #[test]
    fn test_flash_defaults() {
        let cli = Cli::try_parse_from(["fwflash", "--emulate", "flash", "app.hex"]).unwrap();
        let Commands::Flash {
            image,
            chunk_size,
            no_verify,
            no_reset,
        } = cli.command
        else {
            panic!("expected flash");
        };
        assert_eq!(chunk_size, DEFAULT_CHUNK_SIZE);
        assert!(!no_verify && !no_reset);
        assert_eq!(image.parser_config(), ParserConfig::default());
        assert_eq!(cli.serial.port_config(), PortConfig::default());
    }

    #[test]
    fn test_emulate_conflicts_with_port() {
        assert!(Cli::try_parse_from(["fwflash", "--emulate", "--port", "COM3", "info"]).is_err());
    }

    #[test]
    fn test_serial_line_settings() {
        let cli = Cli::try_parse_from([
            "fwflash", "-p", "COM3", "--data-bits", "7", "--parity", "even", "--stop-bits", "2",
            "reset",
        ])
        .unwrap();
        let config = cli.serial.port_config();
        assert_eq!(config.data_bits, DataBits::Seven);
        assert_eq!(config.parity, Parity::Even);
        assert_eq!(config.stop_bits, StopBits::Two);
        assert!(Cli::try_parse_from(["fwflash", "--data-bits", "9", "reset"]).is_err());
    }
}
