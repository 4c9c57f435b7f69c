// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware parsing and the flash request/response protocol.
//!
//! This crate supports both `no_std` + `alloc` and `std` environments:
//! - Without features: image parsing, wire types and the emulated target
//! - `std` feature (default): transports and the blocking protocol session

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod checksum;
pub mod error;
pub mod firmware;
pub mod protocol;
pub mod target;

#[cfg(feature = "std")]
pub mod session;
#[cfg(feature = "std")]
pub mod transport;

// Re-export commonly used types
pub use error::{Error, Result};
pub use firmware::{FirmwareKind, FirmwareParser, HexChecksum, ParsedFirmware, ParserConfig, Segment};
pub use protocol::{Command, CommandCode, DeviceInfo, Response, Status};
pub use protocol::{BIN_BASE_ADDR, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE};
pub use target::MemoryTarget;

#[cfg(feature = "std")]
pub use session::{flash_firmware, FlashOptions, FlashProtocol, FlashReport};
#[cfg(feature = "std")]
pub use transport::{LoopbackTransport, Transport};
