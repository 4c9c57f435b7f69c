// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Firmware image parsing.
//!
//! BIN, ELF64 and Intel HEX inputs are all reduced to the same model: an
//! ordered list of `(address, bytes)` segments plus a CRC-32 of the whole
//! input file.

use alloc::borrow::ToOwned;
use alloc::vec::Vec;
use core::fmt;

use crate::checksum::crc32;
use crate::error::{Error, Result};
use crate::protocol::BIN_BASE_ADDR;

pub mod elf;
pub mod ihex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareKind {
    Bin,
    Elf,
    Hex,
}

impl FirmwareKind {
    /// Detect the format from the file extension (case-insensitive).
    pub fn from_filename(filename: &str) -> Result<Self> {
        let ext = filename.rsplit('.').next().unwrap_or_default();
        if ext.eq_ignore_ascii_case("bin") {
            Ok(FirmwareKind::Bin)
        } else if ext.eq_ignore_ascii_case("elf") {
            Ok(FirmwareKind::Elf)
        } else if ext.eq_ignore_ascii_case("hex") {
            Ok(FirmwareKind::Hex)
        } else {
            Err(Error::UnsupportedFormat(alloc::format!(
                "unknown file type '{}'",
                ext
            )))
        }
    }
}

impl fmt::Display for FirmwareKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FirmwareKind::Bin => "bin",
            FirmwareKind::Elf => "elf",
            FirmwareKind::Hex => "hex",
        })
    }
}

/// A contiguous run of bytes destined for absolute `address`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub address: u64,
    pub data: Vec<u8>,
}

impl Segment {
    pub fn new(address: u64, data: Vec<u8>) -> Self {
        Self { address, data }
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    /// First address past the segment, clamped to `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.address.saturating_add(self.data.len() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFirmware {
    pub kind: FirmwareKind,
    /// Sum of segment sizes
    pub total_size: usize,
    /// CRC-32 of the whole input buffer, not just the segments
    pub checksum: u32,
    pub segments: Vec<Segment>,
}

impl ParsedFirmware {
    fn new(kind: FirmwareKind, buffer: &[u8], segments: Vec<Segment>) -> Self {
        Self {
            kind,
            total_size: segments.iter().map(Segment::size).sum(),
            checksum: crc32(buffer),
            segments,
        }
    }
}

/// How Intel HEX record checksums are treated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HexChecksum {
    /// Reject records whose checksum byte does not match
    #[default]
    Validate,
    /// Accept records regardless of their checksum byte
    Ignore,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParserConfig {
    /// Load address for raw binaries
    pub bin_base_address: u64,
    pub hex_checksum: HexChecksum,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            bin_base_address: BIN_BASE_ADDR,
            hex_checksum: HexChecksum::default(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FirmwareParser {
    config: ParserConfig,
}

impl FirmwareParser {
    pub fn new(config: ParserConfig) -> Self {
        Self { config }
    }

    /// Parse `buffer`, picking the format from `filename`'s extension.
    pub fn parse(&self, buffer: &[u8], filename: &str) -> Result<ParsedFirmware> {
        self.parse_as(FirmwareKind::from_filename(filename)?, buffer)
    }

    pub fn parse_as(&self, kind: FirmwareKind, buffer: &[u8]) -> Result<ParsedFirmware> {
        let segments = match kind {
            FirmwareKind::Bin => {
                alloc::vec![Segment::new(self.config.bin_base_address, buffer.to_owned())]
            }
            FirmwareKind::Elf => elf::load_segments(buffer)?,
            FirmwareKind::Hex => ihex::load_segments(buffer, self.config.hex_checksum)?,
        };
        let parsed = ParsedFirmware::new(kind, buffer, segments);
        log::debug!(
            "parsed {} image: {} segment(s), {} bytes, crc32 {:08X}",
            parsed.kind,
            parsed.segments.len(),
            parsed.total_size,
            parsed.checksum
        );
        Ok(parsed)
    }
}

/// Parse with the default configuration.
pub fn parse(buffer: &[u8], filename: &str) -> Result<ParsedFirmware> {
    FirmwareParser::default().parse(buffer, filename)
}
