// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Wire types for host <-> target flashing.
//!
//! Request frame:  `[code, len, payload...]`
//! Response frame: `[code echo, status, data...]`
//!
//! Responses carry no length field; the receiver knows how much data each
//! command returns (see [`CommandCode::response_data_len`]).

use alloc::vec::Vec;

use crate::error::{Error, Result};

// --- Memory layout / timing constants ---

/// Load address for raw `.bin` images, which carry no address metadata.
pub const BIN_BASE_ADDR: u64 = 0x4000_0000;

pub const DEFAULT_TIMEOUT_MS: u64 = 5_000;
pub const ERASE_TIMEOUT_MS: u64 = 30_000; // erase is slow
pub const WRITE_TIMEOUT_MS: u64 = 10_000;
pub const VERIFY_TIMEOUT_MS: u64 = 10_000;

/// Default WRITE chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 256;
/// Largest chunk a single WRITE may carry.
pub const MAX_CHUNK_SIZE: usize = 1024;

pub const ADDRESS_LEN: usize = 4;
pub const MAX_PAYLOAD_LEN: usize = ADDRESS_LEN + MAX_CHUNK_SIZE;

pub const REQUEST_HEADER_LEN: usize = 2;
pub const RESPONSE_HEADER_LEN: usize = 2;

pub const DEVICE_INFO_LEN: usize = 12;
pub const CRC_LEN: usize = 4;

// --- Command / Status codes ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CommandCode {
    Erase = 0x01,
    Write = 0x02,
    Verify = 0x03,
    Reset = 0x04,
    Info = 0x05,
}

impl CommandCode {
    /// Data bytes an OK response to this command carries.
    pub fn response_data_len(self) -> usize {
        match self {
            CommandCode::Info => DEVICE_INFO_LEN,
            CommandCode::Verify => CRC_LEN,
            _ => 0,
        }
    }
}

impl TryFrom<u8> for CommandCode {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(CommandCode::Erase),
            0x02 => Ok(CommandCode::Write),
            0x03 => Ok(CommandCode::Verify),
            0x04 => Ok(CommandCode::Reset),
            0x05 => Ok(CommandCode::Info),
            other => Err(Error::UnknownCommand(other)),
        }
    }
}

impl From<CommandCode> for u8 {
    fn from(code: CommandCode) -> u8 {
        code as u8
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Error,
    Busy,
    Unknown(u8),
}

impl Status {
    pub const OK: u8 = 0x00;
    pub const ERROR: u8 = 0xFF;
    pub const BUSY: u8 = 0xFE;

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl From<u8> for Status {
    fn from(value: u8) -> Self {
        match value {
            Status::OK => Status::Ok,
            Status::ERROR => Status::Error,
            Status::BUSY => Status::Busy,
            other => Status::Unknown(other),
        }
    }
}

impl From<Status> for u8 {
    fn from(status: Status) -> u8 {
        match status {
            Status::Ok => Status::OK,
            Status::Error => Status::ERROR,
            Status::Busy => Status::BUSY,
            Status::Unknown(other) => other,
        }
    }
}

// --- Request frames ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub code: CommandCode,
    pub payload: heapless::Vec<u8, MAX_PAYLOAD_LEN>,
}

impl Command {
    pub fn new(code: CommandCode, payload: &[u8]) -> Result<Self> {
        let payload = heapless::Vec::from_slice(payload)
            .map_err(|_| Error::PayloadTooLarge(payload.len()))?;
        Ok(Self { code, payload })
    }

    pub fn info() -> Self {
        Self {
            code: CommandCode::Info,
            payload: heapless::Vec::new(),
        }
    }

    pub fn reset() -> Self {
        Self {
            code: CommandCode::Reset,
            payload: heapless::Vec::new(),
        }
    }

    pub fn erase(address: u32, size: u32) -> Result<Self> {
        Self::new(CommandCode::Erase, &range_payload(address, size))
    }

    pub fn verify(address: u32, size: u32) -> Result<Self> {
        Self::new(CommandCode::Verify, &range_payload(address, size))
    }

    /// WRITE payload: `[address:be32, chunk...]`.
    pub fn write(address: u32, chunk: &[u8]) -> Result<Self> {
        let mut payload = heapless::Vec::new();
        payload
            .extend_from_slice(&address.to_be_bytes())
            .and_then(|_| payload.extend_from_slice(chunk))
            .map_err(|_| Error::PayloadTooLarge(ADDRESS_LEN + chunk.len()))?;
        Ok(Self {
            code: CommandCode::Write,
            payload,
        })
    }

    /// Encode as `[code, len, payload...]`.
    ///
    /// The length byte holds the low 8 bits of the payload length: a WRITE
    /// with a 256-byte chunk has a 260-byte payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(REQUEST_HEADER_LEN + self.payload.len());
        frame.push(self.code.into());
        frame.push(self.payload.len() as u8);
        frame.extend_from_slice(&self.payload);
        frame
    }

    /// Decode one complete request frame (target side).
    pub fn decode(frame: &[u8]) -> Result<Self> {
        if frame.len() < REQUEST_HEADER_LEN {
            return Err(Error::MalformedFrame("shorter than header"));
        }
        let code = CommandCode::try_from(frame[0])?;
        let payload = &frame[REQUEST_HEADER_LEN..];
        if frame[1] != payload.len() as u8 {
            return Err(Error::MalformedFrame("length byte mismatch"));
        }
        Self::new(code, payload)
    }

    /// `(address, size)` of an ERASE or VERIFY payload.
    pub fn range(&self) -> Option<(u32, u32)> {
        Some((read_be32(&self.payload, 0)?, read_be32(&self.payload, 4)?))
    }
}

fn range_payload(address: u32, size: u32) -> [u8; 8] {
    let mut bytes = [0u8; 8];
    bytes[..4].copy_from_slice(&address.to_be_bytes());
    bytes[4..].copy_from_slice(&size.to_be_bytes());
    bytes
}

/// Big-endian u32 at `offset`, if the slice is long enough.
pub fn read_be32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

// --- Response frames ---

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Echo of the request code
    pub code: u8,
    pub status: Status,
    pub data: Vec<u8>,
}

impl Response {
    pub fn new(code: u8, status: Status, data: Vec<u8>) -> Self {
        Self { code, status, data }
    }

    /// Split a buffered response into header and data.
    ///
    /// Returns `None` until at least the 2-byte header is present.
    pub fn parse(buf: &[u8]) -> Option<Self> {
        if buf.len() < RESPONSE_HEADER_LEN {
            return None;
        }
        Some(Self {
            code: buf[0],
            status: Status::from(buf[1]),
            data: buf[RESPONSE_HEADER_LEN..].to_vec(),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut frame = Vec::with_capacity(RESPONSE_HEADER_LEN + self.data.len());
        frame.push(self.code);
        frame.push(self.status.into());
        frame.extend_from_slice(&self.data);
        frame
    }

    /// Whether `buf` holds a full response to `code`.
    ///
    /// Error/busy responses are complete after the header; OK responses
    /// also need the data the command is known to return.
    pub fn is_complete(buf: &[u8], code: CommandCode) -> bool {
        match buf.get(1) {
            None => false,
            Some(&status) if status != Status::OK => true,
            Some(_) => buf.len() >= RESPONSE_HEADER_LEN + code.response_data_len(),
        }
    }
}

// --- Device info ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    pub chip_id: u32,
    pub flash_size: u32,
    pub ram_size: u32,
}

impl DeviceInfo {
    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        Some(Self {
            chip_id: read_be32(data, 0)?,
            flash_size: read_be32(data, 4)?,
            ram_size: read_be32(data, 8)?,
        })
    }

    pub fn to_bytes(&self) -> [u8; DEVICE_INFO_LEN] {
        let mut bytes = [0u8; DEVICE_INFO_LEN];
        bytes[0..4].copy_from_slice(&self.chip_id.to_be_bytes());
        bytes[4..8].copy_from_slice(&self.flash_size.to_be_bytes());
        bytes[8..12].copy_from_slice(&self.ram_size.to_be_bytes());
        bytes
    }
}
