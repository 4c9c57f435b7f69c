// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Error types shared by the firmware parser and the flash protocol.

use alloc::string::String;

use thiserror::Error as TError;

use crate::protocol::{CommandCode, Status};

#[derive(Debug, TError)]
pub enum Error {
    /// Unknown file extension, bad ELF magic, or an ELF flavour we do not load
    #[error("Unsupported firmware format: {0}")]
    UnsupportedFormat(String),

    /// A read ran past the end of the input buffer
    #[error("Truncated image: need {len} bytes at offset {offset:#x}")]
    Truncated { offset: u64, len: u64 },

    /// Intel HEX record that could not be decoded
    #[error("Malformed HEX record on line {line}: {reason}")]
    MalformedRecord { line: usize, reason: &'static str },

    /// Two HEX data records cover the same bytes
    #[error("HEX data overlaps at address {address:#010x}")]
    OverlappingData { address: u64 },

    /// Request frame too short, or its length byte disagrees with its size
    #[error("Malformed request frame: {0}")]
    MalformedFrame(&'static str),

    #[error("Unknown command code {0:#04x}")]
    UnknownCommand(u8),

    #[error("Command payload of {0} bytes exceeds the frame limit")]
    PayloadTooLarge(usize),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// No complete response arrived before the deadline
    #[error("{0:?} command timed out after {1} ms")]
    CommandTimeout(CommandCode, u64),

    /// The response echoed a different command code
    #[error("Expected response to {expected:?}, got code {actual:#04x}")]
    UnexpectedResponse { expected: CommandCode, actual: u8 },

    #[error("{0:?} response carries {1} data bytes, need {2}")]
    ShortResponse(CommandCode, usize, usize),

    #[error("Failed to get device info: {0:?}")]
    DeviceInfoError(Status),

    #[error("Flash erase failed at {address:#010x}: {status:?}")]
    EraseError { address: u32, status: Status },

    #[error("Write failed at address {address:#010x}: {status:?}")]
    WriteError { address: u32, status: Status },

    #[error("Verification failed at {address:#010x}: {status:?}")]
    VerifyError { address: u32, status: Status },

    #[error("Device reset failed: {0:?}")]
    ResetError(Status),

    /// Device CRC differs from the CRC of the data we sent
    #[error("CRC mismatch at {address:#010x}: expected {expected:#010x}, device reports {actual:#010x}")]
    VerifyMismatch {
        address: u32,
        expected: u32,
        actual: u32,
    },

    /// Segment does not fit the 32-bit device address space
    #[error("Segment at {address:#x} ({size} bytes) is outside the 32-bit address space")]
    AddressOutOfRange { address: u64, size: u64 },

    /// The inbound channel was closed by the transport
    #[error("Transport closed")]
    TransportClosed,

    /// The protocol session was destroyed
    #[error("Protocol session is closed")]
    SessionClosed,

    #[error("Transport error: {0}")]
    Transport(String),

    #[cfg(feature = "std")]
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, Error>;
