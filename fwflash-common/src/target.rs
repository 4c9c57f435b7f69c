// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Emulated flash target - pure logic, no hardware.
//!
//! Answers request frames the way a device-side flasher does, against an
//! in-memory NOR flash array. Writes can only clear bits, so programming
//! without a prior erase corrupts data just like on real parts.

use alloc::vec::Vec;
use core::ops::Range;

use crate::checksum::crc32;
use crate::protocol::{read_be32, Command, CommandCode, DeviceInfo, Response, Status, ADDRESS_LEN};

/// Value of an erased flash byte.
pub const ERASED: u8 = 0xFF;

pub struct MemoryTarget {
    info: DeviceInfo,
    base: u32,
    flash: Vec<u8>,
    busy_once: bool,
    resets: u32,
}

impl MemoryTarget {
    /// Target with `info.flash_size` bytes of erased flash mapped at `base`.
    pub fn new(info: DeviceInfo, base: u32) -> Self {
        Self {
            info,
            base,
            flash: alloc::vec![ERASED; info.flash_size as usize],
            busy_once: false,
            resets: 0,
        }
    }

    pub fn resets(&self) -> u32 {
        self.resets
    }

    /// Answer the next command with BUSY.
    pub fn set_busy_once(&mut self) {
        self.busy_once = true;
    }

    /// Flash contents at `[address, address + size)`, if mapped.
    pub fn read(&self, address: u32, size: u32) -> Option<&[u8]> {
        self.map(address, size).map(|r| &self.flash[r])
    }

    fn map(&self, address: u32, size: u32) -> Option<Range<usize>> {
        let start = address.checked_sub(self.base)? as usize;
        let end = start.checked_add(size as usize)?;
        (end <= self.flash.len()).then_some(start..end)
    }

    /// Handle one complete request frame and build the response frame.
    pub fn handle_frame(&mut self, frame: &[u8]) -> Vec<u8> {
        let echo = frame.first().copied().unwrap_or(0);
        let response = match Command::decode(frame) {
            Ok(cmd) => self.handle_command(&cmd),
            Err(e) => {
                log::debug!("target: rejecting frame: {}", e);
                error(echo)
            }
        };
        response.encode()
    }

    /// Dispatch a command to its handler.
    pub fn handle_command(&mut self, cmd: &Command) -> Response {
        if core::mem::take(&mut self.busy_once) {
            return Response::new(cmd.code.into(), Status::Busy, Vec::new());
        }
        match cmd.code {
            CommandCode::Info => self.handle_info(),
            CommandCode::Erase => self.handle_erase(cmd),
            CommandCode::Write => self.handle_write(cmd),
            CommandCode::Verify => self.handle_verify(cmd),
            CommandCode::Reset => self.handle_reset(),
        }
    }

    fn handle_info(&self) -> Response {
        ok(CommandCode::Info, self.info.to_bytes().to_vec())
    }

    /// Handle ERASE: fill the range with 0xFF.
    fn handle_erase(&mut self, cmd: &Command) -> Response {
        let Some((address, size)) = cmd.range() else {
            return error(cmd.code.into());
        };
        let Some(range) = self.map(address, size) else {
            return error(cmd.code.into());
        };
        self.flash[range].fill(ERASED);
        ok(CommandCode::Erase, Vec::new())
    }

    /// Handle WRITE: program the chunk (bits can only go 1 -> 0).
    fn handle_write(&mut self, cmd: &Command) -> Response {
        let Some(address) = read_be32(&cmd.payload, 0) else {
            return error(cmd.code.into());
        };
        let chunk = &cmd.payload[ADDRESS_LEN..];
        let size = chunk.len() as u32;
        let Some(range) = self.map(address, size) else {
            return error(cmd.code.into());
        };
        for (cell, byte) in self.flash[range].iter_mut().zip(chunk) {
            *cell &= *byte;
        }
        ok(CommandCode::Write, Vec::new())
    }

    /// Handle VERIFY: return the CRC-32 of the range.
    fn handle_verify(&self, cmd: &Command) -> Response {
        let Some((address, size)) = cmd.range() else {
            return error(cmd.code.into());
        };
        match self.read(address, size) {
            Some(bytes) => ok(CommandCode::Verify, crc32(bytes).to_be_bytes().to_vec()),
            None => error(cmd.code.into()),
        }
    }

    /// Handle RESET: flash contents survive.
    fn handle_reset(&mut self) -> Response {
        self.resets += 1;
        ok(CommandCode::Reset, Vec::new())
    }
}

fn ok(code: CommandCode, data: Vec<u8>) -> Response {
    Response::new(code.into(), Status::Ok, data)
}

fn error(code: u8) -> Response {
    Response::new(code, Status::Error, Vec::new())
}
