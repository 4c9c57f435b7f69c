// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Flash protocol session: command/response exchange and the
//! erase/write/verify/reset sequence built on top of it.
//!
//! Inbound bytes arrive over an mpsc channel fed by the transport; the only
//! suspension point is the blocking receive with the command's time budget.
//! Every operation takes `&mut self`, so at most one command is in flight.

use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use crate::checksum::crc32;
use crate::error::{Error, Result};
use crate::firmware::{ParsedFirmware, Segment};
use crate::protocol::{
    read_be32, Command, CommandCode, DeviceInfo, Response, CRC_LEN, DEFAULT_CHUNK_SIZE,
    DEFAULT_TIMEOUT_MS, DEVICE_INFO_LEN, ERASE_TIMEOUT_MS, MAX_CHUNK_SIZE, RESPONSE_HEADER_LEN,
    VERIFY_TIMEOUT_MS, WRITE_TIMEOUT_MS,
};
use crate::transport::Transport;

/// Host side of the flash protocol over one transport.
pub struct FlashProtocol<T: Transport> {
    transport: T,
    inbound: Receiver<Vec<u8>>,
    rx_buf: Vec<u8>,
    open: bool,
}

impl<T: Transport> FlashProtocol<T> {
    /// Attach to `transport` and subscribe to its inbound bytes.
    pub fn new(mut transport: T) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        transport.subscribe(tx)?;
        Ok(Self {
            transport,
            inbound: rx,
            rx_buf: Vec::with_capacity(64),
            open: true,
        })
    }

    /// Get the underlying transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Get the underlying transport mutably.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Whether `destroy` has not been called yet.
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Drop whatever is buffered, including late replies to timed-out commands.
    fn drain_rx(&mut self) {
        let mut stale = self.rx_buf.len();
        self.rx_buf.clear();
        while let Ok(chunk) = self.inbound.try_recv() {
            stale += chunk.len();
        }
        if stale > 0 {
            log::debug!("Discarding {} stale inbound bytes", stale);
        }
    }

    /// Send `[code, len, payload...]` and wait up to `timeout_ms` for the reply.
    pub fn send_command(
        &mut self,
        code: CommandCode,
        payload: &[u8],
        timeout_ms: u64,
    ) -> Result<Response> {
        self.send(&Command::new(code, payload)?, timeout_ms)
    }

    /// Send an already built command and wait up to `timeout_ms` for the reply.
    pub fn send(&mut self, cmd: &Command, timeout_ms: u64) -> Result<Response> {
        if !self.open {
            return Err(Error::SessionClosed);
        }
        self.drain_rx();

        let frame = cmd.encode();
        log::trace!(
            "-> {:?} ({} bytes): {:02x?}",
            cmd.code,
            frame.len(),
            &frame[..frame.len().min(16)]
        );
        self.transport.write(&frame)?;

        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        while !Response::is_complete(&self.rx_buf, cmd.code) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.inbound.recv_timeout(remaining) {
                Ok(chunk) => self.rx_buf.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(Error::CommandTimeout(cmd.code, timeout_ms))
                }
                Err(RecvTimeoutError::Disconnected) => return Err(Error::TransportClosed),
            }
        }

        let response = Response::parse(&self.rx_buf).ok_or(Error::ShortResponse(
            cmd.code,
            self.rx_buf.len(),
            RESPONSE_HEADER_LEN,
        ))?;
        self.rx_buf.clear();

        if response.code != u8::from(cmd.code) {
            return Err(Error::UnexpectedResponse {
                expected: cmd.code,
                actual: response.code,
            });
        }
        log::trace!(
            "<- {:?}: {:?}, {} data bytes",
            cmd.code,
            response.status,
            response.data.len()
        );
        Ok(response)
    }

    /// Query chip id, flash size and RAM size.
    pub fn get_device_info(&mut self) -> Result<DeviceInfo> {
        let response = self.send(&Command::info(), DEFAULT_TIMEOUT_MS)?;
        if !response.status.is_ok() {
            return Err(Error::DeviceInfoError(response.status));
        }
        DeviceInfo::from_bytes(&response.data).ok_or(Error::ShortResponse(
            CommandCode::Info,
            response.data.len(),
            DEVICE_INFO_LEN,
        ))
    }

    /// Erase `[address, address + size)`.
    pub fn erase_flash(&mut self, address: u32, size: u32) -> Result<()> {
        log::debug!("Erasing {:#010x} (+{:#x})", address, size);
        let response = self.send(&Command::erase(address, size)?, ERASE_TIMEOUT_MS)?;
        if !response.status.is_ok() {
            return Err(Error::EraseError {
                address,
                status: response.status,
            });
        }
        Ok(())
    }

    /// Write `data` at `address` in WRITE commands of at most `max_chunk_size` bytes.
    pub fn write_block(&mut self, address: u32, data: &[u8], max_chunk_size: usize) -> Result<()> {
        self.write_block_with_progress(address, data, max_chunk_size, |_| {})
    }

    /// Like [`write_block`](Self::write_block), calling `on_chunk` with the
    /// number of bytes of `data` acknowledged so far.
    ///
    /// Stops at the first rejected chunk; earlier chunks stay written.
    pub fn write_block_with_progress(
        &mut self,
        address: u32,
        data: &[u8],
        max_chunk_size: usize,
        mut on_chunk: impl FnMut(usize),
    ) -> Result<()> {
        if max_chunk_size == 0 || max_chunk_size > MAX_CHUNK_SIZE {
            return Err(Error::InvalidChunkSize(max_chunk_size));
        }
        device_range(address as u64, data.len())?;

        let mut address = address;
        let mut written = 0;
        for chunk in data.chunks(max_chunk_size) {
            let response = self.send(&Command::write(address, chunk)?, WRITE_TIMEOUT_MS)?;
            if !response.status.is_ok() {
                return Err(Error::WriteError {
                    address,
                    status: response.status,
                });
            }
            written += chunk.len();
            on_chunk(written);
            // device_range() above keeps this from wrapping
            address = address.wrapping_add(chunk.len() as u32);
        }
        Ok(())
    }

    /// Ask the device for the CRC-32 of `[address, address + size)`.
    pub fn verify_block(&mut self, address: u32, size: u32) -> Result<u32> {
        let response = self.send(&Command::verify(address, size)?, VERIFY_TIMEOUT_MS)?;
        if !response.status.is_ok() {
            return Err(Error::VerifyError {
                address,
                status: response.status,
            });
        }
        read_be32(&response.data, 0).ok_or(Error::ShortResponse(
            CommandCode::Verify,
            response.data.len(),
            CRC_LEN,
        ))
    }

    /// Reboot the device.
    pub fn reset_device(&mut self) -> Result<()> {
        let response = self.send(&Command::reset(), DEFAULT_TIMEOUT_MS)?;
        if !response.status.is_ok() {
            return Err(Error::ResetError(response.status));
        }
        Ok(())
    }

    /// Detach from the transport. Further commands fail with `SessionClosed`.
    pub fn destroy(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.transport.unsubscribe();
        self.drain_rx();
    }
}

impl<T: Transport> Drop for FlashProtocol<T> {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Check that `[address, address + len)` fits the 32-bit device address space.
fn device_range(address: u64, len: usize) -> Result<(u32, u32)> {
    let out_of_range = || Error::AddressOutOfRange {
        address,
        size: len as u64,
    };
    let start = u32::try_from(address).map_err(|_| out_of_range())?;
    let size = u32::try_from(len).map_err(|_| out_of_range())?;
    if address + len as u64 > u32::MAX as u64 + 1 {
        return Err(out_of_range());
    }
    Ok((start, size))
}

// --- Whole-image flashing ---

/// Settings for [`flash_firmware`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashOptions {
    pub chunk_size: usize,
    /// Compare the device CRC of each segment with the local one
    pub verify: bool,
    /// Reset the device once every segment is written
    pub reset: bool,
}

impl Default for FlashOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            verify: true,
            reset: true,
        }
    }
}

/// Outcome of a successful [`flash_firmware`] run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlashReport {
    pub segments: usize,
    pub bytes_written: usize,
    pub elapsed: Duration,
}

impl FlashReport {
    /// Average write speed in KiB/s.
    pub fn speed_kib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.bytes_written as f64 / 1024.0 / secs
        } else {
            0.0
        }
    }
}

/// Erase, write and optionally verify every segment, then optionally reset.
///
/// `progress` receives the total number of bytes written so far.
pub fn flash_firmware<T: Transport>(
    protocol: &mut FlashProtocol<T>,
    firmware: &ParsedFirmware,
    options: &FlashOptions,
    mut progress: impl FnMut(usize),
) -> Result<FlashReport> {
    let start = Instant::now();
    let count = firmware.segments.len();

    // Reject the whole image before touching the device
    for segment in &firmware.segments {
        device_range(segment.address, segment.size())?;
    }

    let mut written = 0;
    for (i, segment) in firmware.segments.iter().enumerate() {
        log::info!(
            "Segment {}/{}: {:#010x}, {} bytes",
            i + 1,
            count,
            segment.address,
            segment.size()
        );
        flash_segment(protocol, segment, options, |n| progress(written + n))?;
        written += segment.size();
    }

    if options.reset {
        log::info!("Resetting device");
        protocol.reset_device()?;
    }

    Ok(FlashReport {
        segments: count,
        bytes_written: written,
        elapsed: start.elapsed(),
    })
}

fn flash_segment<T: Transport>(
    protocol: &mut FlashProtocol<T>,
    segment: &Segment,
    options: &FlashOptions,
    progress: impl FnMut(usize),
) -> Result<()> {
    let (address, size) = device_range(segment.address, segment.size())?;

    protocol.erase_flash(address, size)?;
    protocol.write_block_with_progress(address, &segment.data, options.chunk_size, progress)?;

    if options.verify {
        let expected = crc32(&segment.data);
        let actual = protocol.verify_block(address, size)?;
        if actual != expected {
            return Err(Error::VerifyMismatch {
                address,
                expected,
                actual,
            });
        }
        log::debug!("Segment {:#010x} verified (crc32 {:08X})", address, actual);
    }
    Ok(())
}
