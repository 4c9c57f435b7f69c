// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! ELF64 loader: one segment per non-empty `PT_LOAD` program header.
//!
//! Segments keep program-header order and are neither merged nor sorted.

use alloc::vec::Vec;

use super::Segment;
use crate::error::{Error, Result};

// --- ELF identification ---

pub const ELF_MAGIC: [u8; 4] = [0x7F, b'E', b'L', b'F'];

const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

// --- ELF64 header field offsets ---

const E_PHOFF: u64 = 32;
const E_PHENTSIZE: u64 = 54;
const E_PHNUM: u64 = 56;

// --- Program header field offsets (entry-relative) ---

const P_TYPE: u64 = 0;
const P_OFFSET: u64 = 8;
const P_VADDR: u64 = 16;
const P_FILESZ: u64 = 32;

/// Program header type: loadable segment.
pub const PT_LOAD: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

/// Bounds-checked field reader over the raw image.
struct Reader<'a> {
    data: &'a [u8],
    endian: Endian,
}

impl<'a> Reader<'a> {
    fn bytes<const N: usize>(&self, offset: u64) -> Result<[u8; N]> {
        let slice = self.slice(offset, N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Ok(out)
    }

    fn u16(&self, offset: u64) -> Result<u16> {
        let b = self.bytes::<2>(offset)?;
        Ok(match self.endian {
            Endian::Little => u16::from_le_bytes(b),
            Endian::Big => u16::from_be_bytes(b),
        })
    }

    fn u32(&self, offset: u64) -> Result<u32> {
        let b = self.bytes::<4>(offset)?;
        Ok(match self.endian {
            Endian::Little => u32::from_le_bytes(b),
            Endian::Big => u32::from_be_bytes(b),
        })
    }

    fn u64(&self, offset: u64) -> Result<u64> {
        let b = self.bytes::<8>(offset)?;
        Ok(match self.endian {
            Endian::Little => u64::from_le_bytes(b),
            Endian::Big => u64::from_be_bytes(b),
        })
    }

    fn slice(&self, offset: u64, len: u64) -> Result<&'a [u8]> {
        let truncated = Error::Truncated { offset, len };
        let range = usize::try_from(offset)
            .ok()
            .zip(usize::try_from(len).ok())
            .and_then(|(start, len)| Some(start..start.checked_add(len)?));
        range
            .and_then(|range| self.data.get(range))
            .ok_or(truncated)
    }
}

/// Check magic, class and data encoding; return a reader set to the
/// image's byte order.
fn identify(data: &[u8]) -> Result<Reader<'_>> {
    if !data.starts_with(&ELF_MAGIC) {
        return Err(Error::UnsupportedFormat("invalid ELF magic".into()));
    }
    match data.get(EI_CLASS) {
        Some(&ELFCLASS64) => {}
        Some(_) => {
            return Err(Error::UnsupportedFormat(
                "only 64-bit ELF files are supported".into(),
            ))
        }
        None => {
            return Err(Error::Truncated {
                offset: EI_CLASS as u64,
                len: 1,
            })
        }
    }
    let endian = match data.get(EI_DATA) {
        Some(&ELFDATA2LSB) => Endian::Little,
        Some(&ELFDATA2MSB) => Endian::Big,
        Some(other) => {
            return Err(Error::UnsupportedFormat(alloc::format!(
                "unknown ELF data encoding {}",
                other
            )))
        }
        None => {
            return Err(Error::Truncated {
                offset: EI_DATA as u64,
                len: 1,
            })
        }
    };
    Ok(Reader { data, endian })
}

/// Extract the loadable segments of an ELF64 image.
pub fn load_segments(data: &[u8]) -> Result<Vec<Segment>> {
    let reader = identify(data)?;

    let phoff = reader.u64(E_PHOFF)?;
    let phentsize = reader.u16(E_PHENTSIZE)? as u64;
    let phnum = reader.u16(E_PHNUM)?;

    let mut segments = Vec::new();
    for i in 0..phnum as u64 {
        let entry = phoff
            .checked_add(i * phentsize)
            .ok_or(Error::Truncated {
                offset: phoff,
                len: phentsize,
            })?;

        if reader.u32(entry.saturating_add(P_TYPE))? != PT_LOAD {
            continue;
        }

        let offset = reader.u64(entry.saturating_add(P_OFFSET))?;
        let vaddr = reader.u64(entry.saturating_add(P_VADDR))?;
        let filesz = reader.u64(entry.saturating_add(P_FILESZ))?;

        if filesz == 0 {
            log::trace!("skipping empty PT_LOAD #{} at {:#x}", i, vaddr);
            continue;
        }

        if vaddr.checked_add(filesz).is_none() {
            return Err(Error::AddressOutOfRange {
                address: vaddr,
                size: filesz,
            });
        }

        let bytes = reader.slice(offset, filesz)?;
        log::trace!(
            "PT_LOAD #{}: vaddr {:#x}, {} bytes from file offset {:#x}",
            i,
            vaddr,
            filesz,
            offset
        );
        segments.push(Segment::new(vaddr, bytes.to_vec()));
    }

    Ok(segments)
}
