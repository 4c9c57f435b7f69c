// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Intel HEX decoder.
//!
//! Record layout: `:LLAAAATT[DD...]CC`, all fields hex-encoded. Data records
//! are collected by absolute address, then sorted and coalesced into the
//! minimal set of contiguous segments.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use super::{HexChecksum, Segment};
use crate::error::{Error, Result};

pub const RECORD_DATA: u8 = 0x00;
pub const RECORD_EOF: u8 = 0x01;
pub const RECORD_EXT_SEGMENT: u8 = 0x02;
pub const RECORD_EXT_LINEAR: u8 = 0x04;

/// Byte count, two address bytes and record type.
const RECORD_HEADER_LEN: usize = 4;

#[derive(Debug, PartialEq, Eq)]
struct Record {
    kind: u8,
    address: u16,
    data: Vec<u8>,
}

impl Record {
    /// Big-endian 16-bit value of an extended address record.
    fn ext_value(&self, line: usize) -> Result<u64> {
        match self.data[..] {
            [hi, lo] => Ok(u16::from_be_bytes([hi, lo]) as u64),
            _ => Err(Error::MalformedRecord {
                line,
                reason: "extended address record must carry 2 bytes",
            }),
        }
    }
}

fn nibble(c: u8) -> Option<u8> {
    (c as char).to_digit(16).map(|d| d as u8)
}

fn parse_record(line: &[u8], line_no: usize, checksum: HexChecksum) -> Result<Record> {
    let malformed = |reason| Error::MalformedRecord {
        line: line_no,
        reason,
    };

    let digits = &line[1..];
    if digits.len() % 2 != 0 {
        return Err(malformed("odd number of hex digits"));
    }
    let bytes = digits
        .chunks(2)
        .map(|pair| Some(nibble(pair[0])? << 4 | nibble(pair[1])?))
        .collect::<Option<Vec<u8>>>()
        .ok_or_else(|| malformed("invalid hex digit"))?;

    if bytes.len() < RECORD_HEADER_LEN {
        return Err(malformed("record too short"));
    }
    let count = bytes[0] as usize;
    let body_len = RECORD_HEADER_LEN + count;

    match checksum {
        HexChecksum::Validate => {
            if bytes.len() < body_len + 1 {
                return Err(malformed("record shorter than its byte count"));
            }
            let sum = bytes[..=body_len]
                .iter()
                .fold(0u8, |acc, b| acc.wrapping_add(*b));
            if sum != 0 {
                return Err(malformed("checksum mismatch"));
            }
        }
        HexChecksum::Ignore => {
            if bytes.len() < body_len {
                return Err(malformed("record shorter than its byte count"));
            }
        }
    }

    Ok(Record {
        kind: bytes[3],
        address: u16::from_be_bytes([bytes[1], bytes[2]]),
        data: bytes[RECORD_HEADER_LEN..body_len].to_vec(),
    })
}

/// Decode an Intel HEX file into address-sorted, non-overlapping segments.
pub fn load_segments(data: &[u8], checksum: HexChecksum) -> Result<Vec<Segment>> {
    let mut extended_address: u64 = 0;
    let mut chunks: BTreeMap<u64, Vec<u8>> = BTreeMap::new();

    for (idx, raw) in data.split(|&b| b == b'\n').enumerate() {
        let line_no = idx + 1;
        let line = raw.trim_ascii();
        if !line.starts_with(b":") {
            continue;
        }

        let record = parse_record(line, line_no, checksum)?;
        match record.kind {
            RECORD_DATA => {
                if !record.data.is_empty() {
                    let address = extended_address + record.address as u64;
                    chunks.insert(address, record.data);
                }
            }
            RECORD_EOF => break,
            RECORD_EXT_SEGMENT => extended_address = record.ext_value(line_no)? * 16,
            RECORD_EXT_LINEAR => extended_address = record.ext_value(line_no)? << 16,
            other => log::warn!(
                "Unknown HEX record type 0x{:02x} on line {}, skipped",
                other,
                line_no
            ),
        }
    }

    coalesce(chunks)
}

/// Merge address-ordered chunks into contiguous runs.
fn coalesce(chunks: BTreeMap<u64, Vec<u8>>) -> Result<Vec<Segment>> {
    let mut segments: Vec<Segment> = Vec::new();

    for (address, bytes) in chunks {
        match segments.last_mut() {
            Some(current) if current.end() == address => current.data.extend_from_slice(&bytes),
            Some(current) if address < current.end() => {
                return Err(Error::OverlappingData { address })
            }
            _ => segments.push(Segment::new(address, bytes)),
        }
    }

    Ok(segments)
}
