// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! CRC-32 used for image fingerprints and device-side verification.

use crc::{Crc, CRC_32_ISO_HDLC};

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

/// Standard CRC-32 (ISO-HDLC, as used by zlib and Ethernet).
pub fn crc32(data: &[u8]) -> u32 {
    CRC32.checksum(data)
}
