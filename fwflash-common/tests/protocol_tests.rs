// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Tests for the flash protocol session over scripted and loopback transports.

use std::sync::mpsc::Sender;

use fwflash_common::checksum::crc32;
use fwflash_common::firmware::{FirmwareKind, ParsedFirmware, Segment};
use fwflash_common::protocol::{CommandCode, DeviceInfo, Status};
use fwflash_common::session::{flash_firmware, FlashOptions, FlashProtocol};
use fwflash_common::target::MemoryTarget;
use fwflash_common::transport::{LoopbackTransport, Transport};
use fwflash_common::Error;

type Reply = Box<dyn FnMut(&[u8]) -> Vec<Vec<u8>>>;

/// Replies to each written frame with the chunks returned by `reply`.
struct ScriptedTransport {
    reply: Reply,
    sink: Option<Sender<Vec<u8>>>,
    sent: Vec<Vec<u8>>,
    unsubscribes: usize,
}

impl ScriptedTransport {
    fn new(reply: impl FnMut(&[u8]) -> Vec<Vec<u8>> + 'static) -> Self {
        Self {
            reply: Box::new(reply),
            sink: None,
            sent: Vec::new(),
            unsubscribes: 0,
        }
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, data: &[u8]) -> fwflash_common::Result<()> {
        self.sent.push(data.to_vec());
        for chunk in (self.reply)(data) {
            if let Some(sink) = &self.sink {
                sink.send(chunk).unwrap();
            }
        }
        Ok(())
    }

    fn subscribe(&mut self, sink: Sender<Vec<u8>>) -> fwflash_common::Result<()> {
        self.sink = Some(sink);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.sink = None;
        self.unsubscribes += 1;
    }
}

/// Drops its subscriber on the first write, as a link that went away would.
#[derive(Default)]
struct ClosingTransport {
    sink: Option<Sender<Vec<u8>>>,
}

impl Transport for ClosingTransport {
    fn write(&mut self, _data: &[u8]) -> fwflash_common::Result<()> {
        self.sink = None;
        Ok(())
    }

    fn subscribe(&mut self, sink: Sender<Vec<u8>>) -> fwflash_common::Result<()> {
        self.sink = Some(sink);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.sink = None;
    }
}

/// Acknowledge every frame with `[code, OK]`.
fn ack_all(frame: &[u8]) -> Vec<Vec<u8>> {
    vec![vec![frame[0], 0x00]]
}

const INFO: DeviceInfo = DeviceInfo {
    chip_id: 0x0057_2001,
    flash_size: 0x4000,
    ram_size: 0x2000,
};

const BASE: u32 = 0x4000_0000;

fn loopback() -> LoopbackTransport {
    LoopbackTransport::new(MemoryTarget::new(INFO, BASE))
}

// =============================================================================
// send_command
// =============================================================================

#[test]
fn test_send_command_frames_request() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    protocol
        .send_command(CommandCode::Reset, &[0xDE, 0xAD], 100)
        .unwrap();
    assert_eq!(protocol.transport().sent, vec![vec![0x04, 2, 0xDE, 0xAD]]);
}

#[test]
fn test_send_command_single_chunk() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(|_: &[u8]| {
        vec![vec![0x04, 0x00, 0xAA, 0xBB]]
    }))
    .unwrap();

    let response = protocol.send_command(CommandCode::Reset, &[], 100).unwrap();
    assert_eq!(response.code, 0x04);
    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.data, [0xAA, 0xBB]);
}

#[test]
fn test_send_command_reassembles_chunks() {
    let info = INFO.to_bytes();
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(move |_: &[u8]| {
        vec![
            vec![0x05],
            vec![0x00, info[0], info[1], info[2]],
            info[3..7].to_vec(),
            info[7..].to_vec(),
        ]
    }))
    .unwrap();

    let response = protocol.send_command(CommandCode::Info, &[], 100).unwrap();
    assert_eq!(response.status, Status::Ok);
    assert_eq!(response.data, info);
}

#[test]
fn test_send_command_times_out() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(|_: &[u8]| vec![])).unwrap();
    let started = std::time::Instant::now();
    let err = protocol
        .send_command(CommandCode::Reset, &[], 50)
        .unwrap_err();
    assert!(matches!(err, Error::CommandTimeout(CommandCode::Reset, 50)));
    assert!(started.elapsed() >= std::time::Duration::from_millis(50));
}

#[test]
fn test_header_only_is_not_enough_for_ok_info() {
    // A bare OK header is incomplete for INFO; the deadline expires.
    let mut protocol =
        FlashProtocol::new(ScriptedTransport::new(|_: &[u8]| vec![vec![0x05, 0x00]])).unwrap();
    assert!(matches!(
        protocol.send_command(CommandCode::Info, &[], 30),
        Err(Error::CommandTimeout(CommandCode::Info, 30))
    ));
}

#[test]
fn test_mismatched_echo_is_rejected() {
    let mut protocol =
        FlashProtocol::new(ScriptedTransport::new(|_: &[u8]| vec![vec![0x05, 0x00]])).unwrap();
    assert!(matches!(
        protocol.send_command(CommandCode::Erase, &[], 100),
        Err(Error::UnexpectedResponse {
            expected: CommandCode::Erase,
            actual: 0x05
        })
    ));
}

#[test]
fn test_closed_channel_is_transport_closed() {
    let mut protocol = FlashProtocol::new(ClosingTransport::default()).unwrap();
    let err = protocol
        .send_command(CommandCode::Reset, &[], 5_000)
        .unwrap_err();
    assert!(matches!(err, Error::TransportClosed));
}

#[test]
fn test_late_reply_does_not_leak_into_next_command() {
    let mut protocol = FlashProtocol::new(loopback()).unwrap();

    protocol.transport_mut().hold_next_response();
    assert!(matches!(
        protocol.send_command(CommandCode::Info, &[], 30),
        Err(Error::CommandTimeout(..))
    ));

    // The INFO reply shows up after the timeout
    protocol.transport_mut().release_held();

    let crc = protocol.verify_block(BASE, 16).unwrap();
    assert_eq!(crc, crc32(&[0xFF; 16]));
}

// =============================================================================
// Operations
// =============================================================================

#[test]
fn test_erase_payload() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    protocol.erase_flash(0x1000, 0x2000).unwrap();
    assert_eq!(
        protocol.transport().sent[0],
        [0x01, 8, 0x00, 0x00, 0x10, 0x00, 0x00, 0x00, 0x20, 0x00]
    );
}

#[test]
fn test_erase_error_carries_status() {
    let mut protocol =
        FlashProtocol::new(ScriptedTransport::new(|f: &[u8]| vec![vec![f[0], 0xFE]])).unwrap();
    assert!(matches!(
        protocol.erase_flash(0x1000, 0x2000),
        Err(Error::EraseError {
            address: 0x1000,
            status: Status::Busy
        })
    ));
}

#[test]
fn test_write_block_chunks_600_bytes() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    let data: Vec<u8> = (0..600).map(|i| i as u8).collect();

    protocol.write_block(BASE, &data, 256).unwrap();

    let sent = &protocol.transport().sent;
    assert_eq!(sent.len(), 3);
    let expected = [(BASE, 256usize), (BASE + 256, 256), (BASE + 512, 88)];
    for (frame, (address, len)) in sent.iter().zip(expected) {
        assert_eq!(frame[0], 0x02);
        assert_eq!(&frame[2..6], &address.to_be_bytes());
        assert_eq!(frame.len() - 6, len);
    }
    assert_eq!(&sent[2][6..], &data[512..]);
}

#[test]
fn test_write_block_aborts_on_first_failure() {
    let mut count = 0;
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(move |f: &[u8]| {
        count += 1;
        let status = if count == 2 { 0xFF } else { 0x00 };
        vec![vec![f[0], status]]
    }))
    .unwrap();

    let err = protocol.write_block(BASE, &[0u8; 1000], 256).unwrap_err();
    assert!(matches!(
        err,
        Error::WriteError {
            address,
            status: Status::Error
        } if address == BASE + 256
    ));
    assert_eq!(protocol.transport().sent.len(), 2);
}

#[test]
fn test_write_block_reports_progress() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    let mut seen = Vec::new();
    protocol
        .write_block_with_progress(BASE, &[1u8; 300], 128, |n| seen.push(n))
        .unwrap();
    assert_eq!(seen, [128, 256, 300]);
}

#[test]
fn test_write_block_rejects_bad_chunk_size() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    assert!(matches!(
        protocol.write_block(BASE, &[0; 4], 0),
        Err(Error::InvalidChunkSize(0))
    ));
    assert!(matches!(
        protocol.write_block(BASE, &[0; 4], 4096),
        Err(Error::InvalidChunkSize(4096))
    ));
    assert!(protocol.transport().sent.is_empty());
}

#[test]
fn test_get_device_info() {
    let mut protocol = FlashProtocol::new(loopback()).unwrap();
    assert_eq!(protocol.get_device_info().unwrap(), INFO);
}

#[test]
fn test_get_device_info_error() {
    let mut protocol =
        FlashProtocol::new(ScriptedTransport::new(|f: &[u8]| vec![vec![f[0], 0xFF]])).unwrap();
    assert!(matches!(
        protocol.get_device_info(),
        Err(Error::DeviceInfoError(Status::Error))
    ));
}

#[test]
fn test_verify_block_decodes_crc() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(|f: &[u8]| {
        vec![vec![f[0], 0x00, 0x12, 0x34, 0x56, 0x78]]
    }))
    .unwrap();
    assert_eq!(protocol.verify_block(BASE, 64).unwrap(), 0x1234_5678);
    assert_eq!(
        protocol.transport().sent[0],
        [0x03, 8, 0x40, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x40]
    );
}

#[test]
fn test_reset_device() {
    let mut protocol = FlashProtocol::new(loopback()).unwrap();
    protocol.reset_device().unwrap();
    let target = protocol.transport().target();
    assert_eq!(target.lock().unwrap().resets(), 1);
}

#[test]
fn test_reset_error() {
    let mut protocol = FlashProtocol::new(loopback()).unwrap();
    protocol
        .transport()
        .target()
        .lock()
        .unwrap()
        .set_busy_once();
    assert!(matches!(
        protocol.reset_device(),
        Err(Error::ResetError(Status::Busy))
    ));
    // Session survives a failed operation
    protocol.reset_device().unwrap();
}

#[test]
fn test_destroy_is_idempotent() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    protocol.destroy();
    protocol.destroy();
    assert!(!protocol.is_open());
    assert_eq!(protocol.transport().unsubscribes, 1);
    assert!(matches!(
        protocol.reset_device(),
        Err(Error::SessionClosed)
    ));
}

// =============================================================================
// Whole-image flashing
// =============================================================================

fn firmware(segments: Vec<Segment>) -> ParsedFirmware {
    ParsedFirmware {
        kind: FirmwareKind::Hex,
        total_size: segments.iter().map(Segment::size).sum(),
        checksum: 0,
        segments,
    }
}

#[test]
fn test_flash_firmware_over_chunked_loopback() {
    let code: Vec<u8> = (0..1500u32).map(|i| (i * 7) as u8).collect();
    let data = vec![0x5A; 40];
    let fw = firmware(vec![
        Segment::new(BASE as u64, code.clone()),
        Segment::new(BASE as u64 + 0x2000, data.clone()),
    ]);

    let mut protocol = FlashProtocol::new(loopback().with_chunk_size(3)).unwrap();
    let mut last = 0;
    let report = flash_firmware(&mut protocol, &fw, &FlashOptions::default(), |n| last = n).unwrap();

    assert_eq!(report.segments, 2);
    assert_eq!(report.bytes_written, 1540);
    assert_eq!(last, 1540);

    let target = protocol.transport().target();
    let target = target.lock().unwrap();
    assert_eq!(target.read(BASE, 1500).unwrap(), &code[..]);
    assert_eq!(target.read(BASE + 0x2000, 40).unwrap(), &data[..]);
    assert_eq!(target.resets(), 1);
}

#[test]
fn test_flash_firmware_detects_crc_mismatch() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(|f: &[u8]| match f[0] {
        0x03 => vec![vec![0x03, 0x00, 0, 0, 0, 1]],
        code => vec![vec![code, 0x00]],
    }))
    .unwrap();
    let fw = firmware(vec![Segment::new(0x1000, vec![1, 2, 3])]);

    let err = flash_firmware(&mut protocol, &fw, &FlashOptions::default(), |_| {}).unwrap_err();
    assert!(matches!(
        err,
        Error::VerifyMismatch {
            address: 0x1000,
            actual: 1,
            ..
        }
    ));
    // No reset after a failed segment
    assert!(protocol.transport().sent.iter().all(|f| f[0] != 0x04));
}

#[test]
fn test_flash_firmware_rejects_64_bit_address_up_front() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    let fw = firmware(vec![
        Segment::new(0x1000, vec![0; 4]),
        Segment::new(0xFFFF_FFFF_8000_0000, vec![0; 4]),
    ]);
    assert!(matches!(
        flash_firmware(&mut protocol, &fw, &FlashOptions::default(), |_| {}),
        Err(Error::AddressOutOfRange { .. })
    ));
    assert!(protocol.transport().sent.is_empty());
}

#[test]
fn test_flash_firmware_without_verify_or_reset() {
    let mut protocol = FlashProtocol::new(ScriptedTransport::new(ack_all)).unwrap();
    let fw = firmware(vec![Segment::new(0x1000, vec![0; 10])]);
    let options = FlashOptions {
        chunk_size: 4,
        verify: false,
        reset: false,
    };
    flash_firmware(&mut protocol, &fw, &options, |_| {}).unwrap();

    let codes: Vec<u8> = protocol.transport().sent.iter().map(|f| f[0]).collect();
    assert_eq!(codes, [0x01, 0x02, 0x02, 0x02]);
}
