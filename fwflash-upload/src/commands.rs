// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Command implementations for device operations.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serialport::SerialPortType;

use fwflash_common::{
    flash_firmware, FirmwareParser, FlashOptions, FlashProtocol, ParsedFirmware, ParserConfig,
    Transport,
};

use crate::transport::list_ports;

/// List serial ports and, for USB ones, their identifiers.
pub fn ports() -> Result<()> {
    let ports = list_ports()?;
    if ports.is_empty() {
        println!("No serial ports found.");
        return Ok(());
    }

    for port in ports {
        match port.port_type {
            SerialPortType::UsbPort(usb) => println!(
                "{}  USB {:04x}:{:04x}  {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.as_deref().unwrap_or("")
            ),
            SerialPortType::BluetoothPort => println!("{}  Bluetooth", port.port_name),
            SerialPortType::PciPort => println!("{}  PCI", port.port_name),
            SerialPortType::Unknown => println!("{}", port.port_name),
        }
    }
    Ok(())
}

fn load_firmware(file: &Path, config: &ParserConfig) -> Result<ParsedFirmware> {
    let buffer = fs::read(file).with_context(|| format!("Failed to read {}", file.display()))?;
    let name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default();
    FirmwareParser::new(*config)
        .parse(&buffer, name)
        .with_context(|| format!("Failed to parse {}", file.display()))
}

fn print_summary(file: &Path, firmware: &ParsedFirmware) {
    println!(
        "Firmware: {} ({}, {} bytes in {} segment(s), CRC32: 0x{:08x})",
        file.display(),
        firmware.kind,
        firmware.total_size,
        firmware.segments.len(),
        firmware.checksum
    );
}

/// Parse a firmware file and print its segment map.
pub fn inspect(file: &Path, config: &ParserConfig) -> Result<()> {
    let firmware = load_firmware(file, config)?;
    print_summary(file, &firmware);
    println!();

    for (i, segment) in firmware.segments.iter().enumerate() {
        println!(
            "  #{:<3} 0x{:08x}..0x{:08x}  {:>8} bytes",
            i,
            segment.address,
            segment.end(),
            segment.size()
        );
    }
    Ok(())
}

/// Get and display device information.
pub fn info<T: Transport>(protocol: &mut FlashProtocol<T>) -> Result<()> {
    let info = protocol.get_device_info().context("INFO failed")?;

    println!("Device Info:");
    println!("  Chip ID:    0x{:08x}", info.chip_id);
    println!("  Flash size: {} KiB", info.flash_size / 1024);
    println!("  RAM size:   {} KiB", info.ram_size / 1024);
    Ok(())
}

/// Flash every segment of `file`.
pub fn flash<T: Transport>(
    protocol: &mut FlashProtocol<T>,
    file: &Path,
    config: &ParserConfig,
    options: &FlashOptions,
) -> Result<()> {
    let firmware = load_firmware(file, config)?;
    print_summary(file, &firmware);
    println!();

    let pb = ProgressBar::new(firmware.total_size as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})",
            )?
            .progress_chars("#>-"),
    );

    let result = flash_firmware(protocol, &firmware, options, |written| {
        pb.set_position(written as u64)
    });
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            pb.abandon();
            return Err(e).context("Flashing failed");
        }
    };
    pb.finish_with_message("Flash complete");

    println!();
    println!(
        "Wrote {} bytes in {} segment(s) in {:.2}s ({:.1} KiB/s){}",
        report.bytes_written,
        report.segments,
        report.elapsed.as_secs_f64(),
        report.speed_kib_s(),
        if options.verify { ", verified" } else { "" }
    );
    if options.reset {
        println!("Device reset.");
    }
    Ok(())
}

/// Erase `[address, address + size)`.
pub fn erase<T: Transport>(protocol: &mut FlashProtocol<T>, address: u32, size: u32) -> Result<()> {
    print!("Erasing 0x{:08x} (+0x{:x})... ", address, size);
    std::io::stdout().flush()?;

    protocol.erase_flash(address, size)?;
    println!("OK");
    Ok(())
}

/// Print the device CRC-32 of `[address, address + size)`.
pub fn verify<T: Transport>(protocol: &mut FlashProtocol<T>, address: u32, size: u32) -> Result<()> {
    let crc = protocol.verify_block(address, size)?;
    println!("CRC32 of 0x{:08x} (+0x{:x}): 0x{:08x}", address, size, crc);
    Ok(())
}

/// Reboot the device.
pub fn reset<T: Transport>(protocol: &mut FlashProtocol<T>) -> Result<()> {
    print!("Resetting device... ");
    std::io::stdout().flush()?;

    protocol.reset_device()?;
    println!("OK");
    Ok(())
}
