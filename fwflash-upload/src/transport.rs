// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Serial transport layer for device communication.

use std::io::{ErrorKind, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::{Context, Result};
use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, StopBits};

use fwflash_common::transport::Transport;
use fwflash_common::Error;

/// Read timeout of the receive thread; bounds how long unsubscribe waits.
pub const READ_POLL_MS: u64 = 50;

const READ_BUF_SIZE: usize = 1024;

/// Line settings used when opening the port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortConfig {
    pub baud_rate: u32,
    pub data_bits: DataBits,
    pub parity: Parity,
    pub stop_bits: StopBits,
}

impl Default for PortConfig {
    fn default() -> Self {
        Self {
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            parity: Parity::None,
            stop_bits: StopBits::One,
        }
    }
}

/// Serial port transport with a background receive thread.
pub struct SerialTransport {
    port: Box<dyn SerialPort>,
    name: String,
    reader: Option<JoinHandle<()>>,
    stop: Arc<AtomicBool>,
}

impl SerialTransport {
    pub fn open(port_name: &str, config: &PortConfig) -> Result<Self> {
        let port = serialport::new(port_name, config.baud_rate)
            .data_bits(config.data_bits)
            .parity(config.parity)
            .stop_bits(config.stop_bits)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_millis(READ_POLL_MS))
            .open()
            .with_context(|| format!("Failed to open serial port {}", port_name))?;

        log::info!(
            "Opened {} at {} baud ({:?}, parity {}, {:?} stop bit)",
            port_name,
            config.baud_rate,
            config.data_bits,
            parity_letter(config.parity),
            config.stop_bits
        );

        Ok(Self {
            port,
            name: port_name.to_string(),
            reader: None,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn parity_letter(parity: Parity) -> char {
    match parity {
        Parity::None => 'N',
        Parity::Odd => 'O',
        Parity::Even => 'E',
    }
}

/// Forward everything read from `port` to `sink` until `stop` is raised.
fn read_loop(mut port: Box<dyn SerialPort>, sink: Sender<Vec<u8>>, stop: Arc<AtomicBool>) {
    let mut buf = [0u8; READ_BUF_SIZE];
    while !stop.load(Ordering::Relaxed) {
        match port.read(&mut buf) {
            Ok(0) => {}
            Ok(n) => {
                if sink.send(buf[..n].to_vec()).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == ErrorKind::TimedOut => {}
            Err(e) => {
                // Dropping the sink surfaces as TransportClosed on the protocol side
                log::error!("Serial read error: {}", e);
                break;
            }
        }
    }
    log::trace!("serial reader stopped");
}

impl Transport for SerialTransport {
    fn write(&mut self, data: &[u8]) -> fwflash_common::Result<()> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn subscribe(&mut self, sink: Sender<Vec<u8>>) -> fwflash_common::Result<()> {
        self.unsubscribe();

        let port = self
            .port
            .try_clone()
            .map_err(|e| Error::Transport(format!("failed to clone {}: {}", self.name, e)))?;
        let stop = Arc::new(AtomicBool::new(false));
        self.stop = Arc::clone(&stop);

        let handle = thread::Builder::new()
            .name("serial-rx".into())
            .spawn(move || read_loop(port, sink, stop))?;
        self.reader = Some(handle);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                log::warn!("serial reader thread panicked");
            }
        }
    }
}

impl Drop for SerialTransport {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Serial ports currently present on the system.
pub fn list_ports() -> Result<Vec<SerialPortInfo>> {
    serialport::available_ports().context("Failed to enumerate serial ports")
}
