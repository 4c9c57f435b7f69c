// SPDX-License-Identifier: MIT
// Copyright (c) 2026 ADNT Sarl <info@adnt.io>

//! Transport abstraction consumed by the flash protocol.
//!
//! A transport accepts outbound frames through [`Transport::write`] and
//! pushes inbound bytes, in arrival order and in arbitrary chunk sizes, into
//! the channel handed to [`Transport::subscribe`].

use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::target::MemoryTarget;

/// Byte-oriented link to a target device.
pub trait Transport {
    /// Queue `data` for sending. Returns once the bytes were accepted.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Start delivering inbound chunks to `sink`, replacing any previous
    /// subscriber.
    fn subscribe(&mut self, sink: Sender<Vec<u8>>) -> Result<()>;

    /// Stop delivering inbound chunks. Calling it twice is harmless.
    fn unsubscribe(&mut self);
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        (**self).write(data)
    }

    fn subscribe(&mut self, sink: Sender<Vec<u8>>) -> Result<()> {
        (**self).subscribe(sink)
    }

    fn unsubscribe(&mut self) {
        (**self).unsubscribe()
    }
}

/// In-process transport wired straight to an emulated [`MemoryTarget`].
///
/// Every `write` is treated as one complete request frame; the response is
/// delivered synchronously to the subscriber.
pub struct LoopbackTransport {
    target: Arc<Mutex<MemoryTarget>>,
    sink: Option<Sender<Vec<u8>>>,
    chunk_size: Option<usize>,
    hold_next: bool,
    held: Vec<u8>,
}

impl LoopbackTransport {
    pub fn new(target: MemoryTarget) -> Self {
        Self {
            target: Arc::new(Mutex::new(target)),
            sink: None,
            chunk_size: None,
            hold_next: false,
            held: Vec::new(),
        }
    }

    /// Deliver responses in pieces of at most `size` bytes.
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = Some(size.max(1));
        self
    }

    /// Shared handle to the emulated target, for inspection.
    pub fn target(&self) -> Arc<Mutex<MemoryTarget>> {
        Arc::clone(&self.target)
    }

    /// Keep the next response back until [`release_held`](Self::release_held).
    pub fn hold_next_response(&mut self) {
        self.hold_next = true;
    }

    /// Deliver a previously held response, simulating a late reply.
    pub fn release_held(&mut self) {
        let held = std::mem::take(&mut self.held);
        self.deliver(&held);
    }

    fn deliver(&self, bytes: &[u8]) {
        let Some(sink) = &self.sink else {
            log::trace!("loopback: no subscriber, dropping {} bytes", bytes.len());
            return;
        };
        let size = self.chunk_size.unwrap_or(bytes.len()).max(1);
        for chunk in bytes.chunks(size) {
            if sink.send(chunk.to_vec()).is_err() {
                log::trace!("loopback: subscriber gone");
                return;
            }
        }
    }
}

impl Transport for LoopbackTransport {
    fn write(&mut self, data: &[u8]) -> Result<()> {
        let response = self
            .target
            .lock()
            .map_err(|_| Error::Transport("emulated target lock poisoned".into()))?
            .handle_frame(data);

        if std::mem::take(&mut self.hold_next) {
            self.held = response;
        } else {
            self.deliver(&response);
        }
        Ok(())
    }

    fn subscribe(&mut self, sink: Sender<Vec<u8>>) -> Result<()> {
        self.sink = Some(sink);
        Ok(())
    }

    fn unsubscribe(&mut self) {
        self.sink = None;
    }
}
