//! Timed Byte Channel.
//!
//! Wraps one named serial port. Inbound bytes are appended to a receive
//! accumulator that persists across reads until it is explicitly drained or
//! cleared, so a reply that arrives in fragments can be matched as a whole.
//!
//! Hardware is optional: when the named port does not exist, reads and writes
//! are skipped instead of failing.

use std::io;
use std::sync::{Arc, Mutex, OnceLock};

use hashbrown::HashSet;
use tracing::{debug, info, warn};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::ChannelError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Parity {
    #[default]
    None,
    Odd,
    Even,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum StopBits {
    #[default]
    One,
    Two,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FlowControl {
    #[default]
    None,
    Software,
    Hardware,
}

/// Line settings applied when the port is opened.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SerialSettings {
    pub baud_rate: u32,
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
    /// Appended by [`ByteChannel::write_line`].
    pub newline: String,
    pub write_timeout_ms: u64,
}

impl SerialSettings {
    pub fn with_baud(baud_rate: u32) -> Self {
        Self {
            baud_rate,
            ..Self::default()
        }
    }

    pub fn newline_bytes(&self) -> &[u8] {
        self.newline.as_bytes()
    }
}

impl Default for SerialSettings {
    fn default() -> Self {
        Self {
            baud_rate: 9600,
            parity: Parity::None,
            data_bits: 8,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
            newline: "\r".to_string(),
            write_timeout_ms: 1000,
        }
    }
}

/// Raw byte transport behind a channel (a serial port, or an in-memory loopback).
pub trait Transport: Send {
    /// Append every byte that has already arrived to `buf`. Must not block.
    fn read_available(&mut self, buf: &mut Vec<u8>) -> io::Result<usize>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Discard bytes received by the driver but not yet read.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Discard bytes queued for transmission.
    fn clear_output(&mut self) -> io::Result<()>;
}

/// Resolves port names to transports.
pub trait PortOpener: Send + Sync {
    fn port_exists(&self, name: &str) -> bool;

    fn open(
        &self,
        name: &str,
        settings: &SerialSettings,
    ) -> Result<Box<dyn Transport>, ChannelError>;
}

fn owned_ports() -> &'static Mutex<HashSet<String>> {
    static OWNED: OnceLock<Mutex<HashSet<String>>> = OnceLock::new();
    OWNED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Exclusive claim on a port name for the lifetime of one channel.
#[derive(Debug)]
struct PortLease {
    name: String,
}

impl PortLease {
    fn acquire(name: &str) -> Result<Self, ChannelError> {
        let mut owned = owned_ports().lock().unwrap_or_else(|e| e.into_inner());
        if !owned.insert(name.to_string()) {
            return Err(ChannelError::PortInUse(name.to_string()));
        }
        Ok(Self {
            name: name.to_string(),
        })
    }
}

impl Drop for PortLease {
    fn drop(&mut self) {
        let mut owned = owned_ports().lock().unwrap_or_else(|e| e.into_inner());
        owned.remove(&self.name);
    }
}

/// Returns true while some live channel owns `name`.
pub fn is_port_owned(name: &str) -> bool {
    owned_ports()
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .contains(name)
}

pub struct ByteChannel {
    name: String,
    settings: SerialSettings,
    ports: Arc<dyn PortOpener>,
    transport: Option<Box<dyn Transport>>,
    received: Vec<u8>,
    _lease: PortLease,
}

impl std::fmt::Debug for ByteChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ByteChannel")
            .field("name", &self.name)
            .field("settings", &self.settings)
            .field("open", &self.transport.is_some())
            .field("received", &self.received.len())
            .finish()
    }
}

impl ByteChannel {
    /// Claim `name` for this channel. The port itself is opened lazily.
    pub fn new(
        name: &str,
        settings: SerialSettings,
        ports: Arc<dyn PortOpener>,
    ) -> Result<Self, ChannelError> {
        let lease = PortLease::acquire(name)?;
        Ok(Self {
            name: name.to_string(),
            settings,
            ports,
            transport: None,
            received: Vec::with_capacity(256),
            _lease: lease,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn settings(&self) -> &SerialSettings {
        &self.settings
    }

    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    pub fn port_exists(&self) -> bool {
        self.ports.port_exists(&self.name)
    }

    /// Open the port if it exists. `Ok(false)` means the port is absent.
    pub fn open(&mut self) -> Result<bool, ChannelError> {
        if self.transport.is_some() {
            return Ok(true);
        }
        if !self.port_exists() {
            debug!(port = %self.name, "port absent; skipping open");
            return Ok(false);
        }
        let transport = self.ports.open(&self.name, &self.settings)?;
        info!(port = %self.name, baud = self.settings.baud_rate, "port opened");
        self.transport = Some(transport);
        Ok(true)
    }

    /// Safe to call any number of times.
    pub fn close(&mut self) {
        if self.transport.take().is_some() {
            info!(port = %self.name, "port closed");
        }
    }

    /// A failed transport is dropped so the next operation reopens it.
    fn fail(&mut self, source: io::Error) -> ChannelError {
        warn!(port = %self.name, error = %source, "transport failure; closing port");
        self.transport = None;
        ChannelError::io(&self.name, source)
    }

    /// Write raw bytes. Returns `Ok(false)` when the port is absent.
    pub fn write(&mut self, data: &[u8]) -> Result<bool, ChannelError> {
        if !self.open()? {
            return Ok(false);
        }
        let result = match self.transport.as_mut() {
            Some(t) => t.write_all(data),
            None => return Ok(false),
        };
        match result {
            Ok(()) => Ok(true),
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Write `text` followed by the configured newline.
    pub fn write_line(&mut self, text: &str) -> Result<bool, ChannelError> {
        let mut line = Vec::with_capacity(text.len() + self.settings.newline.len());
        line.extend_from_slice(text.as_bytes());
        line.extend_from_slice(self.settings.newline_bytes());
        self.write(&line)
    }

    /// Pull newly arrived bytes into the accumulator and return all of it.
    ///
    /// The returned slice includes bytes from earlier reads that have not been
    /// drained or cleared.
    pub fn read(&mut self) -> Result<&[u8], ChannelError> {
        if !self.open()? {
            return Ok(&self.received);
        }
        let result = match self.transport.as_mut() {
            Some(t) => t.read_available(&mut self.received),
            None => Ok(0),
        };
        if let Err(e) = result {
            return Err(self.fail(e));
        }
        Ok(&self.received)
    }

    /// Consume one complete line from the accumulator, without its newline.
    /// Returns `None` until a full line has arrived.
    pub fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        self.read()?;
        let newline = self.settings.newline.as_bytes();
        if newline.is_empty() {
            return Ok(None);
        }
        let Some(at) = self
            .received
            .windows(newline.len())
            .position(|w| w == newline)
        else {
            return Ok(None);
        };
        let line = String::from_utf8_lossy(&self.received[..at]).into_owned();
        self.received.drain(..at + newline.len());
        Ok(Some(line))
    }

    /// Bytes accumulated so far, without touching the transport.
    pub fn received(&self) -> &[u8] {
        &self.received
    }

    /// Take the accumulator, leaving it empty.
    pub fn drain_input(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.received)
    }

    /// Empty the accumulator and discard unread bytes in the transport.
    pub fn clear_input(&mut self) -> Result<(), ChannelError> {
        self.received.clear();
        let result = match self.transport.as_mut() {
            Some(t) => t.clear_input(),
            None => Ok(()),
        };
        result.map_err(|e| self.fail(e))
    }

    pub fn clear_output(&mut self) -> Result<(), ChannelError> {
        let result = match self.transport.as_mut() {
            Some(t) => t.clear_output(),
            None => Ok(()),
        };
        result.map_err(|e| self.fail(e))
    }
}

impl Drop for ByteChannel {
    fn drop(&mut self) {
        self.close();
    }
}
