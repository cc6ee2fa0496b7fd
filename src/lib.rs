//! # taskrig
//!
//! Hardware side of a closed-loop behavioral rig: serial byte channels,
//! bounded spin-wait polling, and per-family command/response drivers for
//! lasers and GPIO boards.
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use taskrig::prelude::*;
//!
//! // Scripted ports stand in for hardware.
//! let ports = LoopbackPorts::new();
//! ports.attach("COM3", |line: &[u8]| {
//!     if line == b"?GLP" {
//!         Some(b"!GLP800\r".to_vec())
//!     } else {
//!         None
//!     }
//! });
//!
//! let cfg = LaserConfig::omicron("COM3");
//! let mut laser = Laser::open(&cfg, Arc::new(ports)).unwrap();
//! let ratio = laser.power_ratio().unwrap();
//! assert!((ratio - 0x800 as f32 / 0xFFF as f32).abs() < 1e-6);
//! ```
//!
//! ## Feature Flags
//!
//! - `serial` (default): native serial backend via the `serialport` crate
//! - `serde` (default): configuration (de)serialization
//!
//! ## Modules
//!
//! - [`channel`]: Timed Byte Channel with an explicit receive accumulator
//! - [`poller`]: Timeout Poller (bounded busy-wait)
//! - [`protocol`]: echo matching, reply extraction and payload codecs
//! - [`laser`] / [`gpio`]: device drivers per wire family
//! - [`loopback`]: in-memory transport for running without hardware

#[path = "core/error.rs"]
pub mod error;

#[path = "core/channel.rs"]
pub mod channel;

#[path = "core/loopback.rs"]
pub mod loopback;

#[cfg(feature = "serial")]
#[path = "core/serial.rs"]
pub mod serial;

#[path = "core/poller.rs"]
pub mod poller;

#[path = "core/protocol.rs"]
pub mod protocol;

#[path = "core/laser.rs"]
pub mod laser;

#[path = "core/gpio.rs"]
pub mod gpio;

#[path = "core/config.rs"]
pub mod config;

/// Prelude module for convenient imports.
///
/// ```
/// use taskrig::prelude::*;
/// ```
pub mod prelude {
    pub use crate::channel::{ByteChannel, PortOpener, SerialSettings, Transport};
    pub use crate::config::{GpioConfig, HardwareConfig, LaserConfig, LaserKind};
    pub use crate::error::{ChannelError, ConfigError};
    pub use crate::gpio::SerialGpio;
    pub use crate::laser::{Cobolt, Laser, Omicron};
    pub use crate::loopback::LoopbackPorts;
    pub use crate::poller::{CancelToken, PollOutcome, TimeoutPoller};
    pub use crate::protocol::{CommandPort, Dialect, ReplyLayout};
    #[cfg(feature = "serial")]
    pub use crate::serial::SystemPorts;
}
