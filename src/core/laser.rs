//! Laser controllers.
//!
//! Two wire families share one capability set (power get/set, on, off). The
//! family is chosen once, at construction, from [`LaserKind`].

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channel::{ByteChannel, PortOpener};
use crate::config::{LaserConfig, LaserKind};
use crate::error::ChannelError;
use crate::protocol::{
    decode_bool, decode_float, decode_hex_ratio, encode_hex_ratio, CommandPort, Dialect,
    ReplyLayout,
};

/// Hex digits in a family A power setpoint (12-bit full scale).
pub const POWER_RATIO_DIGITS: usize = 3;

fn valid_ratio(ratio: f32) -> bool {
    (0.0..=1.0).contains(&ratio)
}

// ─────────────────────────────────────────────────────────────────────────
// Family A: `?CMD` requests, `!CMD<payload>` replies.
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Omicron {
    port: CommandPort,
    max_power: f32,
    is_on: Option<bool>,
}

impl Omicron {
    pub fn open(cfg: &LaserConfig, ports: Arc<dyn PortOpener>) -> Result<Self, ChannelError> {
        let channel = ByteChannel::new(&cfg.port, cfg.serial_settings(), ports)?;
        Ok(Self {
            port: CommandPort::new(channel, Dialect::QUERY_REPLY, cfg.budget()),
            max_power: cfg.max_power,
            is_on: None,
        })
    }

    /// Typically acknowledged within 30-150 ms.
    pub fn laser_on(&mut self) -> bool {
        let ok = self.port.exchange("LOn").is_some();
        if ok {
            self.is_on = Some(true);
        }
        ok
    }

    pub fn laser_off(&mut self) -> bool {
        let ok = self.port.exchange("LOf").is_some();
        if ok {
            self.is_on = Some(false);
        }
        ok
    }

    /// Controller power; no reply is awaited.
    pub fn power_on(&mut self) -> bool {
        self.port.send("POn")
    }

    pub fn power_off(&mut self) -> bool {
        self.port.send("POf")
    }

    pub fn power_ratio(&mut self) -> Option<f32> {
        self.port.query("GLP", decode_hex_ratio)
    }

    /// Out-of-range ratios are dropped before anything reaches the wire.
    pub fn set_power_ratio(&mut self, ratio: f32) -> bool {
        match encode_hex_ratio(ratio, POWER_RATIO_DIGITS) {
            Some(hex) => self.port.send(&format!("SLP{hex}")),
            None => {
                debug!(port = %self.port.channel().name(), ratio, "power ratio out of range; not sent");
                false
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Family B: plain commands, echoed queries, decimal watts.
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Cobolt {
    port: CommandPort,
    max_power: f32,
    is_on: Option<bool>,
}

impl Cobolt {
    pub fn open(cfg: &LaserConfig, ports: Arc<dyn PortOpener>) -> Result<Self, ChannelError> {
        let channel = ByteChannel::new(&cfg.port, cfg.serial_settings(), ports)?;
        Ok(Self {
            port: CommandPort::new(channel, Dialect::ECHO_LINE, cfg.budget()),
            max_power: cfg.max_power,
            is_on: None,
        })
    }

    pub fn laser_on(&mut self) -> bool {
        let budget = self.port.budget();
        let ok = self.port.exchange_with("l1", ReplyLayout::Bare, budget).is_some();
        if ok {
            self.is_on = Some(true);
        }
        ok
    }

    pub fn laser_off(&mut self) -> bool {
        let budget = self.port.budget();
        let ok = self.port.exchange_with("l0", ReplyLayout::Bare, budget).is_some();
        if ok {
            self.is_on = Some(false);
        }
        ok
    }

    pub fn clear_fault(&mut self) -> bool {
        self.port.send("cf")
    }

    pub fn auto_start(&mut self) -> Option<bool> {
        self.port.query_with("@cobas?", ReplyLayout::Bare, decode_bool)
    }

    pub fn set_auto_start(&mut self, enabled: bool) -> bool {
        self.port.send(&format!("@cobas {}", u8::from(enabled)))
    }

    /// Output power in watts as a fraction of `max_power`.
    pub fn power_ratio(&mut self) -> Option<f32> {
        let watts = self.port.query("p?", decode_float)?;
        Some(watts / self.max_power)
    }

    pub fn set_power_ratio(&mut self, ratio: f32) -> bool {
        if !valid_ratio(ratio) {
            debug!(port = %self.port.channel().name(), ratio, "power ratio out of range; not sent");
            return false;
        }
        self.port.send(&format!("p {}", ratio * self.max_power))
    }
}

// ─────────────────────────────────────────────────────────────────────────
// Family selection
// ─────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub enum Laser {
    Omicron(Omicron),
    Cobolt(Cobolt),
}

impl Laser {
    pub fn open(cfg: &LaserConfig, ports: Arc<dyn PortOpener>) -> Result<Self, ChannelError> {
        if !(cfg.max_power > 0.0) {
            warn!(port = %cfg.port, max_power = cfg.max_power, "non-positive max_power; ratios will be meaningless");
        }
        Ok(match cfg.kind {
            LaserKind::Omicron => Laser::Omicron(Omicron::open(cfg, ports)?),
            LaserKind::Cobolt => Laser::Cobolt(Cobolt::open(cfg, ports)?),
        })
    }

    pub fn kind(&self) -> LaserKind {
        match self {
            Laser::Omicron(_) => LaserKind::Omicron,
            Laser::Cobolt(_) => LaserKind::Cobolt,
        }
    }

    fn port(&self) -> &CommandPort {
        match self {
            Laser::Omicron(l) => &l.port,
            Laser::Cobolt(l) => &l.port,
        }
    }

    pub fn port_name(&self) -> &str {
        self.port().channel().name()
    }

    pub fn max_power(&self) -> f32 {
        match self {
            Laser::Omicron(l) => l.max_power,
            Laser::Cobolt(l) => l.max_power,
        }
    }

    /// Last on/off state the device acknowledged, if any.
    pub fn is_on(&self) -> Option<bool> {
        match self {
            Laser::Omicron(l) => l.is_on,
            Laser::Cobolt(l) => l.is_on,
        }
    }

    pub fn laser_on(&mut self) -> bool {
        match self {
            Laser::Omicron(l) => l.laser_on(),
            Laser::Cobolt(l) => l.laser_on(),
        }
    }

    pub fn laser_off(&mut self) -> bool {
        match self {
            Laser::Omicron(l) => l.laser_off(),
            Laser::Cobolt(l) => l.laser_off(),
        }
    }

    pub fn power_ratio(&mut self) -> Option<f32> {
        match self {
            Laser::Omicron(l) => l.power_ratio(),
            Laser::Cobolt(l) => l.power_ratio(),
        }
    }

    pub fn set_power_ratio(&mut self, ratio: f32) -> bool {
        match self {
            Laser::Omicron(l) => l.set_power_ratio(ratio),
            Laser::Cobolt(l) => l.set_power_ratio(ratio),
        }
    }

    /// Setpoint in watts, converted through `max_power`.
    pub fn set_power(&mut self, watts: f32) -> bool {
        let ratio = watts / self.max_power();
        self.set_power_ratio(ratio)
    }

    /// Release the port early; dropping the laser does the same.
    pub fn close(&mut self) {
        match self {
            Laser::Omicron(l) => l.port.channel_mut().close(),
            Laser::Cobolt(l) => l.port.channel_mut().close(),
        }
    }
}
