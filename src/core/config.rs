//! Hardware configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::channel::SerialSettings;
use crate::error::ConfigError;

/// Wire family of a laser controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum LaserKind {
    /// `?CMD` / `!CMD<payload>` query-reply, 12-bit hex power ratio.
    Omicron,
    /// Plain commands, decimal watts, `0`/`1` flags.
    Cobolt,
}

impl LaserKind {
    pub fn name(self) -> &'static str {
        match self {
            LaserKind::Omicron => "omicron",
            LaserKind::Cobolt => "cobolt",
        }
    }

    pub fn default_baud(self) -> u32 {
        match self {
            LaserKind::Omicron => 500_000,
            LaserKind::Cobolt => 115_200,
        }
    }

    pub fn default_timeout_ms(self) -> f64 {
        match self {
            LaserKind::Omicron => 150.0,
            LaserKind::Cobolt => 1.0,
        }
    }
}

pub(crate) fn budget_from_ms(ms: f64) -> Duration {
    Duration::from_nanos((ms.max(0.0) * 1_000_000.0).round() as u64)
}

fn default_max_power() -> f32 {
    0.1
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LaserConfig {
    pub kind: LaserKind,
    pub port: String,
    /// Family default when unset.
    #[cfg_attr(feature = "serde", serde(default))]
    pub baud_rate: Option<u32>,
    /// Watts at a power ratio of 1.
    #[cfg_attr(feature = "serde", serde(default = "default_max_power"))]
    pub max_power: f32,
    /// Reply budget per exchange; family default when unset.
    #[cfg_attr(feature = "serde", serde(default))]
    pub timeout_ms: Option<f64>,
}

impl LaserConfig {
    pub fn new(kind: LaserKind, port: &str) -> Self {
        Self {
            kind,
            port: port.to_string(),
            baud_rate: None,
            max_power: default_max_power(),
            timeout_ms: None,
        }
    }

    pub fn omicron(port: &str) -> Self {
        Self::new(LaserKind::Omicron, port)
    }

    pub fn cobolt(port: &str) -> Self {
        Self::new(LaserKind::Cobolt, port)
    }

    pub fn with_timeout_ms(mut self, ms: f64) -> Self {
        self.timeout_ms = Some(ms);
        self
    }

    pub fn with_max_power(mut self, watts: f32) -> Self {
        self.max_power = watts;
        self
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::with_baud(self.baud_rate.unwrap_or(self.kind.default_baud()))
    }

    pub fn budget(&self) -> Duration {
        budget_from_ms(self.timeout_ms.unwrap_or(self.kind.default_timeout_ms()))
    }
}

fn default_gpio_baud() -> u32 {
    9600
}

fn default_channels() -> usize {
    32
}

fn default_gpio_timeout_ms() -> f64 {
    1.0
}

fn default_pulse_ms() -> f64 {
    50.0
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GpioConfig {
    pub port: String,
    #[cfg_attr(feature = "serde", serde(default = "default_gpio_baud"))]
    pub baud_rate: u32,
    #[cfg_attr(feature = "serde", serde(default = "default_channels"))]
    pub channels: usize,
    #[cfg_attr(feature = "serde", serde(default = "default_gpio_timeout_ms"))]
    pub timeout_ms: f64,
    /// Output line pulsed to deliver a reward.
    #[cfg_attr(feature = "serde", serde(default))]
    pub reward_channel: Option<u32>,
    /// Output line pulsed to deliver a punishment.
    #[cfg_attr(feature = "serde", serde(default))]
    pub punish_channel: Option<u32>,
    #[cfg_attr(feature = "serde", serde(default = "default_pulse_ms"))]
    pub pulse_ms: f64,
}

impl GpioConfig {
    pub fn new(port: &str) -> Self {
        Self {
            port: port.to_string(),
            baud_rate: default_gpio_baud(),
            channels: default_channels(),
            timeout_ms: default_gpio_timeout_ms(),
            reward_channel: None,
            punish_channel: None,
            pulse_ms: default_pulse_ms(),
        }
    }

    pub fn with_channels(mut self, channels: usize) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_timeout_ms(mut self, ms: f64) -> Self {
        self.timeout_ms = ms;
        self
    }

    pub fn serial_settings(&self) -> SerialSettings {
        SerialSettings::with_baud(self.baud_rate)
    }

    pub fn budget(&self) -> Duration {
        budget_from_ms(self.timeout_ms)
    }

    pub fn pulse(&self) -> Duration {
        budget_from_ms(self.pulse_ms)
    }
}

/// Every device a rig may drive. All of them are optional.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HardwareConfig {
    #[cfg_attr(feature = "serde", serde(default))]
    pub lasers: Vec<LaserConfig>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub gpio: Option<GpioConfig>,
}

#[cfg(feature = "serde")]
impl HardwareConfig {
    pub fn from_json_str(json: &str, origin: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }
}

impl HardwareConfig {
    /// Reject configurations that would put two drivers on one port.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = hashbrown::HashSet::new();
        let ports = self
            .lasers
            .iter()
            .map(|l| l.port.as_str())
            .chain(self.gpio.iter().map(|g| g.port.as_str()));
        for port in ports {
            if !seen.insert(port) {
                return Err(ConfigError::Invalid(format!(
                    "port {port} is assigned to more than one device"
                )));
            }
        }
        for laser in &self.lasers {
            if !(laser.max_power > 0.0) {
                return Err(ConfigError::Invalid(format!(
                    "laser on {} needs a positive max_power",
                    laser.port
                )));
            }
        }
        if let Some(gpio) = &self.gpio {
            if gpio.channels == 0 || gpio.channels % 4 != 0 {
                return Err(ConfigError::Invalid(format!(
                    "gpio channel count {} is not a positive multiple of 4",
                    gpio.channels
                )));
            }
        }
        Ok(())
    }
}
