//! Daemon configuration and errors.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use taskrig::config::HardwareConfig;
use taskrig::error::{ChannelError, ConfigError};
use taskrig_tasks::foraging::ForagingTiming;
use taskrig_tasks::vision_to_motion::AxisTaskTiming;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum RigdError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Channel(#[from] ChannelError),

    #[error("{0}")]
    Usage(String),

    #[error("could not determine data directory")]
    NoDataDir,

    #[error("failed to create data directory {path}: {source}")]
    DataDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    VisionToMotion,
    VisualForaging,
}

fn default_tick_hz() -> f64 {
    500.0
}

fn default_task() -> TaskKind {
    TaskKind::VisionToMotion
}

fn default_stage() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RigConfig {
    #[serde(default = "default_tick_hz")]
    pub tick_hz: f64,
    #[serde(default = "default_task")]
    pub task: TaskKind,
    /// Starting stage; the daemon never changes it on its own.
    #[serde(default = "default_stage")]
    pub stage: u32,
    /// Fixed seed for the duration draws; taken from the clock when absent.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Applied to every laser after it is switched on.
    #[serde(default)]
    pub laser_power_ratio: Option<f32>,
    #[serde(default)]
    pub axis_timing: AxisTaskTiming,
    #[serde(default)]
    pub foraging_timing: ForagingTiming,
    #[serde(flatten)]
    pub hardware: HardwareConfig,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            task: default_task(),
            stage: default_stage(),
            seed: None,
            laser_power_ratio: None,
            axis_timing: AxisTaskTiming::default(),
            foraging_timing: ForagingTiming::default(),
            hardware: HardwareConfig::default(),
        }
    }
}

impl RigConfig {
    pub fn from_json_str(json: &str, origin: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&json, &path.display().to_string())
    }

    /// Like [`RigConfig::load`], but a missing file yields the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            warn!(path = %path.display(), "no config file; using defaults");
            return Ok(Self::default());
        }
        Self::load(path)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.tick_hz > 0.0 && self.tick_hz <= 10_000.0) {
            return Err(ConfigError::Invalid(format!(
                "tick_hz {} is outside (0, 10000]",
                self.tick_hz
            )));
        }
        if let Some(r) = self.laser_power_ratio {
            if !(0.0..=1.0).contains(&r) {
                return Err(ConfigError::Invalid(format!(
                    "laser_power_ratio {r} is outside [0, 1]"
                )));
            }
        }
        self.hardware.validate()
    }
}
