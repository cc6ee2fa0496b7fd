use std::io;
use thiserror::Error;

/// Failures surfaced by the byte channel layer.
///
/// A missing port is not an error: channel operations report it as skipped.
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Port {0} is already owned by another channel")]
    PortInUse(String),
    #[error("Failed to open port {port}: {reason}")]
    OpenFailed { port: String, reason: String },
    #[error("IO error on port {port}: {source}")]
    Io {
        port: String,
        #[source]
        source: io::Error,
    },
}

impl ChannelError {
    pub fn io(port: &str, source: io::Error) -> Self {
        ChannelError::Io {
            port: port.to_string(),
            source,
        }
    }
}

/// Failures while loading a rig configuration file.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: io::Error,
    },
    #[cfg(feature = "serde")]
    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Invalid config: {0}")]
    Invalid(String),
}
