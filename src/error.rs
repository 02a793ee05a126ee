//! Error handling for the cpu_vitals sampling crate.

use std::path::{Path, PathBuf};

/// A specialized `Result` type for cpu_vitals operations.
pub type Result<T> = std::result::Result<T, SystemError>;

/// The main error type for counter discovery and sampling.
#[derive(Debug, thiserror::Error)]
pub enum SystemError {
    /// A counter root is missing or unreadable at startup. Fatal.
    #[error("discovery failed for {}: {reason}", .path.display())]
    Discovery { path: PathBuf, reason: String },

    /// No hardware-monitoring subsystem/field matched the candidates.
    #[error("sensor unavailable: {0}")]
    SensorUnavailable(String),

    /// A per-tick read of a counter or sensor file failed or was malformed.
    #[error("transient read failure on {origin}: {reason}")]
    TransientRead { origin: String, reason: String },

    /// Counter content parsing failed
    #[error("Failed to parse counter data: {0}")]
    ParseError(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl SystemError {
    /// Create a new discovery error for `path`
    pub fn discovery_error(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Discovery {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }

    /// Create a new sensor-unavailable error
    pub fn sensor_unavailable(msg: impl Into<String>) -> Self {
        Self::SensorUnavailable(msg.into())
    }

    /// Create a new transient read error for the source at `path`
    pub fn transient_read(path: impl AsRef<Path>, reason: impl ToString) -> Self {
        Self::TransientRead {
            origin: path.as_ref().display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a new parse error
    pub fn parse_error(msg: impl Into<String>) -> Self {
        Self::ParseError(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
