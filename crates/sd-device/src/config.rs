//! Device configuration.
//!
//! Every field has a default matching the reference trainer device, so an empty
//! YAML document (or no file at all) yields a working 4-channel device on
//! `127.0.0.1:8888`.

use std::path::Path;
use std::time::Duration;

use sd_controls::{ChannelConfig, PollConfig};
use sd_core::Real;
use serde::{Deserialize, Serialize};

use crate::error::{DeviceError, DeviceResult};

/// Socket and framing settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Interface the listener binds to.
    pub interface: String,
    /// TCP port; 0 asks the OS for a free one.
    pub port: u16,
    /// Marks the end of each received command.
    pub in_terminator: String,
    /// Appended to each response.
    pub out_terminator: String,
    /// Size of the socket read buffer.
    pub read_buffer_size: usize,
    /// Bound on each accept/read wait, so shutdown is noticed.
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            interface: "127.0.0.1".to_string(),
            port: 8888,
            in_terminator: "\n".to_string(),
            out_terminator: "\n".to_string(),
            read_buffer_size: 48,
            timeout_ms: 5_000,
        }
    }
}

impl ConnectionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> DeviceResult<()> {
        if self.in_terminator.is_empty() || self.out_terminator.is_empty() {
            return Err(DeviceError::Config {
                what: "terminators must not be empty",
            });
        }
        if self.read_buffer_size == 0 {
            return Err(DeviceError::Config {
                what: "read_buffer_size must be at least 1",
            });
        }
        if self.timeout_ms == 0 {
            return Err(DeviceError::Config {
                what: "timeout_ms must be positive",
            });
        }
        Ok(())
    }
}

/// Full device configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Model string reported by `*IDN?`.
    pub model: String,
    /// Number of simulated channels.
    pub nchannels: usize,
    /// Time between channel ticks.
    pub poll_interval_ms: u64,
    /// Amplitude of the uniform noise added to `SCLR?`.
    pub scalar_noise_level: Real,
    /// Tuning applied to every channel.
    pub channel: ChannelConfig,
    /// Socket and framing settings.
    pub connection: ConnectionConfig,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            model: "EPICS Trainer".to_string(),
            nchannels: 4,
            poll_interval_ms: 1_000,
            scalar_noise_level: 5.0,
            channel: ChannelConfig::default(),
            connection: ConnectionConfig::default(),
        }
    }
}

impl DeviceConfig {
    /// Parse a YAML document; missing fields take their defaults.
    pub fn from_yaml_str(yaml: &str) -> DeviceResult<Self> {
        let config: DeviceConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a YAML configuration file.
    pub fn load(path: &Path) -> DeviceResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&contents)
    }

    pub fn poll(&self) -> DeviceResult<PollConfig> {
        Ok(PollConfig::from_millis(self.poll_interval_ms)?)
    }

    pub fn validate(&self) -> DeviceResult<()> {
        if self.nchannels == 0 {
            return Err(DeviceError::Config {
                what: "nchannels must be at least 1",
            });
        }
        if u32::try_from(self.nchannels).is_err() {
            return Err(DeviceError::Config {
                what: "nchannels is too large",
            });
        }
        if !self.scalar_noise_level.is_finite() || self.scalar_noise_level < 0.0 {
            return Err(DeviceError::Config {
                what: "scalar_noise_level must be finite and non-negative",
            });
        }
        self.poll()?;
        self.channel.validate()?;
        self.connection.validate()?;
        Ok(())
    }
}
