//! Error types for the device runtime.

use sd_controls::ControlError;
use sd_core::SdError;
use thiserror::Error;

pub type DeviceResult<T> = Result<T, DeviceError>;

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Command {verb} not supported!")]
    UnsupportedCommand { verb: String },

    #[error("Command {verb} requires {expected} arguments ({params}), got {got}")]
    ArgumentCount {
        verb: &'static str,
        expected: usize,
        params: String,
        got: usize,
    },

    #[error("Failed to execute {verb} command: {source}")]
    CommandFailed {
        verb: &'static str,
        #[source]
        source: Box<DeviceError>,
    },

    #[error("Log level {level} invalid!")]
    InvalidLogLevel { level: u32 },

    #[error("Invalid configuration: {what}")]
    Config { what: &'static str },

    #[error("Invalid state: {what}")]
    State { what: &'static str },

    #[error("Verbosity control failed: {message}")]
    Verbosity { message: String },

    #[error("Socket connection broken")]
    ConnectionClosed,

    #[error(transparent)]
    Core(#[from] SdError),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl DeviceError {
    /// Unknown verb or wrong argument count: the line never reached a handler.
    pub fn is_protocol(&self) -> bool {
        matches!(
            self,
            DeviceError::UnsupportedCommand { .. } | DeviceError::ArgumentCount { .. }
        )
    }
}
