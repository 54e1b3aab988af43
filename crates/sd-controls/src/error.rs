//! Error types for control-loop operations.

use sd_core::SdError;
use thiserror::Error;

/// Result type for control-loop operations.
pub type ControlResult<T> = Result<T, ControlError>;

/// Errors that can occur in control-loop operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlError {
    /// Invalid argument provided to a control function.
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    /// A NaN or infinite value was offered where a real number is required.
    #[error("Non-finite value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },
}

impl From<SdError> for ControlError {
    fn from(e: SdError) -> Self {
        match e {
            SdError::NonFinite { what, value } => ControlError::NonFinite { what, value },
            SdError::IndexOob { what, .. } | SdError::Parse { what, .. } => ControlError::InvalidArg { what },
        }
    }
}
