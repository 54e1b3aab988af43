use thiserror::Error;

pub type SdResult<T> = Result<T, SdError>;

/// Failures turning protocol tokens into values.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SdError {
    #[error("Non-finite numeric value for {what}: {value}")]
    NonFinite { what: &'static str, value: f64 },

    #[error("{what} {index} out of range (1..={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Could not parse {what} from {value:?}")]
    Parse { what: &'static str, value: String },
}
