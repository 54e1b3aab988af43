//! Scalar type and the token parsers behind every numeric command argument.

use crate::SdError;

/// Scalar used for setpoints, readbacks, rates and gains.
pub type Real = f64;

/// Reject NaN and infinities.
pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, SdError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(SdError::NonFinite { what, value: v })
    }
}

/// Parse a protocol token as a finite real.
///
/// Accepts anything `f64::from_str` does (`50`, `-12.5`, `1e2`), then rejects
/// `inf` and `NaN`, which would poison a channel's state.
pub fn parse_real(token: &str, what: &'static str) -> Result<Real, SdError> {
    let value = token.trim().parse::<Real>().map_err(|_| SdError::Parse {
        what,
        value: token.to_string(),
    })?;
    ensure_finite(value, what)
}

pub fn parse_uint(token: &str, what: &'static str) -> Result<u32, SdError> {
    token.trim().parse::<u32>().map_err(|_| SdError::Parse {
        what,
        value: token.to_string(),
    })
}
