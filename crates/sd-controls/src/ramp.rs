//! Ramp-rate bounds and the rate-limited step.
//!
//! A channel's readback never moves faster than its configured ramp rate. The
//! configured rate itself is bounded: requests above the maximum clamp to the
//! maximum, requests below the floor (including negative ones) lift to the
//! floor so a ramping channel always makes progress.

use crate::error::{ControlError, ControlResult};
use sd_core::Real;
use serde::{Deserialize, Serialize};

/// Allowed range for a channel's configured ramp rate (units per tick).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RampLimits {
    /// Smallest rate a channel may be configured with, must be positive.
    pub min_rate: Real,
    /// Largest rate a channel may be configured with.
    pub max_rate: Real,
}

impl RampLimits {
    /// Create ramp limits.
    ///
    /// # Errors
    ///
    /// Returns error unless `0 < min_rate <= max_rate`.
    pub fn new(min_rate: Real, max_rate: Real) -> ControlResult<Self> {
        if !(min_rate > 0.0) {
            return Err(ControlError::InvalidArg {
                what: "min ramp rate must be positive",
            });
        }
        if !(max_rate >= min_rate) || !max_rate.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "max ramp rate must be finite and at least the min ramp rate",
            });
        }
        Ok(Self { min_rate, max_rate })
    }

    /// Bring a requested rate into range without reporting an error.
    pub fn clamp_rate(&self, requested: Real) -> Real {
        if requested > self.max_rate {
            self.max_rate
        } else if requested < self.min_rate {
            self.min_rate
        } else {
            requested
        }
    }
}

/// Signed step that moves `position` toward `target` by at most `rate`.
///
/// The step never passes the target, so the last step of a ramp is shorter.
pub fn ramp_step(position: Real, target: Real, rate: Real) -> Real {
    (target - position).clamp(-rate, rate)
}
