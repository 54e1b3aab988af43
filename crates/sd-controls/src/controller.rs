//! PID-assisted ramp controller.
//!
//! The controller output is a *rate*: how far the readback moves this tick.
//! It is clamped to `±rate_limit`, so the PID shape only matters while the
//! channel is close to its setpoint; far away it degenerates into the plain
//! ramp.
//!
//! - proportional and integral terms act on the signed error `sp - pv`
//! - the integral accumulates once per tick (ramp rates are per tick)
//! - the derivative acts on the measurement, `(pv_prev - pv) / dt`
//! - conditional anti-windup: the accumulator is frozen while saturated

use crate::error::{ControlError, ControlResult};
use sd_core::Real;
use serde::{Deserialize, Serialize};

/// Controller gains, adjustable at runtime with `SETPID`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PidGains {
    /// Proportional gain.
    pub kp: Real,
    /// Integral gain (per tick).
    pub ki: Real,
    /// Derivative gain.
    pub kd: Real,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 1.0,
            ki: 0.0,
            kd: 0.0,
        }
    }
}

impl PidGains {
    /// Create a gain set.
    ///
    /// # Errors
    ///
    /// Returns error if any gain is NaN or infinite.
    pub fn new(kp: Real, ki: Real, kd: Real) -> ControlResult<Self> {
        for (what, value) in [("kp", kp), ("ki", ki), ("kd", kd)] {
            if !value.is_finite() {
                return Err(ControlError::NonFinite { what, value });
            }
        }
        Ok(Self { kp, ki, kd })
    }

    /// Compute the rate to apply this tick.
    ///
    /// # Arguments
    ///
    /// * `state` - Controller state (accumulator and previous readback)
    /// * `pv` - Current readback
    /// * `sp` - Setpoint
    /// * `rate_limit` - Configured ramp rate; output is clamped to `±rate_limit`
    /// * `dt` - Poll interval in seconds
    ///
    /// # Returns
    ///
    /// Updated state and the signed rate.
    pub fn update(
        &self,
        state: &PidState,
        pv: Real,
        sp: Real,
        rate_limit: Real,
        dt: Real,
    ) -> (PidState, Real) {
        let error = sp - pv;

        let p_term = self.kp * error;

        let new_accumulator = state.accumulator + error;
        let i_term = self.ki * new_accumulator;

        // First tick after construction has no history: no derivative kick.
        let previous = state.previous_readback.unwrap_or(pv);
        let d_term = if dt > 0.0 {
            self.kd * (previous - pv) / dt
        } else {
            0.0
        };

        // Extreme gains can overflow to `inf - inf`; NaN must never reach the readback.
        let output_raw = p_term + i_term + d_term;
        let output = if output_raw.is_nan() {
            0.0
        } else {
            output_raw.clamp(-rate_limit, rate_limit)
        };

        let accumulator = if output == output_raw {
            new_accumulator
        } else {
            state.accumulator
        };

        let new_state = PidState {
            accumulator,
            previous_readback: Some(pv),
        };

        (new_state, output)
    }
}

/// PID controller state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PidState {
    /// Integral accumulator (sum of per-tick errors).
    pub accumulator: Real,
    /// Readback seen on the previous PID tick.
    pub previous_readback: Option<Real>,
}
