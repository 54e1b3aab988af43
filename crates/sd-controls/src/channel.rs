//! Per-channel control-loop state machine.
//!
//! A channel is either **AtRest** (`|setpoint - readback| <= tolerance`) or
//! **Ramping**. There is no stored state variable; the two are told apart by
//! the tolerance test each time it matters.
//!
//! Each [`ChannelState::tick`]:
//! 1. Ramping: move readback by the plain ramp step or the PID rate
//! 2. AtRest: live ramp rate drops to 0
//! 3. Readback is clamped to `[min_val, max_val]` (a hard wall)

use crate::controller::{PidGains, PidState};
use crate::error::{ControlError, ControlResult};
use crate::ramp::{RampLimits, ramp_step};
use sd_core::{ChannelId, Real, ensure_finite};
use serde::{Deserialize, Serialize};

/// Strategy used to move readback toward setpoint while ramping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlMode {
    /// Move by exactly the ramp rate per tick, never past the setpoint.
    #[default]
    Ramp,
    /// PID-computed rate, clamped to `±ramp_rate`.
    Pid,
}

/// Tuning shared by every channel of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Ramp rate a channel starts with (units per tick).
    pub initial_ramp_rate: Real,
    /// Ceiling for the configured ramp rate.
    pub max_ramp_rate: Real,
    /// Floor for the configured ramp rate; negative requests lift to this.
    pub min_ramp_rate: Real,
    /// Lower wall for setpoint and readback.
    pub min_val: Real,
    /// Upper wall for setpoint and readback.
    pub max_val: Real,
    /// At-rest band around the setpoint.
    pub tolerance: Real,
    /// Gains a channel starts with.
    pub gains: PidGains,
    /// Ramping strategy.
    pub mode: ControlMode,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            initial_ramp_rate: 1.0,
            max_ramp_rate: 20.0,
            min_ramp_rate: 0.001,
            min_val: -100.0,
            max_val: 100.0,
            tolerance: 0.001,
            gains: PidGains::default(),
            mode: ControlMode::Ramp,
        }
    }
}

impl ChannelConfig {
    /// Check the configuration describes a usable channel.
    pub fn validate(&self) -> ControlResult<()> {
        self.ramp_limits()?;
        ensure_finite(self.min_val, "min_val")?;
        ensure_finite(self.max_val, "max_val")?;
        if self.min_val >= self.max_val {
            return Err(ControlError::InvalidArg {
                what: "min_val must be less than max_val",
            });
        }
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(ControlError::InvalidArg {
                what: "tolerance must be positive",
            });
        }
        ensure_finite(self.initial_ramp_rate, "initial_ramp_rate")?;
        PidGains::new(self.gains.kp, self.gains.ki, self.gains.kd)?;
        Ok(())
    }

    /// Ramp-rate bounds derived from this configuration.
    pub fn ramp_limits(&self) -> ControlResult<RampLimits> {
        RampLimits::new(self.min_ramp_rate, self.max_ramp_rate)
    }
}

/// Complete state of one simulated channel.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelState {
    id: ChannelId,
    setpoint: Real,
    readback: Real,
    ramp_rate: Real,
    live_ramp_rate: Real,
    gains: PidGains,
    pid: PidState,
    limits: RampLimits,
    min_val: Real,
    max_val: Real,
    tolerance: Real,
    mode: ControlMode,
    ticks: u64,
}

impl ChannelState {
    /// Create a channel at rest at 0 (or the nearest wall if 0 is out of range).
    pub fn new(id: ChannelId, config: &ChannelConfig) -> ControlResult<Self> {
        config.validate()?;
        let limits = config.ramp_limits()?;
        let origin = 0.0_f64.clamp(config.min_val, config.max_val);
        Ok(Self {
            id,
            setpoint: origin,
            readback: origin,
            ramp_rate: limits.clamp_rate(config.initial_ramp_rate),
            live_ramp_rate: 0.0,
            gains: config.gains,
            pid: PidState::default(),
            limits,
            min_val: config.min_val,
            max_val: config.max_val,
            tolerance: config.tolerance,
            mode: config.mode,
            ticks: 0,
        })
    }

    /// Advance the control loop by one tick of `dt` seconds.
    pub fn tick(&mut self, dt: Real) {
        if !self.is_at_rest() {
            let step = match self.mode {
                ControlMode::Ramp => ramp_step(self.readback, self.setpoint, self.ramp_rate),
                ControlMode::Pid => {
                    let (state, rate) = self.gains.update(
                        &self.pid,
                        self.readback,
                        self.setpoint,
                        self.ramp_rate,
                        dt,
                    );
                    self.pid = state;
                    rate
                }
            };
            self.live_ramp_rate = step;
            self.readback += step;
        } else {
            self.live_ramp_rate = 0.0;
        }

        self.readback = self.readback.clamp(self.min_val, self.max_val);
        self.ticks += 1;
    }

    /// Set the target, clamped to `[min_val, max_val]`. Returns the stored value.
    pub fn set_setpoint(&mut self, target: Real) -> ControlResult<Real> {
        let target = ensure_finite(target, "setpoint")?;
        self.setpoint = target.clamp(self.min_val, self.max_val);
        Ok(self.setpoint)
    }

    /// Set the ramp-rate bound, clamped into the ramp limits. Returns the stored value.
    pub fn set_ramp_rate(&mut self, rate: Real) -> ControlResult<Real> {
        let rate = ensure_finite(rate, "ramp rate")?;
        self.ramp_rate = self.limits.clamp_rate(rate);
        self.live_ramp_rate = self.live_ramp_rate.clamp(-self.ramp_rate, self.ramp_rate);
        Ok(self.ramp_rate)
    }

    /// Replace the controller gains.
    pub fn set_gains(&mut self, gains: PidGains) -> ControlResult<PidGains> {
        self.gains = PidGains::new(gains.kp, gains.ki, gains.kd)?;
        Ok(self.gains)
    }

    /// Freeze the channel where it is. Returns `true` if it was ramping.
    pub fn stop(&mut self) -> bool {
        if self.is_at_rest() {
            return false;
        }
        self.setpoint = self.readback;
        true
    }

    pub fn id(&self) -> ChannelId {
        self.id
    }

    pub fn setpoint(&self) -> Real {
        self.setpoint
    }

    pub fn readback(&self) -> Real {
        self.readback
    }

    /// Configured ramp-rate bound.
    pub fn ramp_rate(&self) -> Real {
        self.ramp_rate
    }

    /// Signed change applied on the latest tick.
    pub fn live_ramp_rate(&self) -> Real {
        self.live_ramp_rate
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    pub fn mode(&self) -> ControlMode {
        self.mode
    }

    /// Number of ticks applied so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn is_at_rest(&self) -> bool {
        (self.setpoint - self.readback).abs() <= self.tolerance
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn readback_never_leaves_walls(
            targets in prop::collection::vec(-1.0e4_f64..1.0e4, 1..6),
            rate in -50.0_f64..50.0,
            kp in 0.0_f64..5.0,
            ki in 0.0_f64..1.0,
            kd in 0.0_f64..2.0,
            pid in any::<bool>(),
        ) {
            let config = ChannelConfig {
                mode: if pid { ControlMode::Pid } else { ControlMode::Ramp },
                gains: PidGains { kp, ki, kd },
                ..ChannelConfig::default()
            };
            let mut ch = ChannelState::new(ChannelId::from_index(0), &config).unwrap();
            ch.set_ramp_rate(rate).unwrap();
            for target in targets {
                ch.set_setpoint(target).unwrap();
                for _ in 0..25 {
                    ch.tick(1.0);
                    prop_assert!(ch.readback() >= config.min_val);
                    prop_assert!(ch.readback() <= config.max_val);
                    prop_assert!(ch.live_ramp_rate().abs() <= ch.ramp_rate());
                    prop_assert!(ch.ramp_rate() <= config.max_ramp_rate);
                }
            }
        }

        #[test]
        fn extreme_pid_gains_keep_readback_finite(
            kp in -1.0e307_f64..1.0e307,
            ki in -1.0e307_f64..1.0e307,
            kd in -1.0e307_f64..1.0e307,
            target in -100.0_f64..=100.0,
        ) {
            let config = ChannelConfig {
                mode: ControlMode::Pid,
                ..ChannelConfig::default()
            };
            let mut ch = ChannelState::new(ChannelId::from_index(0), &config).unwrap();
            ch.set_gains(PidGains::new(kp, ki, kd).unwrap()).unwrap();
            ch.set_setpoint(target).unwrap();
            for _ in 0..10 {
                ch.tick(1.0);
                prop_assert!(ch.readback().is_finite());
                prop_assert!(ch.readback() >= config.min_val);
                prop_assert!(ch.readback() <= config.max_val);
                prop_assert!(ch.live_ramp_rate().abs() <= ch.ramp_rate());
            }
        }

        #[test]
        fn ramp_converges_to_any_valid_setpoint(
            target in -100.0_f64..=100.0,
            rate in 0.5_f64..20.0,
        ) {
            let mut ch = ChannelState::new(ChannelId::from_index(0), &ChannelConfig::default()).unwrap();
            ch.set_ramp_rate(rate).unwrap();
            ch.set_setpoint(target).unwrap();
            let needed = (target.abs() / rate).ceil() as usize + 1;
            for _ in 0..needed {
                ch.tick(1.0);
            }
            prop_assert!(ch.is_at_rest());
            prop_assert!((ch.readback() - target).abs() <= 0.001);
        }

        #[test]
        fn configured_rate_is_never_zero(rate in -1.0e6_f64..1.0e6) {
            let mut ch = ChannelState::new(ChannelId::from_index(0), &ChannelConfig::default()).unwrap();
            let stored = ch.set_ramp_rate(rate).unwrap();
            prop_assert!(stored >= 0.001);
            prop_assert!(stored <= 20.0);
        }
    }
}
