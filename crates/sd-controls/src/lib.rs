//! Control-loop primitives for the simulated device channels.
//!
//! Everything in this crate is pure and clock-free: a channel is advanced by
//! calling [`ChannelState::tick`] with the poll interval, which makes the
//! control loop deterministic under test. Wall-clock pacing lives in
//! `sd-device`.
//!
//! # Architecture
//!
//! - [`ramp`]: ramp-rate bounds and the plain rate-limited step
//! - [`controller`]: PID-assisted ramp with conditional anti-windup
//! - [`sampled`]: poll interval and tick deadline tracking
//! - [`channel`]: per-channel state machine (AtRest / Ramping)

pub mod channel;
pub mod controller;
pub mod error;
pub mod ramp;
pub mod sampled;

pub use channel::{ChannelConfig, ChannelState, ControlMode};
pub use controller::{PidGains, PidState};
pub use error::{ControlError, ControlResult};
pub use ramp::{RampLimits, ramp_step};
pub use sampled::{PollConfig, TickClock};
