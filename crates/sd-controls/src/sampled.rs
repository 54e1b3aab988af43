//! Tick pacing for channel control loops.
//!
//! A channel advances on a fixed poll interval. [`TickClock`] tracks the next
//! deadline so a worker can sleep exactly until it, including when the sleep is
//! cut short by a wake-up.

use std::time::{Duration, Instant};

use crate::error::{ControlError, ControlResult};

/// Poll configuration for a channel's tick loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl PollConfig {
    /// Create a new poll configuration.
    ///
    /// # Errors
    ///
    /// Returns error if `interval` is zero.
    pub fn new(interval: Duration) -> ControlResult<Self> {
        if interval.is_zero() {
            return Err(ControlError::InvalidArg {
                what: "poll interval must be positive",
            });
        }
        Ok(Self { interval })
    }

    /// Create a poll configuration from milliseconds.
    pub fn from_millis(ms: u64) -> ControlResult<Self> {
        Self::new(Duration::from_millis(ms))
    }

    /// Interval in seconds, as used by the derivative term.
    pub fn dt(&self) -> f64 {
        self.interval.as_secs_f64()
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
        }
    }
}

/// Tracks when the next tick is due.
#[derive(Debug, Clone, PartialEq)]
pub struct TickClock {
    /// Poll configuration.
    pub config: PollConfig,
    /// Instant of next scheduled tick.
    pub next_tick: Instant,
}

impl TickClock {
    /// Create a clock whose first tick is due immediately.
    pub fn new(config: PollConfig, now: Instant) -> Self {
        Self {
            config,
            next_tick: now,
        }
    }

    /// Check if a tick is due at `now`.
    pub fn should_tick(&self, now: Instant) -> bool {
        now >= self.next_tick
    }

    /// Schedule the tick after the current one.
    ///
    /// If the loop fell more than a full interval behind, the schedule restarts
    /// from `now` instead of firing a burst of catch-up ticks.
    pub fn advance(&mut self, now: Instant) {
        self.next_tick += self.config.interval;
        if self.next_tick <= now {
            self.next_tick = now + self.config.interval;
        }
    }

    /// Time left until the next tick.
    pub fn time_until_tick(&self, now: Instant) -> Duration {
        self.next_tick.saturating_duration_since(now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn poll_config_creation() {
        let config = PollConfig::from_millis(250).unwrap();
        assert_eq!(config.interval, Duration::from_millis(250));
        assert!((config.dt() - 0.25).abs() < 1e-12);
        assert!(PollConfig::from_millis(0).is_err());
    }

    #[test]
    fn default_poll_is_one_second() {
        assert_eq!(PollConfig::default().interval, Duration::from_secs(1));
    }

    #[test]
    fn tick_clock_basic() {
        let config = PollConfig::from_millis(100).unwrap();
        let t0 = Instant::now();
        let mut clock = TickClock::new(config, t0);

        assert!(clock.should_tick(t0));
        clock.advance(t0);
        assert!(!clock.should_tick(t0 + Duration::from_millis(50)));
        assert!(clock.should_tick(t0 + Duration::from_millis(100)));
        assert_eq!(
            clock.time_until_tick(t0 + Duration::from_millis(40)),
            Duration::from_millis(60)
        );
    }

    #[test]
    fn tick_clock_skips_missed_ticks() {
        let config = PollConfig::from_millis(100).unwrap();
        let t0 = Instant::now();
        let mut clock = TickClock::new(config, t0);

        let late = t0 + Duration::from_millis(450);
        clock.advance(late);
        assert_eq!(clock.next_tick, late + Duration::from_millis(100));
        assert_eq!(clock.time_until_tick(late + Duration::from_secs(1)), Duration::ZERO);
    }
}
